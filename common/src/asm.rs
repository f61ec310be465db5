
use std::fmt;

use derive_more::Display;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;


// Instruction word layout (bit 15 is the most significant):
//   [15:11] opcode, [10] format, [9:8] tag, [7:0] displacement (short)
//   [7] indirect, [6:0] modifiers (long, second word is the address)
pub const OPCODE_SHIFT: u16 = 11;
pub const OPCODE_MASK: u16 = 0x1f;
pub const FORMAT_BIT: u16 = 0x1 << 10;
pub const TAG_SHIFT: u16 = 8;
pub const TAG_MASK: u16 = 0x3;
pub const INDIRECT_BIT: u16 = 0x1 << 7;
pub const LOW_BYTE_MASK: u16 = 0xff;


#[derive(Debug, Display, Clone, Copy, FromPrimitive, PartialEq, Eq, Hash)]
pub enum Opcode {
    #[display(fmt = "XIO")]
    Xio = 0x01,
    #[display(fmt = "SL")]
    ShiftLeft = 0x02,
    #[display(fmt = "SR")]
    ShiftRight = 0x03,
    #[display(fmt = "LDS")]
    Lds = 0x04,
    #[display(fmt = "STS")]
    Sts = 0x05,
    #[display(fmt = "WAIT")]
    Wait = 0x06,

    #[display(fmt = "BSI")]
    Bsi = 0x08,
    #[display(fmt = "BSC")]
    Bsc = 0x09,

    #[display(fmt = "LDX")]
    Ldx = 0x0c,
    #[display(fmt = "STX")]
    Stx = 0x0d,
    #[display(fmt = "MDX")]
    Mdx = 0x0e,

    #[display(fmt = "A")]
    A = 0x10,
    #[display(fmt = "AD")]
    Ad = 0x11,
    #[display(fmt = "S")]
    S = 0x12,
    #[display(fmt = "SD")]
    Sd = 0x13,
    #[display(fmt = "M")]
    M = 0x14,
    #[display(fmt = "D")]
    D = 0x15,

    #[display(fmt = "LD")]
    Ld = 0x18,
    #[display(fmt = "LDD")]
    Ldd = 0x19,
    #[display(fmt = "STO")]
    Sto = 0x1a,
    #[display(fmt = "STD")]
    Std = 0x1b,
    #[display(fmt = "AND")]
    And = 0x1c,
    #[display(fmt = "OR")]
    Or = 0x1d,
    #[display(fmt = "EOR")]
    Eor = 0x1e,
}

impl Opcode {
    pub fn from_word(word: u16) -> Option<Opcode> {
        Opcode::from_u16(opcode_bits(word))
    }

    pub fn bits(self) -> u16 {
        self as u16
    }

    /// Encodes a one word instruction. `disp` is the signed 8-bit displacement
    /// (or, for shifts, LDS and short BSC, the raw low byte reinterpreted).
    pub fn short(self, tag: u8, disp: i8) -> u16 {
        encode_short(self.bits() as u8, tag, disp as u8)
    }

    pub fn long(self, tag: u8, addr: u16) -> [u16; 2] {
        encode_long(self.bits() as u8, tag, false, 0, addr)
    }

    pub fn long_indirect(self, tag: u8, addr: u16) -> [u16; 2] {
        encode_long(self.bits() as u8, tag, true, 0, addr)
    }

    /// Long format with explicit modifier bits (condition masks, MDX increments).
    pub fn long_mod(self, tag: u8, modifiers: u8, addr: u16) -> [u16; 2] {
        encode_long(self.bits() as u8, tag, false, modifiers, addr)
    }
}

pub fn opcode_bits(word: u16) -> u16 {
    (word >> OPCODE_SHIFT) & OPCODE_MASK
}

pub fn encode_short(opcode: u8, tag: u8, disp: u8) -> u16 {
    ((opcode as u16 & OPCODE_MASK) << OPCODE_SHIFT)
        | ((tag as u16 & TAG_MASK) << TAG_SHIFT)
        | disp as u16
}

// Bit 7 of `modifiers` and `indirect` both land on the indirect bit.
pub fn encode_long(opcode: u8, tag: u8, indirect: bool, modifiers: u8, addr: u16) -> [u16; 2] {
    let first = ((opcode as u16 & OPCODE_MASK) << OPCODE_SHIFT)
        | FORMAT_BIT
        | ((tag as u16 & TAG_MASK) << TAG_SHIFT)
        | ((indirect as u16) << 7)
        | modifiers as u16;
    [first, addr]
}


////////////////////////////////////////////////////////////////////////////////


// Branch/skip condition bits, found in the low six modifier bits.
pub mod cond {
    pub const ZERO: u8 = 0x20;
    pub const MINUS: u8 = 0x10;
    pub const PLUS: u8 = 0x08;
    pub const EVEN: u8 = 0x04;
    pub const CARRY_OFF: u8 = 0x02;
    pub const OVERFLOW_OFF: u8 = 0x01;
    pub const MASK: u8 = 0x3f;

    // Long BSC only: branch out of the interrupt level being serviced.
    pub const RESET_INTERRUPT: u8 = 0x40;
}

// Shift sub-types: bits 7:6 of the shift control byte.
pub mod shift {
    pub const TYPE_SHIFT: u16 = 6;
    pub const TYPE_MASK: u16 = 0x3;
    pub const COUNT_MASK: u16 = 0x3f;

    pub const ACC: u16 = 0b00;
    pub const ACC_COUNT: u16 = 0b01;
    pub const DOUBLE: u16 = 0b10;
    pub const DOUBLE_COUNT: u16 = 0b11;

    // Right shifts have no counting forms; 0b01 behaves as ACC.
    pub const ROTATE: u16 = 0b11;

    pub fn control(kind: u16, count: u16) -> i8 {
        (((kind & TYPE_MASK) << TYPE_SHIFT) | (count & COUNT_MASK)) as u8 as i8
    }
}


////////////////////////////////////////////////////////////////////////////////


/// A decoded instruction. Built fresh every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ins {
    pub opcode: u8,
    pub op: Option<Opcode>,
    pub long: bool,
    pub tag: u8,
    // Short format: the raw low byte. Long format: the second word.
    pub disp: u16,
    pub indirect: bool,
    pub modifiers: u8,
}

impl Ins {
    pub fn size(&self) -> u16 {
        1 + self.long as u16
    }

    pub fn short_disp(&self) -> i16 {
        self.disp as u8 as i8 as i16
    }

    pub fn conditions(&self) -> u8 {
        self.modifiers & cond::MASK
    }

    pub fn encode(&self) -> Vec<u16> {
        if self.long {
            encode_long(self.opcode, self.tag, self.indirect, self.modifiers, self.disp).to_vec()
        } else {
            vec![encode_short(self.opcode, self.tag, self.disp as u8)]
        }
    }
}

impl fmt::Display for Ins {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let Some(op) = self.op else {
            return write!(f, "<invalid opcode {:#04x}>", self.opcode);
        };
        write!(f, "{op}\t")?;
        if self.long {
            write!(f, "L")?;
            if self.indirect {
                write!(f, "I")?;
            }
        }
        if self.tag != 0 {
            write!(f, "{}", self.tag)?;
        }
        if self.long {
            write!(f, " {:#06x}", self.disp)
        } else {
            write!(f, " {}", self.short_disp())
        }
    }
}
