use common::constants::{DEFAULT_MEM_WORDS, INDEX_REG_BASE, NUM_INDEX_REGS};

use std::fmt;

use log::trace;

// Carry and overflow, in the two bit form LDS and STS use.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(u16);

impl Status {
    pub const OVERFLOW_SHIFT: u16 = 0;
    pub const CARRY_SHIFT: u16 = 1;

    pub const V: u16 = 0x1 << Self::OVERFLOW_SHIFT;
    pub const C: u16 = 0x1 << Self::CARRY_SHIFT;

    pub const FLAGS_MASK: u16 = Self::C | Self::V;

    pub fn new() -> Status {
        Default::default()
    }

    pub fn from_raw(raw: u16) -> Self {
        Status(raw & Self::FLAGS_MASK)
    }

    pub fn to_raw(&self) -> u16 {
        self.0
    }

    pub fn get_carry(&self) -> bool {
        (self.0 & Self::C) != 0
    }

    pub fn set_carry(&mut self, val: bool) {
        self.0 &= !Self::C;
        self.0 |= (val as u16) << Self::CARRY_SHIFT;
    }

    pub fn get_overflow(&self) -> bool {
        (self.0 & Self::V) != 0
    }

    pub fn set_overflow(&mut self, val: bool) {
        self.0 &= !Self::V;
        self.0 |= (val as u16) << Self::OVERFLOW_SHIFT;
    }

    // Overflow is sticky: arithmetic only ever turns it on.
    pub fn note_overflow(&mut self, val: bool) {
        if val {
            self.set_overflow(true);
        }
    }
}

// Kept apart from the Emulator so a mutable borrow can be handed to devices.
pub struct EmulatorState {
    num_ins: usize,
    mem: Vec<u16>,
    iar: u16,
    acc: u16,
    ext: u16,
    status: Status,
    wait: bool,
}

impl EmulatorState {
    pub fn new() -> Self {
        Self::with_memory_size(DEFAULT_MEM_WORDS)
    }

    pub fn with_memory_size(words: usize) -> Self {
        let words = words.clamp(1, u16::MAX as usize + 1);
        EmulatorState {
            num_ins: 0usize,
            mem: vec![0; words],
            iar: 0,
            acc: 0,
            ext: 0,
            status: Status::new(),
            wait: false,
        }
    }

    pub fn inc_ins(&mut self) {
        self.num_ins += 1;
    }

    pub fn num_ins(&self) -> usize {
        self.num_ins
    }

    pub fn mem_size(&self) -> usize {
        self.mem.len()
    }

    // No protection: addresses past the end wrap around.
    fn index(&self, addr: u16) -> usize {
        addr as usize % self.mem.len()
    }

    pub fn mem_read(&self, addr: u16) -> u16 {
        self.mem[self.index(addr)]
    }

    pub fn mem_write(&mut self, addr: u16, val: u16) {
        trace!("Mem: writing {val:#06x} to {addr:#06x}");
        let idx = self.index(addr);
        self.mem[idx] = val;
    }

    pub fn iar(&self) -> u16 {
        self.iar
    }

    pub fn set_iar(&mut self, val: u16) {
        trace!("Reg: writing {val:#06x} to IAR");
        self.iar = val;
    }

    pub fn acc(&self) -> u16 {
        self.acc
    }

    pub fn set_acc(&mut self, val: u16) {
        trace!("Reg: writing {val:#06x} to ACC");
        self.acc = val;
    }

    pub fn ext(&self) -> u16 {
        self.ext
    }

    pub fn set_ext(&mut self, val: u16) {
        trace!("Reg: writing {val:#06x} to EXT");
        self.ext = val;
    }

    // ACC is the high half.
    pub fn acc_ext(&self) -> u32 {
        ((self.acc as u32) << u16::BITS) | self.ext as u32
    }

    pub fn set_acc_ext(&mut self, val: u32) {
        self.set_acc((val >> u16::BITS) as u16);
        self.set_ext(val as u16);
    }

    // Index 0 is the IAR itself; 1 through 3 are the core resident index
    // registers.
    pub fn xr(&self, idx: u8) -> u16 {
        debug_assert!(idx <= NUM_INDEX_REGS);
        match idx {
            0 => self.iar,
            n => self.mem_read(INDEX_REG_BASE + (n & 0x3) as u16 - 1),
        }
    }

    pub fn set_xr(&mut self, idx: u8, val: u16) {
        debug_assert!(idx <= NUM_INDEX_REGS);
        match idx {
            0 => self.set_iar(val),
            n => self.mem_write(INDEX_REG_BASE + (n & 0x3) as u16 - 1, val),
        }
    }

    // The word at the IAR and the one after it.
    pub fn next_ins(&self) -> [u16; 2] {
        [self.mem_read(self.iar), self.mem_read(self.iar.wrapping_add(1))]
    }

    pub fn get_status(&self) -> &Status {
        &self.status
    }

    pub fn get_status_mut(&mut self) -> &mut Status {
        &mut self.status
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    pub fn carry(&self) -> bool {
        self.status.get_carry()
    }

    pub fn overflow(&self) -> bool {
        self.status.get_overflow()
    }

    pub fn wait(&self) -> bool {
        self.wait
    }

    pub fn set_wait(&mut self, val: bool) {
        self.wait = val;
    }
}

impl fmt::Display for EmulatorState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "IAR {:#06x}  ACC {:#06x}  EXT {:#06x}", self.iar, self.acc, self.ext)?;
        for idx in 1..=NUM_INDEX_REGS {
            write!(f, "  XR{idx} {:#06x}", self.xr(idx))?;
        }
        write!(
            f,
            "  C {}  V {}{}",
            self.carry() as u8,
            self.overflow() as u8,
            if self.wait { "  WAIT" } else { "" },
        )
    }
}

impl Default for EmulatorState {
    fn default() -> Self {
        Self::new()
    }
}
