
use crate::asm::*;

/// Decodes the instruction starting at `input[0]`. `input[1]` is only consulted
/// for long format, which is only honoured when `long_ok` (the opcode's handler
/// takes long format); otherwise the format bit is ignored.
pub fn decode(input: &[u16], long_ok: bool) -> Ins {
    let first = input[0];
    let opcode = opcode_bits(first) as u8;
    let tag = ((first >> TAG_SHIFT) & TAG_MASK) as u8;
    let modifiers = (first & LOW_BYTE_MASK) as u8;
    let long = long_ok && (first & FORMAT_BIT) != 0;

    let (disp, indirect) = if long {
        (input.get(1).copied().unwrap_or(0), (first & INDIRECT_BIT) != 0)
    } else {
        (first & LOW_BYTE_MASK, false)
    };

    Ins {
        opcode,
        op: Opcode::from_word(first),
        long,
        tag,
        disp,
        indirect,
        modifiers,
    }
}
