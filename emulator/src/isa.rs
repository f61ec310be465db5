use common::asm::{Ins, Opcode};
use common::constants::NUM_OPCODES;

use crate::Emulator;

pub type Handler = fn(&mut Emulator, &Ins);

pub struct InsDef {
    pub op: Opcode,
    // Whether the format bit selects the two word form.
    pub long_format: bool,
    pub exec: Handler,
}

static INSTRUCTIONS: &[InsDef] = &[
    InsDef { op: Opcode::Xio, long_format: true, exec: Emulator::exec_xio },
    InsDef { op: Opcode::ShiftLeft, long_format: false, exec: Emulator::exec_shift_left },
    InsDef { op: Opcode::ShiftRight, long_format: false, exec: Emulator::exec_shift_right },
    InsDef { op: Opcode::Lds, long_format: false, exec: Emulator::exec_lds },
    InsDef { op: Opcode::Sts, long_format: true, exec: Emulator::exec_sts },
    InsDef { op: Opcode::Wait, long_format: false, exec: Emulator::exec_wait },

    InsDef { op: Opcode::Bsi, long_format: true, exec: Emulator::exec_bsi },
    InsDef { op: Opcode::Bsc, long_format: true, exec: Emulator::exec_bsc },

    InsDef { op: Opcode::Ldx, long_format: true, exec: Emulator::exec_ldx },
    InsDef { op: Opcode::Stx, long_format: true, exec: Emulator::exec_stx },
    InsDef { op: Opcode::Mdx, long_format: true, exec: Emulator::exec_mdx },

    InsDef { op: Opcode::A, long_format: true, exec: Emulator::exec_a },
    InsDef { op: Opcode::Ad, long_format: true, exec: Emulator::exec_ad },
    InsDef { op: Opcode::S, long_format: true, exec: Emulator::exec_s },
    InsDef { op: Opcode::Sd, long_format: true, exec: Emulator::exec_sd },
    InsDef { op: Opcode::M, long_format: true, exec: Emulator::exec_m },
    InsDef { op: Opcode::D, long_format: true, exec: Emulator::exec_d },

    InsDef { op: Opcode::Ld, long_format: true, exec: Emulator::exec_ld },
    InsDef { op: Opcode::Ldd, long_format: true, exec: Emulator::exec_ldd },
    InsDef { op: Opcode::Sto, long_format: true, exec: Emulator::exec_sto },
    InsDef { op: Opcode::Std, long_format: true, exec: Emulator::exec_std },
    InsDef { op: Opcode::And, long_format: true, exec: Emulator::exec_and },
    InsDef { op: Opcode::Or, long_format: true, exec: Emulator::exec_or },
    InsDef { op: Opcode::Eor, long_format: true, exec: Emulator::exec_eor },
];

/// Opcode to handler, built once per emulator.
pub struct InstructionSet {
    table: [Option<&'static InsDef>; NUM_OPCODES],
}

impl InstructionSet {
    pub fn new() -> Self {
        let mut table = [None; NUM_OPCODES];
        for def in INSTRUCTIONS {
            table[def.op.bits() as usize] = Some(def);
        }
        InstructionSet { table }
    }

    pub fn get(&self, opcode: u8) -> Option<&'static InsDef> {
        self.table.get(opcode as usize).copied().flatten()
    }

    pub fn long_format(&self, opcode: u8) -> bool {
        self.get(opcode).is_some_and(|def| def.long_format)
    }

    pub fn len(&self) -> usize {
        self.table.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InstructionSet {
    fn default() -> Self {
        Self::new()
    }
}
