
pub const DEFAULT_MEM_WORDS: usize = 32768;

// Index registers live in core, XR1 through XR3.
pub const INDEX_REG_BASE: u16 = 1;
pub const NUM_INDEX_REGS: u8 = 3;

// One vector cell per level, level 0 first.
pub const INTERRUPT_VECTOR_BASE: u16 = 0x0008;
pub const NUM_INTERRUPT_LEVELS: usize = 6;

pub const NUM_OPCODES: usize = 32;
