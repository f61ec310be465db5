pub mod emulator;
pub mod emulator_state;
pub mod interrupts;
pub mod io;
pub mod isa;

pub use emulator::{Emulator, ExecRet};
pub use emulator_state::{EmulatorState, Status};
pub use interrupts::{Interrupt, InterruptController, InterruptId, InterruptPool};
pub use io::{Device, IoContext, IoError, IoFunction, Iocc};
