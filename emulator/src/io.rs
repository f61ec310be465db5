pub mod console;
pub mod disk;

use crate::EmulatorState;
use crate::interrupts::{InterruptController, InterruptId};

use log::trace;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use thiserror::Error;


#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IoError {
    #[error("offset {offset} is outside the {len} word I/O buffer")]
    OutOfRange { offset: usize, len: usize },

    #[error("drive {drive} is not supported (valid drives are 0 through {max})")]
    InvalidDrive { drive: u8, max: u8 },

    #[error("cartridge image of {words} words exceeds the {capacity} word capacity")]
    ImageTooLarge { words: usize, capacity: usize },
}


#[derive(Debug, Clone, Copy, FromPrimitive, PartialEq, Eq)]
pub enum IoFunction {
    Write = 1,
    Read = 2,
    SenseInterrupt = 3,
    Control = 4,
    InitWrite = 5,
    InitRead = 6,
    SenseDevice = 7,
}

/// A decoded I/O control command: the word at the effective address, then
/// device, function and modifiers from the word after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iocc {
    pub address: u16,
    pub device: u8,
    pub function: u8,
    pub modifiers: u8,
}

impl Iocc {
    const DEVICE_SHIFT: u16 = 11;
    const DEVICE_MASK: u16 = 0x1f;
    const FUNCTION_SHIFT: u16 = 8;
    const FUNCTION_MASK: u16 = 0x7;
    const MODIFIERS_MASK: u16 = 0xff;

    pub fn decode(state: &EmulatorState, addr: u16) -> Iocc {
        let address = state.mem_read(addr);
        let control = state.mem_read(addr.wrapping_add(1));
        Iocc {
            address,
            device: ((control >> Self::DEVICE_SHIFT) & Self::DEVICE_MASK) as u8,
            function: ((control >> Self::FUNCTION_SHIFT) & Self::FUNCTION_MASK) as u8,
            modifiers: (control & Self::MODIFIERS_MASK) as u8,
        }
    }

    pub fn encode(device: u8, function: IoFunction, modifiers: u8) -> u16 {
        (((device as u16) & Self::DEVICE_MASK) << Self::DEVICE_SHIFT)
            | ((function as u16) << Self::FUNCTION_SHIFT)
            | modifiers as u16
    }

    // Function 0 is unassigned.
    pub fn function(&self) -> Option<IoFunction> {
        IoFunction::from_u8(self.function)
    }
}


/// Everything a device may touch while executing a command or stepping.
pub struct IoContext<'a> {
    pub state: &'a mut EmulatorState,
    pub interrupts: &'a mut InterruptController,
}

pub trait Device: Send {
    /// The 5-bit selector the device answers to.
    fn device_code(&self) -> u8;

    fn execute_iocc(&mut self, ctx: &mut IoContext, iocc: &Iocc);

    /// Time passes; called by the driver between instructions. Slow operations
    /// complete here and raise their interrupt.
    fn step(&mut self, _ctx: &mut IoContext) {}

    /// The interrupt this device currently wants serviced, if any.
    fn active_interrupt(&self) -> Option<InterruptId>;

    fn reset(&mut self) {}
}


// Raises at most one interrupt per device at a time; a request already
// outstanding is left as is.
pub fn activate_interrupt(
    ctx: &mut IoContext,
    active: &mut Option<InterruptId>,
    device: u8,
    level: u8,
    status: u16,
) {
    if active.is_some() {
        return;
    }
    *active = ctx.interrupts.raise(device, level, status);
}

// The next level clear will release the interrupt.
pub fn deactivate_interrupt(active: &mut Option<InterruptId>) {
    *active = None;
}

/// Cycle steal from memory: up to `max` words following the word count at
/// `wca`.
pub fn transfer_from_memory(state: &mut EmulatorState, wca: u16, max: usize) -> Vec<u16> {
    let buf = IoBuffer::new(state, wca);
    let count = buf.len().min(max);
    trace!("Cycle steal: {count} words from {:#06x}", wca.wrapping_add(1));
    (0..count).filter_map(|offset| buf.get(offset).ok()).collect()
}

/// Cycle steal into memory; returns the number of words actually moved.
pub fn transfer_to_memory(state: &mut EmulatorState, wca: u16, words: &[u16]) -> usize {
    let mut buf = IoBuffer::new(state, wca);
    let count = buf.len().min(words.len());
    trace!("Cycle steal: {count} words to {:#06x}", wca.wrapping_add(1));
    for (offset, word) in words[..count].iter().enumerate() {
        // In range by construction.
        let _ = buf.set(offset, *word);
    }
    count
}


/// A view of the words following a word count cell, bounded by that count.
pub struct IoBuffer<'a> {
    state: &'a mut EmulatorState,
    wca: u16,
    len: usize,
}

impl<'a> IoBuffer<'a> {
    pub fn new(state: &'a mut EmulatorState, wca: u16) -> Self {
        let len = state.mem_read(wca) as usize;
        IoBuffer { state, wca, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn addr(&self, offset: usize) -> Result<u16, IoError> {
        if offset >= self.len {
            return Err(IoError::OutOfRange { offset, len: self.len });
        }
        Ok(self.wca.wrapping_add(1).wrapping_add(offset as u16))
    }

    pub fn get(&self, offset: usize) -> Result<u16, IoError> {
        let addr = self.addr(offset)?;
        Ok(self.state.mem_read(addr))
    }

    pub fn set(&mut self, offset: usize, val: u16) -> Result<(), IoError> {
        let addr = self.addr(offset)?;
        self.state.mem_write(addr, val);
        Ok(())
    }
}
