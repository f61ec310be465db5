
use std::collections::VecDeque;
use std::io::{stdout, Write};
use std::sync::{Arc, Mutex, PoisonError};

use crate::interrupts::InterruptId;
use crate::io::{activate_interrupt, deactivate_interrupt, Device, IoContext, IoFunction, Iocc};

use log::{debug, error};


pub trait Printer: Send + Sync {
    fn write(&self, val: u8);
}

#[derive(Default, Clone, Copy)]
pub struct StdoutPrinter();

impl Printer for StdoutPrinter {
    fn write(&self, val: u8) {
        let mut out = stdout().lock();
        if let Err(e) = out.write_all(&[val]).and_then(|()| out.flush()) {
            error!("Console: failed to write to stdout: {e}");
        }
    }
}


#[derive(Default)]
pub struct PipePrinter {
    buf: Mutex<VecDeque<u8>>,
}

impl Printer for PipePrinter {
    fn write(&self, val: u8) {
        self.buf.lock().unwrap_or_else(PoisonError::into_inner).push_back(val);
    }
}

impl PipePrinter {
    pub fn take(&self) -> VecDeque<u8> {
        std::mem::take(&mut self.buf.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn is_empty(&self) -> bool {
        self.buf.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
    }
}

////////////////////////////////////////////////////////////////////////////////

pub trait Keyboard: Send + Sync {
    fn input_available(&self) -> bool;
    fn poll_input(&self) -> Option<u8>;
}

#[derive(Default)]
pub struct PipeKeyboard {
    buf: Mutex<VecDeque<u8>>,
}

impl PipeKeyboard {
    pub fn push_input(&self, val: u8) {
        self.buf.lock().unwrap_or_else(PoisonError::into_inner).push_back(val);
    }

    pub fn write_input(&self, vals: &[u8]) {
        for val in vals.iter() {
            self.push_input(*val);
        }
    }
}

impl Keyboard for PipeKeyboard {
    fn input_available(&self) -> bool {
        !self.buf.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
    }

    fn poll_input(&self) -> Option<u8> {
        self.buf.lock().unwrap_or_else(PoisonError::into_inner).pop_front()
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Console printer and keyboard on one selector, interrupting on level 4.
pub struct Console {
    printer: Arc<dyn Printer>,
    keyboard: Option<Arc<dyn Keyboard>>,
    delay_ticks: usize,
    ticks_until_ready: usize,
    printer_response: bool,
    keyboard_response: bool,
    keyboard_armed: bool,
    interrupt: Option<InterruptId>,
}

impl Default for Console {
    fn default() -> Self {
        Console::new_to_stdout()
    }
}

impl Console {
    pub const DEVICE_CODE: u8 = 0x01;
    pub const LEVEL: u8 = 4;
    pub const ILSW_BIT: u16 = 0x1000;

    // Device status word.
    pub const PRINTER_RESPONSE: u16 = 0x8000;
    pub const KEYBOARD_RESPONSE: u16 = 0x4000;
    pub const PRINTER_BUSY: u16 = 0x0800;

    const RESET_RESPONSES: u8 = 0x01;
    const ARM_KEYBOARD: u8 = 0x01;

    // Roughly 15 characters a second at a few microseconds per instruction.
    pub const DELAY_TICKS: usize = 18_000;

    pub fn new_to_stdout() -> Self {
        Self::new(Arc::new(StdoutPrinter()))
    }

    pub fn new(printer: Arc<dyn Printer>) -> Self {
        Console {
            printer,
            keyboard: None,
            delay_ticks: Self::DELAY_TICKS,
            ticks_until_ready: 0,
            printer_response: false,
            keyboard_response: false,
            keyboard_armed: false,
            interrupt: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: Arc<dyn Keyboard>) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    pub fn with_delay(mut self, ticks: usize) -> Self {
        self.delay_ticks = ticks;
        self
    }

    pub fn busy(&self) -> bool {
        self.ticks_until_ready != 0
    }

    pub fn dsw(&self) -> u16 {
        let mut dsw = 0;
        if self.printer_response {
            dsw |= Self::PRINTER_RESPONSE;
        }
        if self.keyboard_response {
            dsw |= Self::KEYBOARD_RESPONSE;
        }
        if self.busy() {
            dsw |= Self::PRINTER_BUSY;
        }
        dsw
    }

    // The character travels in the high byte of the word at the IOCC address.
    fn print(&mut self, ctx: &mut IoContext, iocc: &Iocc) {
        if self.busy() {
            error!("Console: write while printer busy; dropped");
            return;
        }
        let val = (ctx.state.mem_read(iocc.address) >> 8) as u8;
        self.printer.write(val);
        self.ticks_until_ready = self.delay_ticks.max(1);
    }

    fn read_key(&mut self, ctx: &mut IoContext, iocc: &Iocc) {
        let Some(val) = self.keyboard.as_ref().and_then(|kb| kb.poll_input()) else {
            debug!("Console: read with no key waiting");
            return;
        };
        let old = ctx.state.mem_read(iocc.address);
        ctx.state.mem_write(iocc.address, ((val as u16) << 8) | (old & 0xff));
    }
}

impl Device for Console {
    fn device_code(&self) -> u8 {
        Self::DEVICE_CODE
    }

    fn execute_iocc(&mut self, ctx: &mut IoContext, iocc: &Iocc) {
        match iocc.function() {
            Some(IoFunction::Write) => self.print(ctx, iocc),
            Some(IoFunction::Read) => self.read_key(ctx, iocc),
            Some(IoFunction::Control) => {
                self.keyboard_armed = iocc.modifiers & Self::ARM_KEYBOARD != 0;
            }
            Some(IoFunction::SenseDevice) => {
                ctx.state.set_acc(self.dsw());
                if iocc.modifiers & Self::RESET_RESPONSES != 0 {
                    self.printer_response = false;
                    self.keyboard_response = false;
                    deactivate_interrupt(&mut self.interrupt);
                }
            }
            other => debug!("Console: function {other:?} not supported"),
        }
    }

    fn step(&mut self, ctx: &mut IoContext) {
        if self.ticks_until_ready > 0 {
            self.ticks_until_ready -= 1;
            if self.ticks_until_ready == 0 {
                self.printer_response = true;
                activate_interrupt(ctx, &mut self.interrupt, Self::DEVICE_CODE, Self::LEVEL, Self::ILSW_BIT);
            }
        }

        if self.keyboard_armed && self.keyboard.as_ref().is_some_and(|kb| kb.input_available()) {
            self.keyboard_armed = false;
            self.keyboard_response = true;
            activate_interrupt(ctx, &mut self.interrupt, Self::DEVICE_CODE, Self::LEVEL, Self::ILSW_BIT);
        }
    }

    fn active_interrupt(&self) -> Option<InterruptId> {
        self.interrupt
    }

    fn reset(&mut self) {
        self.ticks_until_ready = 0;
        self.printer_response = false;
        self.keyboard_response = false;
        self.keyboard_armed = false;
        self.interrupt = None;
    }
}
