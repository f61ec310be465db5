
use crate::interrupts::InterruptId;
use crate::io::{
    activate_interrupt, deactivate_interrupt, transfer_from_memory, transfer_to_memory, Device,
    IoContext, IoError, IoFunction, Iocc,
};

use log::{debug, error, trace};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Read { wca: u16, sector: usize },
    Write { wca: u16, sector: usize },
}

/// A single cartridge drive, moving whole sectors by cycle steal.
pub struct Disk {
    drive: u8,
    cartridge: Vec<u16>,
    cylinder: usize,
    pending: Option<Pending>,
    op_complete: bool,
    interrupt: Option<InterruptId>,
}

impl Disk {
    pub const MAX_DRIVE: u8 = 4;
    pub const LEVEL: u8 = 2;

    pub const CYLINDERS: usize = 203;
    pub const SECTORS_PER_CYLINDER: usize = 8;
    pub const WORDS_PER_SECTOR: usize = 321;
    pub const CAPACITY: usize = Self::CYLINDERS * Self::SECTORS_PER_CYLINDER * Self::WORDS_PER_SECTOR;

    // Device status word.
    pub const OP_COMPLETE: u16 = 0x4000;
    pub const BUSY: u16 = 0x1000;
    pub const HOME: u16 = 0x0800;

    const SEEK_BACKWARD: u8 = 0x04;
    const SECTOR_MASK: u8 = 0x07;
    const RESET_RESPONSES: u8 = 0x01;

    pub fn new(drive: u8) -> Result<Disk, IoError> {
        if drive > Self::MAX_DRIVE {
            return Err(IoError::InvalidDrive { drive, max: Self::MAX_DRIVE });
        }
        Ok(Disk {
            drive,
            cartridge: vec![0; Self::CAPACITY],
            cylinder: 0,
            pending: None,
            op_complete: false,
            interrupt: None,
        })
    }

    // Short images are padded with zeros.
    pub fn with_cartridge(drive: u8, mut words: Vec<u16>) -> Result<Disk, IoError> {
        if words.len() > Self::CAPACITY {
            return Err(IoError::ImageTooLarge { words: words.len(), capacity: Self::CAPACITY });
        }
        let mut disk = Self::new(drive)?;
        words.resize(Self::CAPACITY, 0);
        disk.cartridge = words;
        Ok(disk)
    }

    pub fn drive(&self) -> u8 {
        self.drive
    }

    pub fn cartridge(&self) -> &[u16] {
        &self.cartridge
    }

    pub fn cylinder(&self) -> usize {
        self.cylinder
    }

    pub fn interrupt_bit(&self) -> u16 {
        0x8000 >> self.drive
    }

    pub fn dsw(&self) -> u16 {
        let mut dsw = 0;
        if self.op_complete {
            dsw |= Self::OP_COMPLETE;
        }
        if self.pending.is_some() {
            dsw |= Self::BUSY;
        }
        if self.cylinder == 0 {
            dsw |= Self::HOME;
        }
        dsw
    }

    fn sector_range(&self, sector: usize) -> std::ops::Range<usize> {
        let start = (self.cylinder * Self::SECTORS_PER_CYLINDER + sector) * Self::WORDS_PER_SECTOR;
        start..start + Self::WORDS_PER_SECTOR
    }

    fn seek(&mut self, iocc: &Iocc) {
        let count = iocc.address as usize;
        self.cylinder = if iocc.modifiers & Self::SEEK_BACKWARD != 0 {
            self.cylinder.saturating_sub(count)
        } else {
            (self.cylinder + count).min(Self::CYLINDERS - 1)
        };
        trace!("Disk {}: seek to cylinder {}", self.drive, self.cylinder);
    }

    fn start(&mut self, op: Pending) {
        if self.pending.is_some() {
            error!("Disk {}: command while busy; ignored", self.drive);
            return;
        }
        self.pending = Some(op);
    }

    fn complete(&mut self, ctx: &mut IoContext, op: Pending) {
        match op {
            Pending::Read { wca, sector } => {
                let range = self.sector_range(sector);
                let moved = transfer_to_memory(ctx.state, wca, &self.cartridge[range]);
                debug!("Disk {}: read {moved} words from cylinder {} sector {sector}", self.drive, self.cylinder);
            }
            Pending::Write { wca, sector } => {
                let range = self.sector_range(sector);
                let words = transfer_from_memory(ctx.state, wca, Self::WORDS_PER_SECTOR);
                let moved = words.len();
                self.cartridge[range.start..range.start + moved].copy_from_slice(&words);
                debug!("Disk {}: wrote {moved} words to cylinder {} sector {sector}", self.drive, self.cylinder);
            }
        }
        self.op_complete = true;
        let (code, bit) = (self.device_code(), self.interrupt_bit());
        activate_interrupt(ctx, &mut self.interrupt, code, Self::LEVEL, bit);
    }
}

impl Device for Disk {
    // Drive 0 is the built in drive; the rest sit on consecutive selectors.
    fn device_code(&self) -> u8 {
        match self.drive {
            0 => 0x04,
            drive => 0x08 + drive,
        }
    }

    fn execute_iocc(&mut self, ctx: &mut IoContext, iocc: &Iocc) {
        let sector = (iocc.modifiers & Self::SECTOR_MASK) as usize;
        match iocc.function() {
            Some(IoFunction::Control) => self.seek(iocc),
            Some(IoFunction::InitRead) => self.start(Pending::Read { wca: iocc.address, sector }),
            Some(IoFunction::InitWrite) => self.start(Pending::Write { wca: iocc.address, sector }),
            Some(IoFunction::SenseDevice) => {
                ctx.state.set_acc(self.dsw());
                if iocc.modifiers & Self::RESET_RESPONSES != 0 {
                    self.op_complete = false;
                    deactivate_interrupt(&mut self.interrupt);
                }
            }
            other => debug!("Disk {}: function {other:?} not supported", self.drive),
        }
    }

    fn step(&mut self, ctx: &mut IoContext) {
        if let Some(op) = self.pending.take() {
            self.complete(ctx, op);
        }
    }

    fn active_interrupt(&self) -> Option<InterruptId> {
        self.interrupt
    }

    fn reset(&mut self) {
        self.pending = None;
        self.op_complete = false;
        self.interrupt = None;
    }
}
