
use common::asm::{cond, opcode_bits, shift, Ins};
use common::constants::{DEFAULT_MEM_WORDS, NUM_INTERRUPT_LEVELS};
use common::decoder::decode;
use crate::interrupts::{InterruptController, InterruptId, InterruptPool};
use crate::io::{Device, IoContext, IoFunction, Iocc};
use crate::isa::InstructionSet;
use crate::{EmulatorState, Status};

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use delegate::delegate;
use log::{debug, trace, warn};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecRet {
    Ok,
    Wait,
}

const SIGN_BIT: u16 = 0x8000;
const DOUBLE_SIGN_BIT: u32 = 0x8000_0000;

fn lock(dev: &Arc<Mutex<dyn Device>>) -> MutexGuard<'_, dyn Device + 'static> {
    dev.lock().unwrap_or_else(PoisonError::into_inner)
}


pub struct Emulator {
    state: EmulatorState,
    interrupts: InterruptController,
    devices: BTreeMap<u8, Arc<Mutex<dyn Device>>>,
    isa: InstructionSet,
}

impl Emulator {
    pub fn new() -> Emulator {
        Self::with_memory_size(DEFAULT_MEM_WORDS)
    }

    pub fn with_memory_size(words: usize) -> Emulator {
        Emulator {
            state: EmulatorState::with_memory_size(words),
            interrupts: InterruptController::new(InterruptPool::with_capacity(NUM_INTERRUPT_LEVELS)),
            devices: BTreeMap::new(),
            isa: InstructionSet::new(),
        }
    }

    delegate! {
        to self.state {
            pub fn mem_read(&self, addr: u16) -> u16;
            pub fn mem_write(&mut self, addr: u16, val: u16);
            pub fn mem_size(&self) -> usize;
            pub fn iar(&self) -> u16;
            pub fn set_iar(&mut self, val: u16);
            pub fn acc(&self) -> u16;
            pub fn set_acc(&mut self, val: u16);
            pub fn ext(&self) -> u16;
            pub fn set_ext(&mut self, val: u16);
            pub fn acc_ext(&self) -> u32;
            pub fn set_acc_ext(&mut self, val: u32);
            pub fn xr(&self, idx: u8) -> u16;
            pub fn set_xr(&mut self, idx: u8, val: u16);
            pub fn carry(&self) -> bool;
            pub fn overflow(&self) -> bool;
            pub fn wait(&self) -> bool;
            pub fn num_ins(&self) -> usize;
        }
    }

    pub fn get_state(&self) -> &EmulatorState {
        &self.state
    }

    pub fn get_state_mut(&mut self) -> &mut EmulatorState {
        &mut self.state
    }

    pub fn interrupts(&self) -> &InterruptController {
        &self.interrupts
    }

    pub fn load_image(&mut self, words: &[u16], start: u16) {
        for (offset, word) in words.iter().enumerate() {
            self.state.mem_write(start.wrapping_add(offset as u16), *word);
        }
    }

    // Operator intervention; nothing inside the machine clears wait.
    pub fn reset_wait(&mut self) {
        self.state.set_wait(false);
    }

    // Console reset: registers, flags, pending interrupts and device state.
    // Core, including the index registers, is left alone.
    pub fn reset(&mut self) {
        self.state.set_iar(0);
        self.state.set_acc_ext(0);
        self.state.set_status(Status::new());
        self.state.set_wait(false);
        self.interrupts.reset();
        for dev in self.devices.values() {
            lock(dev).reset();
        }
        debug!("Reset");
    }

    ///////////////////////////////////////////////////////////////////////////
    // Devices
    ///////////////////////////////////////////////////////////////////////////

    pub fn add_device(&mut self, device: impl Device + 'static) -> bool {
        self.add_shared_device(Arc::new(Mutex::new(device)))
    }

    // The first device registered for a selector keeps it.
    pub fn add_shared_device(&mut self, device: Arc<Mutex<dyn Device>>) -> bool {
        let code = lock(&device).device_code();
        if self.devices.contains_key(&code) {
            warn!("Device {code:#04x} already registered; ignoring");
            return false;
        }
        debug!("Registered device {code:#04x}");
        self.devices.insert(code, device);
        true
    }

    pub fn device(&self, code: u8) -> Option<Arc<Mutex<dyn Device>>> {
        self.devices.get(&code).cloned()
    }

    // Lets every device's slow operations make progress.
    pub fn tick_devices(&mut self) {
        let mut ctx = IoContext { state: &mut self.state, interrupts: &mut self.interrupts };
        for dev in self.devices.values() {
            lock(dev).step(&mut ctx);
        }
    }

    pub fn dispatch(&mut self, iocc: &Iocc) {
        let Some(dev) = self.devices.get(&iocc.device) else {
            debug!("XIO to unregistered device {:#04x} ignored", iocc.device);
            return;
        };
        let mut ctx = IoContext { state: &mut self.state, interrupts: &mut self.interrupts };
        lock(dev).execute_iocc(&mut ctx, iocc);
    }

    pub fn raise_interrupt(&mut self, device: u8, level: u8, status: u16) -> Option<InterruptId> {
        self.interrupts.raise(device, level, status)
    }

    // Ends service of the current level, asking the causing device whether it
    // still wants attention.
    pub fn clear_interrupt(&mut self) {
        let devices = &self.devices;
        self.interrupts.clear(|id, interrupt| {
            devices
                .get(&interrupt.device)
                .is_some_and(|dev| lock(dev).active_interrupt() == Some(id))
        });
    }

    ///////////////////////////////////////////////////////////////////////////
    // Driver
    ///////////////////////////////////////////////////////////////////////////

    // Run until wait.
    pub fn run(&mut self) {
        while self.step() != ExecRet::Wait {}
    }

    pub fn run_at(&mut self, iar: u16) {
        self.state.set_iar(iar);
        self.reset_wait();
        self.run();
    }

    // Returns the number of instructions executed.
    pub fn run_for(&mut self, max_ins: usize) -> usize {
        let start = self.state.num_ins();
        for _ in 0..max_ins {
            if self.step() == ExecRet::Wait {
                break;
            }
        }
        self.state.num_ins() - start
    }

    // Gives each device a time slice, then runs one instruction.
    pub fn step(&mut self) -> ExecRet {
        self.tick_devices();
        self.run_ins()
    }

    // One fetch/decode/execute, then one interrupt poll.
    pub fn run_ins(&mut self) -> ExecRet {
        if self.state.wait() {
            return ExecRet::Wait;
        }
        self.state.inc_ins();

        let addr = self.state.iar();
        let ins = self.fetch();
        match self.isa.get(ins.opcode) {
            Some(def) => (def.exec)(self, &ins),
            None => {
                warn!("Invalid instruction {:#06x} at {addr:#06x}; waiting", self.state.mem_read(addr));
                self.state.set_wait(true);
            }
        }

        self.interrupts.handle(&mut self.state);

        if self.state.wait() {
            ExecRet::Wait
        } else {
            ExecRet::Ok
        }
    }

    // Decodes at the IAR and steps past the instruction.
    pub fn fetch(&mut self) -> Ins {
        let words = self.state.next_ins();
        let long_ok = self.isa.long_format(opcode_bits(words[0]) as u8);
        let ins = decode(&words, long_ok);
        debug!("IAR: {:#06x}: {ins}", self.state.iar());
        self.state.set_iar(self.state.iar().wrapping_add(ins.size()));
        ins
    }

    ///////////////////////////////////////////////////////////////////////////
    // Execute
    ///////////////////////////////////////////////////////////////////////////

    // Long: absolute (or indexed), with one optional level of indirection.
    // Short: relative to the IAR (already past this instruction) or indexed.
    fn effective_address(&self, ins: &Ins) -> u16 {
        if ins.long {
            let base = if ins.tag == 0 { 0 } else { self.state.xr(ins.tag) };
            let addr = base.wrapping_add(ins.disp);
            if ins.indirect {
                self.state.mem_read(addr)
            } else {
                addr
            }
        } else {
            self.state.xr(ins.tag).wrapping_add(ins.short_disp() as u16)
        }
    }

    fn operand(&self, ins: &Ins) -> u16 {
        self.state.mem_read(self.effective_address(ins))
    }

    // Even/odd pair; an odd address names the same word twice.
    fn read_double(&self, addr: u16) -> u32 {
        ((self.state.mem_read(addr) as u32) << u16::BITS) | self.state.mem_read(addr | 1) as u32
    }

    fn write_double(&mut self, addr: u16, val: u32) {
        self.state.mem_write(addr, (val >> u16::BITS) as u16);
        self.state.mem_write(addr | 1, val as u16);
    }

    fn skip(&mut self) {
        trace!("Skip at {:#06x}", self.state.iar());
        self.state.set_iar(self.state.iar().wrapping_add(1));
    }

    // True if any requested condition holds. Asking about overflow turns it off.
    fn test_condition(&mut self, mask: u8) -> bool {
        let acc = self.state.acc() as i16;
        let mut met = false;
        if mask & cond::ZERO != 0 && acc == 0 {
            met = true;
        }
        if mask & cond::MINUS != 0 && acc < 0 {
            met = true;
        }
        if mask & cond::PLUS != 0 && acc > 0 {
            met = true;
        }
        if mask & cond::EVEN != 0 && acc & 0x1 == 0 {
            met = true;
        }
        if mask & cond::CARRY_OFF != 0 && !self.state.carry() {
            met = true;
        }
        if mask & cond::OVERFLOW_OFF != 0 {
            if !self.state.overflow() {
                met = true;
            }
            self.state.get_status_mut().set_overflow(false);
        }
        met
    }

    fn add_word(&mut self, b: u16) {
        let a = self.state.acc();
        let sum = a as u32 + b as u32;
        let res = sum as u16;
        let status = self.state.get_status_mut();
        status.set_carry(sum >> u16::BITS != 0);
        status.note_overflow((!a ^ b) & (a ^ res) & SIGN_BIT != 0);
        self.state.set_acc(res);
    }

    fn sub_word(&mut self, b: u16) {
        let a = self.state.acc();
        let diff = (a as u32).wrapping_sub(b as u32);
        let res = diff as u16;
        let status = self.state.get_status_mut();
        status.set_carry((diff >> u16::BITS) & 0x1 != 0);
        status.note_overflow((a ^ b) & (a ^ res) & SIGN_BIT != 0);
        self.state.set_acc(res);
    }

    fn add_double(&mut self, b: u32) {
        let a = self.state.acc_ext();
        let sum = a as u64 + b as u64;
        let res = sum as u32;
        let status = self.state.get_status_mut();
        status.set_carry(sum >> u32::BITS != 0);
        status.note_overflow((!a ^ b) & (a ^ res) & DOUBLE_SIGN_BIT != 0);
        self.state.set_acc_ext(res);
    }

    fn sub_double(&mut self, b: u32) {
        let a = self.state.acc_ext();
        let diff = (a as u64).wrapping_sub(b as u64);
        let res = diff as u32;
        let status = self.state.get_status_mut();
        status.set_carry((diff >> u32::BITS) & 0x1 != 0);
        status.note_overflow((a ^ b) & (a ^ res) & DOUBLE_SIGN_BIT != 0);
        self.state.set_acc_ext(res);
    }

    pub(crate) fn exec_ld(&mut self, ins: &Ins) {
        let val = self.operand(ins);
        self.state.set_acc(val);
    }

    pub(crate) fn exec_ldd(&mut self, ins: &Ins) {
        let val = self.read_double(self.effective_address(ins));
        self.state.set_acc_ext(val);
    }

    pub(crate) fn exec_sto(&mut self, ins: &Ins) {
        let addr = self.effective_address(ins);
        self.state.mem_write(addr, self.state.acc());
    }

    pub(crate) fn exec_std(&mut self, ins: &Ins) {
        let addr = self.effective_address(ins);
        self.write_double(addr, self.state.acc_ext());
    }

    pub(crate) fn exec_a(&mut self, ins: &Ins) {
        let val = self.operand(ins);
        self.add_word(val);
    }

    pub(crate) fn exec_ad(&mut self, ins: &Ins) {
        let val = self.read_double(self.effective_address(ins));
        self.add_double(val);
    }

    pub(crate) fn exec_s(&mut self, ins: &Ins) {
        let val = self.operand(ins);
        self.sub_word(val);
    }

    pub(crate) fn exec_sd(&mut self, ins: &Ins) {
        let val = self.read_double(self.effective_address(ins));
        self.sub_double(val);
    }

    pub(crate) fn exec_m(&mut self, ins: &Ins) {
        let multiplier = self.operand(ins) as i16 as i32;
        let multiplicand = self.state.acc() as i16 as i32;
        self.state.set_acc_ext((multiplicand * multiplier) as u32);
    }

    pub(crate) fn exec_d(&mut self, ins: &Ins) {
        let divisor = self.operand(ins) as i16 as i64;
        let dividend = self.state.acc_ext() as i32 as i64;
        if divisor == 0 {
            debug!("Divide by zero");
            self.state.get_status_mut().set_overflow(true);
            return;
        }

        let quot = dividend / divisor;
        let rem = dividend % divisor;
        match i16::try_from(quot) {
            Ok(q) => {
                self.state.set_acc(q as u16);
                self.state.set_ext(rem as u16);
            }
            Err(_) => {
                self.state.get_status_mut().set_overflow(true);
                self.state.set_acc_ext(quot as u32);
            }
        }
    }

    pub(crate) fn exec_and(&mut self, ins: &Ins) {
        let val = self.operand(ins);
        self.state.set_acc(self.state.acc() & val);
    }

    pub(crate) fn exec_or(&mut self, ins: &Ins) {
        let val = self.operand(ins);
        self.state.set_acc(self.state.acc() | val);
    }

    pub(crate) fn exec_eor(&mut self, ins: &Ins) {
        let val = self.operand(ins);
        self.state.set_acc(self.state.acc() ^ val);
    }

    // Sub-type and count come from the displacement, or from the index
    // register when one is named.
    fn shift_control(&self, ins: &Ins) -> (u16, u16) {
        let control = if ins.tag == 0 { ins.disp } else { self.state.xr(ins.tag) };
        let kind = (control >> shift::TYPE_SHIFT) & shift::TYPE_MASK;
        (kind, control & shift::COUNT_MASK)
    }

    pub(crate) fn exec_shift_left(&mut self, ins: &Ins) {
        let (kind, count) = self.shift_control(ins);
        match kind {
            shift::ACC_COUNT if ins.tag != 0 => self.shift_left_and_count(ins, count, false),
            shift::DOUBLE_COUNT if ins.tag != 0 => self.shift_left_and_count(ins, count, true),
            shift::DOUBLE | shift::DOUBLE_COUNT => {
                if count == 0 {
                    return;
                }
                let wide = (self.state.acc_ext() as u128) << count;
                self.state.get_status_mut().set_carry((wide >> u32::BITS) & 0x1 != 0);
                self.state.set_acc_ext(wide as u32);
            }
            _ => {
                if count == 0 {
                    return;
                }
                let wide = (self.state.acc() as u64) << count;
                self.state.get_status_mut().set_carry((wide >> u16::BITS) & 0x1 != 0);
                self.state.set_acc(wide as u16);
            }
        }
    }

    // Shifts until the sign position holds a one or the count runs out, then
    // leaves the unused count in the index register.
    fn shift_left_and_count(&mut self, ins: &Ins, count: u16, double: bool) {
        let mut val = if double {
            self.state.acc_ext()
        } else {
            (self.state.acc() as u32) << u16::BITS
        };
        let mut remaining = count;
        while remaining > 0 && val & DOUBLE_SIGN_BIT == 0 {
            val <<= 1;
            remaining -= 1;
        }

        if double {
            self.state.set_acc_ext(val);
        } else {
            self.state.set_acc((val >> u16::BITS) as u16);
        }
        self.state.get_status_mut().set_carry(remaining != 0);
        let xr = self.state.xr(ins.tag);
        self.state.set_xr(ins.tag, (xr & !shift::COUNT_MASK) | remaining);
    }

    pub(crate) fn exec_shift_right(&mut self, ins: &Ins) {
        let (kind, count) = self.shift_control(ins);
        match kind {
            shift::DOUBLE => {
                let val = (self.state.acc_ext() as i32) >> count.min(31);
                self.state.set_acc_ext(val as u32);
            }
            shift::ROTATE => {
                let val = self.state.acc_ext().rotate_right(count as u32);
                self.state.set_acc_ext(val);
            }
            _ => {
                let val = (self.state.acc() as i16) >> count.min(15);
                self.state.set_acc(val as u16);
            }
        }
    }

    pub(crate) fn exec_lds(&mut self, ins: &Ins) {
        self.state.set_status(Status::from_raw(ins.disp));
    }

    // Keeps the high byte so the stored word can itself be an LDS.
    pub(crate) fn exec_sts(&mut self, ins: &Ins) {
        let addr = self.effective_address(ins);
        let old = self.state.mem_read(addr);
        let status = self.state.get_status().to_raw();
        self.state.mem_write(addr, (old & 0xff00) | status);
        self.state.set_status(Status::new());
    }

    pub(crate) fn exec_wait(&mut self, _ins: &Ins) {
        debug!("WAIT at {:#06x}", self.state.iar().wrapping_sub(1));
        self.state.set_wait(true);
    }

    pub(crate) fn exec_bsi(&mut self, ins: &Ins) {
        let addr = self.effective_address(ins);
        if ins.long && self.test_condition(ins.conditions()) {
            return;
        }
        self.state.mem_write(addr, self.state.iar());
        self.state.set_iar(addr.wrapping_add(1));
    }

    // Short: skip if any condition holds. Long: branch if none does.
    // A taken long branch with the reset bit set clears the level being serviced.
    pub(crate) fn exec_bsc(&mut self, ins: &Ins) {
        if !ins.long {
            if self.test_condition(ins.conditions()) {
                self.skip();
            }
            return;
        }

        let addr = self.effective_address(ins);
        if self.test_condition(ins.conditions()) {
            return;
        }
        if ins.modifiers & cond::RESET_INTERRUPT != 0 {
            self.clear_interrupt();
        }
        self.state.set_iar(addr);
    }

    pub(crate) fn exec_ldx(&mut self, ins: &Ins) {
        let val = match (ins.long, ins.indirect) {
            (false, _) => ins.short_disp() as u16,
            (true, false) => ins.disp,
            (true, true) => self.state.mem_read(ins.disp),
        };
        self.state.set_xr(ins.tag, val);
    }

    pub(crate) fn exec_stx(&mut self, ins: &Ins) {
        let addr = match (ins.long, ins.indirect) {
            (false, _) => self.state.iar().wrapping_add(ins.short_disp() as u16),
            (true, false) => ins.disp,
            (true, true) => self.state.mem_read(ins.disp),
        };
        self.state.mem_write(addr, self.state.xr(ins.tag));
    }

    pub(crate) fn exec_mdx(&mut self, ins: &Ins) {
        let (old, new) = match (ins.long, ins.tag) {
            (false, 0) => {
                // Plain relative branch, never skips.
                let iar = self.state.iar().wrapping_add(ins.short_disp() as u16);
                self.state.set_iar(iar);
                return;
            }
            (false, tag) => {
                let old = self.state.xr(tag);
                let new = old.wrapping_add(ins.short_disp() as u16);
                self.state.set_xr(tag, new);
                (old, new)
            }
            (true, 0) => {
                // Add to memory; the modifier byte is the increment.
                let delta = ins.modifiers as i8 as i16 as u16;
                let old = self.state.mem_read(ins.disp);
                let new = old.wrapping_add(delta);
                self.state.mem_write(ins.disp, new);
                (old, new)
            }
            (true, tag) => {
                let delta = if ins.indirect { self.state.mem_read(ins.disp) } else { ins.disp };
                let old = self.state.xr(tag);
                let new = old.wrapping_add(delta);
                self.state.set_xr(tag, new);
                (old, new)
            }
        };

        if new == 0 || (old ^ new) & SIGN_BIT != 0 {
            self.skip();
        }
    }

    pub(crate) fn exec_xio(&mut self, ins: &Ins) {
        let addr = self.effective_address(ins);
        let iocc = Iocc::decode(&self.state, addr);
        debug!("XIO {addr:#06x}: {iocc:?}");
        match iocc.function() {
            Some(IoFunction::SenseInterrupt) => {
                let status = self
                    .interrupts
                    .current_level()
                    .map_or(0, |level| self.interrupts.level_status(level));
                self.state.set_acc(status);
            }
            _ => self.dispatch(&iocc),
        }
    }
}

impl Default for Emulator {
    fn default() -> Self {
        Self::new()
    }
}
