
use std::sync::{Arc, Mutex};

use common::asm::{cond, Opcode};
use common::constants::INTERRUPT_VECTOR_BASE;
use emu_lib::io::console::{Console, PipeKeyboard, PipePrinter};
use emu_lib::io::disk::Disk;
use emu_lib::{Device, Emulator, IoFunction, Iocc};

use crate::{check_flags, load, return_from_interrupt, run, wait, START};

const HANDLER: u16 = 0x520;
const COMMAND_IOCC: u16 = 0x540;
const SENSE_IOCC: u16 = 0x544;
const FLAG: u16 = 0x600;
const BUFFER: u16 = 0x700;

// Issue the command at COMMAND_IOCC, then spin until the interrupt handler
// (sense device with reset, store DSW at FLAG) has run.
fn command_and_wait(device: u8, function: IoFunction, modifiers: u8, address: u16, level: u8) -> Emulator {
    let mut bin = vec![];
    bin.extend(Opcode::Xio.long(0, COMMAND_IOCC));            // START
    bin.extend(Opcode::Ld.long(0, FLAG));                     // START + 2
    bin.push(Opcode::Bsc.short(0, (cond::PLUS | cond::MINUS) as i8));
    bin.push(Opcode::Mdx.short(0, -4));                       // back to ld
    bin.push(wait());
    let mut emu = load(&bin);

    emu.load_image(&[address, Iocc::encode(device, function, modifiers)], COMMAND_IOCC);
    emu.load_image(&[0, Iocc::encode(device, IoFunction::SenseDevice, 0x01)], SENSE_IOCC);

    let mut handler = vec![0];
    handler.extend(Opcode::Xio.long(0, SENSE_IOCC));
    handler.extend(Opcode::Sto.long(0, FLAG));
    handler.extend(return_from_interrupt(HANDLER));
    emu.load_image(&handler, HANDLER);
    emu.mem_write(INTERRUPT_VECTOR_BASE + level as u16, HANDLER);
    emu
}

#[test]
fn unregistered_device_ignored() {
    let mut bin = vec![];
    bin.extend(Opcode::Xio.long(0, COMMAND_IOCC));
    bin.push(wait());
    let mut emu = load(&bin);
    emu.load_image(&[BUFFER, Iocc::encode(0x1d, IoFunction::InitRead, 0)], COMMAND_IOCC);
    run(&mut emu);
    assert_eq!(emu.iar(), START + 3);
    assert_eq!(emu.interrupts().active_count(), 0);
}

#[test]
fn duplicate_device_refused() {
    let mut emu = Emulator::new();
    assert!(emu.add_device(Disk::new(0).unwrap()));
    assert!(!emu.add_device(Disk::new(0).unwrap()));
    assert!(emu.add_device(Disk::new(1).unwrap()));
    assert!(emu.device(0x04).is_some());
    assert!(emu.device(0x09).is_some());
    assert!(emu.device(0x05).is_none());
}

#[test]
fn reset_clears_registers_interrupts_and_devices() {
    let console = Arc::new(Mutex::new(Console::new(Arc::new(PipePrinter::default())).with_delay(100)));
    let mut bin = vec![];
    bin.extend(Opcode::Xio.long(0, COMMAND_IOCC));
    bin.push(wait());
    let mut emu = load(&bin);
    emu.add_shared_device(console.clone());
    emu.load_image(&[BUFFER, Iocc::encode(Console::DEVICE_CODE, IoFunction::Write, 0)], COMMAND_IOCC);
    emu.mem_write(BUFFER, (b'R' as u16) << 8);
    emu.set_xr(1, 0x1234);

    run(&mut emu);
    emu.set_acc_ext(0xdead_beef);
    emu.get_state_mut().get_status_mut().set_overflow(true);
    emu.raise_interrupt(0x1f, 3, 0x0001);
    assert!(console.lock().unwrap().busy());
    assert_eq!(emu.interrupts().active_count(), 1);

    emu.reset();
    assert_eq!(emu.iar(), 0);
    assert_eq!(emu.acc_ext(), 0);
    assert!(!emu.wait());
    check_flags(&emu, false, false);
    assert_eq!(emu.interrupts().active_count(), 0);
    assert_eq!(emu.interrupts().pool().in_use(), 0);
    assert!(!console.lock().unwrap().busy());
    assert_eq!(console.lock().unwrap().dsw(), 0);
    assert_eq!(emu.xr(1), 0x1234);
    assert_eq!(emu.mem_read(BUFFER), (b'R' as u16) << 8);

    for _ in 0..200 {
        emu.tick_devices();
    }
    assert_eq!(emu.interrupts().active_count(), 0);
}

#[test]
fn console_print_interrupts_after_delay() {
    let printer = Arc::new(PipePrinter::default());
    let mut emu = command_and_wait(Console::DEVICE_CODE, IoFunction::Write, 0, BUFFER, Console::LEVEL);
    emu.add_device(Console::new(printer.clone()).with_delay(5));
    emu.mem_write(BUFFER, (b'H' as u16) << 8);

    run(&mut emu);
    assert_eq!(printer.take(), [b'H']);
    assert_eq!(emu.mem_read(FLAG), Console::PRINTER_RESPONSE);
    assert_eq!(emu.interrupts().active_count(), 0);
    assert_eq!(emu.interrupts().service_depth(), 0);
}

#[test]
fn console_keyboard() {
    let keyboard = Arc::new(PipeKeyboard::default());
    let console = Console::new(Arc::new(PipePrinter::default())).with_keyboard(keyboard.clone());
    let mut emu = command_and_wait(Console::DEVICE_CODE, IoFunction::Control, 0x01, 0, Console::LEVEL);
    emu.add_device(console);
    keyboard.push_input(b'k');

    run(&mut emu);
    assert_eq!(emu.mem_read(FLAG), Console::KEYBOARD_RESPONSE);

    // Read the key that caused the interrupt.
    let mut bin = vec![];
    bin.extend(Opcode::Xio.long(0, COMMAND_IOCC));
    bin.push(wait());
    emu.load_image(&bin, START);
    emu.load_image(&[BUFFER, Iocc::encode(Console::DEVICE_CODE, IoFunction::Read, 0)], COMMAND_IOCC);
    run(&mut emu);
    assert_eq!(emu.mem_read(BUFFER) >> 8, b'k' as u16);
}

#[test]
fn device_interrupt_held_until_acknowledged() {
    let mut bin = vec![];
    bin.extend(Opcode::Xio.long(0, COMMAND_IOCC));
    bin.push(Opcode::Mdx.short(0, -1));                       // spin
    let mut emu = load(&bin);
    emu.add_device(Console::new(Arc::new(PipePrinter::default())).with_delay(1));
    emu.load_image(&[BUFFER, Iocc::encode(Console::DEVICE_CODE, IoFunction::Write, 0)], COMMAND_IOCC);

    // Returns without sensing the device, so the console keeps its request.
    let mut handler = vec![0];
    handler.extend(return_from_interrupt(HANDLER));
    emu.load_image(&handler, HANDLER);
    emu.mem_write(INTERRUPT_VECTOR_BASE + Console::LEVEL as u16, HANDLER);

    emu.set_iar(START);
    assert_eq!(emu.run_for(50), 50);
    assert_eq!(emu.interrupts().active_count(), 1);
    assert_eq!(emu.interrupts().queue_len(Console::LEVEL), 1);
    assert_eq!(emu.interrupts().pool().in_use(), 1);
    assert_eq!(emu.mem_read(HANDLER), START + 2);
}

#[test]
fn disk_read_by_cycle_steal() {
    let image: Vec<u16> = (1..=Disk::WORDS_PER_SECTOR as u16).collect();
    let disk = Arc::new(Mutex::new(Disk::with_cartridge(0, image).unwrap()));
    let mut emu = command_and_wait(0x04, IoFunction::InitRead, 0, BUFFER, Disk::LEVEL);
    assert!(emu.add_shared_device(disk.clone()));
    emu.mem_write(BUFFER, 10);

    run(&mut emu);
    for i in 0..10 {
        assert_eq!(emu.mem_read(BUFFER + 1 + i), i + 1);
    }
    assert_eq!(emu.mem_read(BUFFER + 11), 0);
    assert_eq!(emu.mem_read(FLAG), Disk::OP_COMPLETE | Disk::HOME);
    assert!(disk.lock().unwrap().active_interrupt().is_none());
}

#[test]
fn disk_write_by_cycle_steal() {
    let disk = Arc::new(Mutex::new(Disk::new(0).unwrap()));
    let mut emu = command_and_wait(0x04, IoFunction::InitWrite, 3, BUFFER, Disk::LEVEL);
    assert!(emu.add_shared_device(disk.clone()));
    emu.load_image(&[4, 0xa, 0xb, 0xc, 0xd, 0xe], BUFFER);

    run(&mut emu);
    let disk = disk.lock().unwrap();
    let start = 3 * Disk::WORDS_PER_SECTOR;
    assert_eq!(&disk.cartridge()[start..start + 5], &[0xa, 0xb, 0xc, 0xd, 0]);
    assert_eq!(emu.interrupts().active_count(), 0);
}
