
use common::asm::{shift, Opcode};

use crate::{check_flags, exec, load, run, wait};

#[test]
fn lds() {
    check_flags(&exec(&[Opcode::Lds.short(0, 0x3), wait()]), true, true);
    check_flags(&exec(&[Opcode::Lds.short(0, 0x2), wait()]), true, false);
    check_flags(&exec(&[Opcode::Lds.short(0, 0x1), wait()]), false, true);
    check_flags(&exec(&[Opcode::Lds.short(0, 0x3), Opcode::Lds.short(0, 0), wait()]), false, false);
}

#[test]
fn sts_keeps_high_byte_and_clears() {
    let mut bin = vec![Opcode::Lds.short(0, 0x3)];
    bin.extend(Opcode::Sts.long(0, 0x300));
    bin.push(wait());
    let mut emu = load(&bin);
    emu.mem_write(0x300, 0xab00 | 0xff);
    run(&mut emu);
    assert_eq!(emu.mem_read(0x300), 0xab03);
    check_flags(&emu, false, false);
}

#[test]
fn sts_then_lds_restores() {
    let mut bin = vec![Opcode::Lds.short(0, 0x2)];
    bin.extend(Opcode::Sts.long(0, 0x300));
    bin.extend(Opcode::Bsc.long(0, 0x300));
    let mut emu = load(&bin);
    emu.mem_write(0x300, Opcode::Lds.short(0, 0));
    emu.mem_write(0x301, wait());
    run(&mut emu);
    assert_eq!(emu.iar(), 0x302);
    check_flags(&emu, true, false);
}

#[test]
fn loads_and_shifts_keep_overflow() {
    let bin = [
        Opcode::Lds.short(0, 0x1),
        Opcode::Ld.short(0, 2),
        Opcode::ShiftRight.short(0, shift::control(shift::ACC, 1)),
        wait(),
        0x0004,
    ];
    let emu = exec(&bin);
    assert_eq!(emu.acc(), 2);
    check_flags(&emu, false, true);
}
