
use common::asm::Opcode;

use crate::{exec, load, run, wait, START};

#[test]
fn ldx_short_sign_extends() {
    let emu = exec(&[Opcode::Ldx.short(1, -2), wait()]);
    assert_eq!(emu.xr(1), 0xfffe);
    assert_eq!(emu.mem_read(1), 0xfffe);
}

#[test]
fn ldx_long_and_indirect() {
    let mut bin = vec![];
    bin.extend(Opcode::Ldx.long(2, 0x1234));
    bin.extend(Opcode::Ldx.long_indirect(3, 0x300));
    bin.push(wait());
    let mut emu = load(&bin);
    emu.mem_write(0x300, 0x4321);
    run(&mut emu);
    assert_eq!(emu.xr(2), 0x1234);
    assert_eq!(emu.xr(3), 0x4321);
}

#[test]
fn ldx_iar_is_a_jump() {
    let mut bin = vec![];
    bin.extend(Opcode::Ldx.long(0, 0x300));
    bin.push(wait());
    let mut emu = load(&bin);
    emu.mem_write(0x300, wait());
    run(&mut emu);
    assert_eq!(emu.iar(), 0x301);
}

#[test]
fn stx_short_is_iar_relative() {
    let bin = [
        Opcode::Ldx.short(1, 0x55),
        Opcode::Stx.short(1, 1),
        wait(),
        0,
    ];
    let emu = exec(&bin);
    assert_eq!(emu.mem_read(START + 3), 0x55);
}

#[test]
fn stx_long_and_indirect() {
    let mut bin = vec![];
    bin.extend(Opcode::Ldx.long(2, 0x2222));
    bin.extend(Opcode::Stx.long(2, 0x300));
    bin.extend(Opcode::Stx.long_indirect(2, 0x301));
    bin.push(wait());
    let mut emu = load(&bin);
    emu.mem_write(0x301, 0x400);
    run(&mut emu);
    assert_eq!(emu.mem_read(0x300), 0x2222);
    assert_eq!(emu.mem_read(0x400), 0x2222);
}

#[test]
fn mdx_short_branch_never_skips() {
    let bin = [
        Opcode::Mdx.short(0, 1),
        wait(),
        wait(),
    ];
    let emu = exec(&bin);
    assert_eq!(emu.iar(), START + 3);
}

// ldx; mdx; wait; wait. Returns the new XR and whether the mdx skipped.
fn mdx_xr(start: u16, delta: i8) -> (u16, bool) {
    let mut bin = vec![];
    bin.extend(Opcode::Ldx.long(1, start));
    bin.push(Opcode::Mdx.short(1, delta));
    bin.push(wait());
    bin.push(wait());
    let emu = exec(&bin);
    (emu.xr(1), emu.iar() == START + 5)
}

#[test]
fn mdx_xr_skip_rules() {
    assert_eq!(mdx_xr(5, -1), (4, false));
    assert_eq!(mdx_xr(1, -1), (0, true));
    assert_eq!(mdx_xr(0xffff, 1), (0, true));
    assert_eq!(mdx_xr(0x7fff, 1), (0x8000, true));
    assert_eq!(mdx_xr(0x8000, -1), (0x7fff, true));
    assert_eq!(mdx_xr(0xfff0, 1), (0xfff1, false));
}

#[test]
fn mdx_long_xr() {
    let mut bin = vec![];
    bin.extend(Opcode::Ldx.long(2, 0x100));
    bin.extend(Opcode::Mdx.long(2, 0x0020));
    bin.extend(Opcode::Mdx.long_indirect(2, 0x300));
    bin.push(wait());
    let mut emu = load(&bin);
    emu.mem_write(0x300, 0x0003);
    run(&mut emu);
    assert_eq!(emu.xr(2), 0x123);
}

#[test]
fn mdx_long_memory() {
    let mut bin = vec![];
    bin.extend(Opcode::Mdx.long_mod(0, 0xff, 0x300));   // decrement 0x300
    bin.push(wait());
    bin.push(wait());
    let mut emu = load(&bin);
    emu.mem_write(0x300, 1);
    run(&mut emu);
    assert_eq!(emu.mem_read(0x300), 0);
    assert_eq!(emu.iar(), START + 4);

    let mut emu = load(&bin);
    emu.mem_write(0x300, 10);
    run(&mut emu);
    assert_eq!(emu.mem_read(0x300), 9);
    assert_eq!(emu.iar(), START + 3);
}
