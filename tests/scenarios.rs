//! End-to-end scenarios: assemble real source, then execute it.

use std::fs;

use vostok::asm::index::Addrs;
use vostok::asm::Assembler;
use vostok::core::cpu::{CYCLE_SCALE, Flag};
use vostok::core::dbg::Breakpoint;
use vostok::core::hw::{Hardware, Request, Response};

/// Assembles source and boots a machine from the result.
fn boot(src: &str) -> Hardware {
    let out = Assembler::new().assemble_str(src, "demo.asm").unwrap();
    let mut hw = Hardware::new();
    hw.load_rom_at(&out.rom, out.base);
    hw.cpu.reg.sp = 0x2000;
    hw
}

#[test]
fn sbb_with_borrow() {
    let mut hw = boot(
        ".org 0x0100\n\
         MVI A, 0x00\n\
         MVI B, 0x01\n\
         SUB B\n\
         MVI B, 0xF0\n\
         SBB B\n\
         HLT\n",
    );
    for _ in 0..5 {
        hw.cpu.step();
    }
    assert_eq!(hw.cpu.reg.a, 0x0e);
    assert!(!Flag::CY.get(&hw.cpu.reg.f));
}

#[test]
fn local_label_jump() {
    let out = Assembler::new()
        .assemble_str(".org 0x0100\nstart: @loop: JMP @loop\n", "demo.asm")
        .unwrap();
    assert_eq!(out.base, 0x0100);
    assert_eq!(out.rom, [0xc3, 0x00, 0x01]);
}

#[test]
fn macro_expansion_addresses() {
    let out = Assembler::new()
        .assemble_str(
            ".org 0x0100\n\
             .macro pair()\n\
             MVI A, 1\n\
             NOP\n\
             .endmacro\n\
             NOP\n\
             pair()\n",
            "demo.asm",
        )
        .unwrap();

    // The invocation line (7) maps to the first emitted byte of the
    // expansion, with the second instruction's address alongside it
    let addrs = &out.index.line_addresses["demo.asm"]["7"];
    match addrs {
        Addrs::Many(list) => {
            assert_eq!(list[0], "0x0101");
            assert_eq!(list[1], "0x0103");
        }
        Addrs::One(addr) => panic!("expected a replay list, got {addr}"),
    }
}

#[test]
fn include_resolution() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("root.asm"),
        ".org 0x0500\nNOP\n.include \"child.asm\"\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("child.asm"),
        "NOP\n.include \"grand.asm\"\n",
    )
    .unwrap();
    fs::write(dir.path().join("grand.asm"), "deep: INR A\n").unwrap();

    let out = Assembler::new()
        .assemble_file(&dir.path().join("root.asm"))
        .unwrap();
    let label = &out.index.labels["deep"];
    assert_eq!(label.addr, "0x0502");
    assert_eq!(label.src, "grand.asm");
    assert_eq!(out.rom, [0x00, 0x00, 0x3c]);
}

#[test]
fn cycle_accounting() {
    let mut hw = boot(".org 0x0100\nLXI B, 0x1234\nINX B\nHLT\n");
    let mut total = 0u32;
    for _ in 0..2 {
        total += hw.cpu.step();
    }
    assert_eq!(hw.cpu.reg.bc(), 0x1235);
    assert_eq!(hw.cpu.reg.pc, 0x0104);
    // LXI is 10 machine cycles and INX 5, at 4 ticks each
    assert_eq!(total, (10 + 5) * CYCLE_SCALE);
    assert_eq!(hw.cpu.cycles, u64::from(total));
}

#[test]
fn rom_hot_patch() {
    let mut old = vec![0x00u8; 0x80];
    old[0] = 0x3e; // MVI A, 0x00
    let mut new = old.clone();
    new[0x42] = 0xaa;

    let mut hw = Hardware::new();
    hw.load_rom(&old);
    hw.dbg.breakpoint_add(
        0x0105,
        Breakpoint {
            enabled: true,
            ..Breakpoint::default()
        },
    );
    hw.cpu.step();
    let pc = hw.cpu.reg.pc;
    let a = hw.cpu.reg.a;

    let Response::Patched(patch) = hw.dispatch(Request::PatchRom { image: new }).unwrap() else {
        panic!("expected Patched response");
    };
    assert_eq!(patch.spans, 1);
    assert_eq!(patch.bytes, 1);

    // Registers and breakpoints are untouched; memory shows the new byte
    assert_eq!(hw.cpu.reg.pc, pc);
    assert_eq!(hw.cpu.reg.a, a);
    assert_eq!(hw.dbg.breakpoints().count(), 1);
    let Response::MemRange(bytes) = hw
        .dispatch(Request::GetMemRange {
            addr: 0x0142,
            len: 1,
        })
        .unwrap()
    else {
        panic!("expected MemRange response");
    };
    assert_eq!(bytes, [0xaa]);
}

#[test]
fn ram_disk_window_banks_data() {
    let mut hw = Hardware::new();
    // Disk 1: map the $A000 window onto RAM page 1
    hw.dispatch(Request::SetRamDiskMode {
        disk: 1,
        control: 0b0001_0010,
    })
    .unwrap();
    hw.dispatch(Request::SetMem {
        addr: 0xa000,
        data: vec![0x55],
    })
    .unwrap();

    let Response::MemRange(mapped) = hw
        .dispatch(Request::GetMemRange { addr: 0xa000, len: 1 })
        .unwrap()
    else {
        panic!("expected MemRange response");
    };
    assert_eq!(mapped, [0x55]);

    // Dropping the mapping reveals untouched main memory
    hw.dispatch(Request::SetRamDiskMode { disk: 1, control: 0 })
        .unwrap();
    let Response::MemRange(main) = hw
        .dispatch(Request::GetMemRange { addr: 0xa000, len: 1 })
        .unwrap()
    else {
        panic!("expected MemRange response");
    };
    assert_eq!(main, [0x00]);
}

#[test]
fn assembled_loop_runs_under_breakpoints() {
    // Count down from 3 in a macro-generated loop, then halt
    let out = Assembler::new()
        .assemble_str(
            ".org 0x0100\n\
             COUNT = 3\n\
             .macro countdown(n)\n\
             MVI B, n\n\
             @next: DCR B\n\
             JNZ @next\n\
             .endmacro\n\
             countdown(COUNT)\n\
             HLT\n",
            "demo.asm",
        )
        .unwrap();

    let mut hw = Hardware::new();
    hw.load_rom_at(&out.rom, out.base);
    hw.cpu.reg.sp = 0x2000;
    let Response::Run { stop, .. } = hw.dispatch(Request::Run { cycles: u64::MAX }).unwrap()
    else {
        panic!("expected Run response");
    };
    assert_eq!(stop, vostok::core::dbg::Stop::Halted);
    assert_eq!(hw.cpu.reg.b, 0);
}
