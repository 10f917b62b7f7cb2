//! Hardware façade.
//!
//! The single entry point external callers drive the machine through. Every
//! capability is a [`Request`] variant with a typed payload; dispatch is
//! synchronous and returns a typed [`Response`] or an error. The façade
//! owns the CPU (which owns its memory) and the debugger.

use log::debug;
use thiserror::Error;

use crate::cpu::{Cpu, State, insn::Insn};
use crate::dbg::{Breakpoint, Debugger, Patch, Stop};
use crate::mem::{MAX_DISKS, Memory, ROM_LOAD_ADDR, Space};
use crate::{Byte, Word};

/// A convenient type alias for [`Result`](std::result::Result).
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error raised by request dispatch.
#[derive(Debug, Error)]
pub enum Error {
    /// RAM-disk index out of range.
    #[error("no such RAM disk: {0} (limit {MAX_DISKS})")]
    Disk(usize),
}

/// A capability request.
#[derive(Clone, Debug)]
pub enum Request {
    /// Snapshot the CPU state.
    GetCpuState,
    /// Read a memory range (logical addresses, data space).
    GetMemRange {
        /// First address.
        addr: Word,
        /// Number of bytes.
        len: usize,
    },
    /// Write bytes starting at an address.
    SetMem {
        /// First address.
        addr: Word,
        /// Bytes to write.
        data: Vec<Byte>,
    },
    /// Reset the machine and return to the ROM entry point.
    Restart,
    /// Execute exactly one instruction.
    ExecuteInstr,
    /// Run under a cycle budget with breakpoints ignored.
    ExecuteFrameNoBreaks {
        /// Cycle budget.
        cycles: u64,
    },
    /// Run under a cycle budget, honouring breakpoints.
    Run {
        /// Cycle budget.
        cycles: u64,
    },
    /// Step over call-like instructions.
    StepOver,
    /// Run until the current subroutine returns.
    StepOut,
    /// Insert or update a breakpoint.
    BreakpointAdd {
        /// Breakpoint address.
        addr: Word,
        /// Whether it starts enabled.
        enabled: bool,
        /// One-shot: removed after it fires.
        autodel: bool,
        /// Optional annotation.
        comment: Option<String>,
    },
    /// Remove the breakpoint at an address.
    BreakpointDel {
        /// Breakpoint address.
        addr: Word,
    },
    /// Clear the breakpoint table.
    BreakpointDelAll,
    /// Decode the instruction at an address.
    GetInstr {
        /// Instruction address.
        addr: Word,
    },
    /// Read the accumulated memory-access log.
    MemAccessLogGet,
    /// Clear the memory-access log window.
    MemAccessLogReset,
    /// Load a ROM image at an address.
    LoadRom {
        /// Image bytes.
        image: Vec<Byte>,
        /// Load address.
        at: Word,
    },
    /// Hot-patch the loaded ROM with a newer image.
    PatchRom {
        /// Replacement image.
        image: Vec<Byte>,
    },
    /// Update one RAM disk's mapping control byte.
    SetRamDiskMode {
        /// Disk index.
        disk: usize,
        /// Control byte.
        control: Byte,
    },
    /// Request a cooperative stop of the current run.
    Stop,
}

/// A dispatch response.
#[derive(Clone, Debug)]
pub enum Response {
    /// Request completed without a payload.
    Ok,
    /// CPU state snapshot.
    CpuState(State),
    /// Memory range contents.
    MemRange(Vec<Byte>),
    /// Cycles consumed by a single instruction.
    Cycles(u32),
    /// Why a run stopped, and the cycles it consumed.
    Run {
        /// Stop reason.
        stop: Stop,
        /// Cycles consumed.
        cycles: u64,
    },
    /// Decoded instruction.
    Instr {
        /// Instruction address.
        addr: Word,
        /// Canonical mnemonic.
        repr: &'static str,
        /// Instruction bytes.
        bytes: Vec<Byte>,
    },
    /// Accumulated (reads, writes) address sets.
    AccessLog {
        /// Addresses read since the last reset.
        reads: Vec<Word>,
        /// Addresses written since the last reset.
        writes: Vec<Word>,
    },
    /// Hot-patch statistics.
    Patched(Patch),
}

/// The assembled machine.
#[derive(Debug, Default)]
pub struct Hardware {
    /// Processor (owning its memory).
    pub cpu: Cpu,
    /// Debugger hooks.
    pub dbg: Debugger,
    entry: Word,
}

impl Hardware {
    /// Constructs a new `Hardware` with empty memory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cpu: Cpu::new(Memory::new()),
            dbg: Debugger::new(),
            entry: ROM_LOAD_ADDR,
        }
    }

    /// Loads a ROM at the default load address and points PC at it.
    pub fn load_rom(&mut self, image: &[Byte]) {
        self.load_rom_at(image, ROM_LOAD_ADDR);
    }

    /// Loads a ROM at an address and points PC at it.
    pub fn load_rom_at(&mut self, image: &[Byte], at: Word) {
        self.cpu.mem.load_rom(image, at);
        self.entry = at;
        self.cpu.reg.pc = at;
    }

    /// Resets CPU and memory, returning to the ROM entry point.
    ///
    /// The breakpoint table survives restarts.
    pub fn restart(&mut self) {
        debug!("restart; entry {:#06x}", self.entry);
        self.cpu.reset();
        self.cpu.mem.reset();
        self.cpu.reg.pc = self.entry;
    }

    /// Dispatches one request.
    ///
    /// # Errors
    ///
    /// Errors when the payload is invalid for the machine (for instance a
    /// RAM-disk index past the last slot).
    pub fn dispatch(&mut self, request: Request) -> Result<Response> {
        match request {
            Request::GetCpuState => Ok(Response::CpuState(State::from(&self.cpu))),
            Request::GetMemRange { addr, len } => {
                let bytes = (0..len)
                    .map(|offset| {
                        let at = addr.wrapping_add(offset as Word);
                        self.cpu.mem.read(at, Space::Data)
                    })
                    .collect();
                Ok(Response::MemRange(bytes))
            }
            Request::SetMem { addr, data } => {
                for (offset, byte) in data.into_iter().enumerate() {
                    let at = addr.wrapping_add(offset as Word);
                    self.cpu.mem.write(at, Space::Data, byte);
                }
                Ok(Response::Ok)
            }
            Request::Restart => {
                self.restart();
                Ok(Response::Ok)
            }
            Request::ExecuteInstr => Ok(Response::Cycles(self.dbg.step_into(&mut self.cpu))),
            Request::ExecuteFrameNoBreaks { cycles } => {
                let (stop, cycles) = self.dbg.run_no_breaks(&mut self.cpu, cycles);
                Ok(Response::Run { stop, cycles })
            }
            Request::Run { cycles } => {
                let (stop, cycles) = self.dbg.run(&mut self.cpu, cycles);
                Ok(Response::Run { stop, cycles })
            }
            Request::StepOver => {
                let (stop, cycles) = self.dbg.step_over(&mut self.cpu);
                Ok(Response::Run { stop, cycles })
            }
            Request::StepOut => {
                let (stop, cycles) = self.dbg.step_out(&mut self.cpu);
                Ok(Response::Run { stop, cycles })
            }
            Request::BreakpointAdd {
                addr,
                enabled,
                autodel,
                comment,
            } => {
                self.dbg.breakpoint_add(
                    addr,
                    Breakpoint {
                        enabled,
                        autodel,
                        comment,
                    },
                );
                Ok(Response::Ok)
            }
            Request::BreakpointDel { addr } => {
                self.dbg.breakpoint_del(addr);
                Ok(Response::Ok)
            }
            Request::BreakpointDelAll => {
                self.dbg.breakpoint_del_all();
                Ok(Response::Ok)
            }
            Request::GetInstr { addr } => {
                let code = self.cpu.mem.read(addr, Space::Data);
                let insn = Insn::decode(code);
                let bytes = (0..Word::from(insn.size))
                    .map(|offset| self.cpu.mem.read(addr.wrapping_add(offset), Space::Data))
                    .collect();
                Ok(Response::Instr {
                    addr,
                    repr: insn.repr,
                    bytes,
                })
            }
            Request::MemAccessLogGet => {
                let (reads, writes) = self.dbg.access_log();
                Ok(Response::AccessLog {
                    reads: reads.iter().copied().collect(),
                    writes: writes.iter().copied().collect(),
                })
            }
            Request::MemAccessLogReset => {
                self.dbg.access_log_reset();
                Ok(Response::Ok)
            }
            Request::LoadRom { image, at } => {
                self.load_rom_at(&image, at);
                Ok(Response::Ok)
            }
            Request::PatchRom { image } => {
                let old = self.cpu.mem.rom().to_vec();
                let patch = crate::dbg::hot_patch(&mut self.cpu, &old, &image);
                Ok(Response::Patched(patch))
            }
            Request::SetRamDiskMode { disk, control } => {
                if disk >= MAX_DISKS {
                    return Err(Error::Disk(disk));
                }
                self.cpu.mem.set_disk_mode(disk, control);
                Ok(Response::Ok)
            }
            Request::Stop => {
                self.dbg.request_stop();
                Ok(Response::Ok)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(program: &[Byte]) -> Hardware {
        let mut hw = Hardware::new();
        hw.load_rom(program);
        hw.cpu.reg.sp = 0x2000;
        hw
    }

    #[test]
    fn dispatch_covers_the_execution_loop() {
        // MVI A,0x2A / STA 0x3000 / HLT
        let mut hw = machine(&[0x3e, 0x2a, 0x32, 0x00, 0x30, 0x76]);

        let Response::Run { stop, .. } = hw
            .dispatch(Request::Run { cycles: u64::MAX })
            .unwrap()
        else {
            panic!("expected Run response");
        };
        assert_eq!(stop, Stop::Halted);

        let Response::CpuState(state) = hw.dispatch(Request::GetCpuState).unwrap() else {
            panic!("expected CpuState response");
        };
        assert_eq!(state.a, 0x2a);
        assert!(state.halted);

        let Response::MemRange(bytes) = hw
            .dispatch(Request::GetMemRange { addr: 0x3000, len: 1 })
            .unwrap()
        else {
            panic!("expected MemRange response");
        };
        assert_eq!(bytes, [0x2a]);
    }

    #[test]
    fn restart_returns_to_entry_and_keeps_breakpoints() {
        let mut hw = machine(&[0x3c, 0x76]); // INR A / HLT
        hw.dispatch(Request::BreakpointAdd {
            addr: 0x0101,
            enabled: true,
            autodel: false,
            comment: Some("after INR".into()),
        })
        .unwrap();
        hw.dispatch(Request::Run { cycles: u64::MAX }).unwrap();
        assert_eq!(hw.cpu.reg.a, 1);

        hw.dispatch(Request::Restart).unwrap();
        assert_eq!(hw.cpu.reg.pc, 0x0100);
        assert_eq!(hw.cpu.reg.a, 0);
        assert_eq!(hw.dbg.breakpoints().count(), 1);
    }

    #[test]
    fn get_instr_decodes_bytes() {
        let mut hw = machine(&[0x01, 0x34, 0x12]);
        let Response::Instr { repr, bytes, .. } =
            hw.dispatch(Request::GetInstr { addr: 0x0100 }).unwrap()
        else {
            panic!("expected Instr response");
        };
        assert_eq!(repr, "LXI B");
        assert_eq!(bytes, [0x01, 0x34, 0x12]);
    }

    #[test]
    fn disk_index_is_validated() {
        let mut hw = machine(&[]);
        assert!(
            hw.dispatch(Request::SetRamDiskMode { disk: 8, control: 1 })
                .is_err()
        );
        assert!(
            hw.dispatch(Request::SetRamDiskMode { disk: 0, control: 1 })
                .is_ok()
        );
    }

    #[test]
    fn set_mem_then_read_back() {
        let mut hw = machine(&[]);
        hw.dispatch(Request::SetMem {
            addr: 0x4000,
            data: vec![1, 2, 3],
        })
        .unwrap();
        let Response::MemRange(bytes) = hw
            .dispatch(Request::GetMemRange { addr: 0x4000, len: 3 })
            .unwrap()
        else {
            panic!("expected MemRange response");
        };
        assert_eq!(bytes, [1, 2, 3]);
    }

    #[test]
    fn patch_rom_reports_spans() {
        let mut hw = machine(&[0x00, 0x11, 0x22]);
        let Response::Patched(patch) = hw
            .dispatch(Request::PatchRom {
                image: vec![0x00, 0x99, 0x22],
            })
            .unwrap()
        else {
            panic!("expected Patched response");
        };
        assert_eq!(patch, Patch { spans: 1, bytes: 1 });
        assert_eq!(hw.cpu.mem.read(0x0101, Space::Data), 0x99);
    }
}
