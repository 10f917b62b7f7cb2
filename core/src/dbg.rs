//! Debugger hooks.
//!
//! Breakpoint table, step primitives, the accumulated memory-access log,
//! and ROM hot-patching. The debugger sits between the embedder and the
//! CPU: [`Debugger::run`] advances the processor under breakpoint control
//! and a cycle budget, checking the stop flag between instructions.

use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use log::{debug, info};

use crate::cpu::{Cpu, insn::Insn};
use crate::{Byte, Word};

/// Default cycle budget for unbounded step primitives.
const STEP_BUDGET: u64 = 4_000_000;

/// Debugging breakpoint metadata.
#[derive(Clone, Debug, Default)]
pub struct Breakpoint {
    /// Whether the breakpoint is active.
    pub enabled: bool,
    /// One-shot: removed after it fires.
    pub autodel: bool,
    /// Optional annotation.
    pub comment: Option<String>,
}

/// Why a run stopped.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Stop {
    /// Stopped before the instruction at an enabled breakpoint.
    Breakpoint(Word),
    /// The cycle budget ran out.
    Budget,
    /// The CPU halted with interrupts disabled.
    Halted,
    /// The embedder requested a stop.
    Requested,
    /// A single step completed with no stop condition.
    Stepped,
}

/// Interactive debugger state.
#[derive(Debug, Default)]
pub struct Debugger {
    bpts: IndexMap<Word, Breakpoint>,
    reads: IndexSet<Word>,
    writes: IndexSet<Word>,
    stop: bool,
    /// Breakpoint address the last run stopped at; a resuming run gets past
    /// it without re-triggering.
    resume: Option<Word>,
}

impl Debugger {
    /// Constructs a new `Debugger`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Breakpoint table.

    /// Inserts or updates a breakpoint; idempotent per address.
    pub fn breakpoint_add(&mut self, addr: Word, bpt: Breakpoint) {
        debug!("breakpoint @ ${addr:04x}: {bpt:?}");
        self.bpts.insert(addr, bpt);
    }

    /// Removes the breakpoint at an address.
    pub fn breakpoint_del(&mut self, addr: Word) -> bool {
        self.bpts.shift_remove(&addr).is_some()
    }

    /// Clears the breakpoint table.
    pub fn breakpoint_del_all(&mut self) {
        self.bpts.clear();
    }

    /// Iterates the breakpoint table.
    pub fn breakpoints(&self) -> impl Iterator<Item = (Word, &Breakpoint)> {
        self.bpts.iter().map(|(&addr, bpt)| (addr, bpt))
    }

    /// Checks for an enabled breakpoint at `pc`, consuming one-shots.
    ///
    /// Evaluation happens before the instruction at `pc` is fetched.
    fn hit(&mut self, pc: Word) -> bool {
        let Some(bpt) = self.bpts.get(&pc) else {
            return false;
        };
        if !bpt.enabled {
            return false;
        }
        if bpt.autodel {
            self.bpts.shift_remove(&pc);
        }
        true
    }

    // Stop control.

    /// Requests a cooperative stop; honoured between instructions.
    pub fn request_stop(&mut self) {
        self.stop = true;
    }

    // Execution control.

    /// Runs until a breakpoint, the cycle budget, a halt, or a stop
    /// request. Returns why and the cycles consumed.
    ///
    /// Breakpoints are evaluated before every fetch, the current PC
    /// included. A run resuming from the breakpoint it just reported gets
    /// past it without re-triggering; a breakpoint reached any other way
    /// always fires first.
    pub fn run(&mut self, cpu: &mut Cpu, budget: u64) -> (Stop, u64) {
        self.stop = false;
        let mut spent = 0u64;
        let mut resume = self.resume.take();
        loop {
            if resume != Some(cpu.reg.pc) && self.hit(cpu.reg.pc) {
                self.resume = Some(cpu.reg.pc);
                return (Stop::Breakpoint(cpu.reg.pc), spent);
            }
            resume = None;
            if spent >= budget {
                return (Stop::Budget, spent);
            }
            spent += u64::from(cpu.step());
            self.absorb(cpu);
            if self.stop {
                return (Stop::Requested, spent);
            }
            if cpu.halted && !cpu.int_enabled() {
                return (Stop::Halted, spent);
            }
        }
    }

    /// Runs under a cycle budget with breakpoints ignored.
    pub fn run_no_breaks(&mut self, cpu: &mut Cpu, budget: u64) -> (Stop, u64) {
        self.stop = false;
        self.resume = None;
        let mut spent = 0u64;
        while spent < budget {
            spent += u64::from(cpu.step());
            self.absorb(cpu);
            if self.stop {
                return (Stop::Requested, spent);
            }
            if cpu.halted && !cpu.int_enabled() {
                return (Stop::Halted, spent);
            }
        }
        (Stop::Budget, spent)
    }

    /// Executes exactly one instruction.
    pub fn step_into(&mut self, cpu: &mut Cpu) -> u32 {
        // An explicit step consumes any pending resume point
        self.resume = None;
        let cycles = cpu.step();
        self.absorb(cpu);
        cycles
    }

    /// Steps over call-like instructions.
    ///
    /// For `CALL`/`Ccc`/`RST` a one-shot breakpoint is planted after the
    /// instruction and execution resumes; anything else is a plain step.
    pub fn step_over(&mut self, cpu: &mut Cpu) -> (Stop, u64) {
        let code = cpu.mem.read(cpu.reg.pc, crate::mem::Space::Data);
        if is_call(code) {
            let after = cpu.reg.pc.wrapping_add(Word::from(Insn::decode(code).size));
            self.breakpoint_add(
                after,
                Breakpoint {
                    enabled: true,
                    autodel: true,
                    comment: None,
                },
            );
            self.run(cpu, STEP_BUDGET)
        } else {
            let cycles = self.step_into(cpu);
            (Stop::Stepped, u64::from(cycles))
        }
    }

    /// Runs until the current subroutine returns.
    ///
    /// Plants a one-shot at the return address on top of the stack.
    pub fn step_out(&mut self, cpu: &mut Cpu) -> (Stop, u64) {
        let ret = cpu.mem.read_word(cpu.reg.sp, crate::mem::Space::Stack);
        self.breakpoint_add(
            ret,
            Breakpoint {
                enabled: true,
                autodel: true,
                comment: None,
            },
        );
        self.run(cpu, STEP_BUDGET)
    }

    // Memory-access log.

    /// Folds the CPU's last-step access sets into the log.
    fn absorb(&mut self, cpu: &Cpu) {
        self.reads.extend(cpu.touched.reads.iter().copied());
        self.writes.extend(cpu.touched.writes.iter().copied());
    }

    /// The accumulated (read, write) address sets.
    #[must_use]
    pub fn access_log(&self) -> (&IndexSet<Word>, &IndexSet<Word>) {
        (&self.reads, &self.writes)
    }

    /// Clears the access log for the next accumulation window.
    pub fn access_log_reset(&mut self) {
        self.reads.clear();
        self.writes.clear();
    }
}

/// Whether an opcode transfers control like a call.
fn is_call(code: Byte) -> bool {
    // CALL, Ccc, RST
    code == 0xcd || code & 0b1100_0111 == 0b1100_0100 || code & 0b1100_0111 == 0b1100_0111
}

/// Result of a ROM hot-patch.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Patch {
    /// Number of contiguous differing spans written.
    pub spans: usize,
    /// Total bytes written.
    pub bytes: usize,
}

/// Applies the differences between two ROM images to memory.
///
/// Contiguous differing spans of `new` (including any tail past `old`'s
/// length) are written at their ROM load offsets. CPU registers and the
/// breakpoint table are untouched.
pub fn hot_patch(cpu: &mut Cpu, old: &[Byte], new: &[Byte]) -> Patch {
    let differs = |at: &usize| old.get(*at) != new.get(*at);
    let mut patch = Patch::default();
    for (diff, span) in &(0..new.len()).chunk_by(differs) {
        if !diff {
            continue;
        }
        let span: Vec<usize> = span.collect();
        let start = span[0];
        cpu.mem.patch_rom(start, &new[start..start + span.len()]);
        patch.spans += 1;
        patch.bytes += span.len();
    }
    info!(
        "hot patch applied: {} span(s), {} byte(s)",
        patch.spans, patch.bytes
    );
    patch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::{Memory, Space};

    fn setup(program: &[Byte]) -> Cpu {
        let mut mem = Memory::new();
        mem.load_rom(program, 0x0100);
        let mut cpu = Cpu::new(mem);
        cpu.reg.pc = 0x0100;
        cpu.reg.sp = 0x2000;
        cpu
    }

    #[test]
    fn breakpoint_stops_before_execution() {
        // NOP / NOP / INR B / HLT
        let mut cpu = setup(&[0x00, 0x00, 0x04, 0x76]);
        let mut dbg = Debugger::new();
        dbg.breakpoint_add(
            0x0102,
            Breakpoint {
                enabled: true,
                ..Breakpoint::default()
            },
        );

        let (stop, _) = dbg.run(&mut cpu, u64::MAX);
        assert_eq!(stop, Stop::Breakpoint(0x0102));
        // INR B has not run yet
        assert_eq!(cpu.reg.b, 0x00);
        // Resuming executes it
        let (stop, _) = dbg.run(&mut cpu, u64::MAX);
        assert_eq!(stop, Stop::Halted);
        assert_eq!(cpu.reg.b, 0x01);
    }

    #[test]
    fn breakpoint_at_entry_fires_before_first_instruction() {
        let mut cpu = setup(&[0x04, 0x76]); // INR B / HLT
        let mut dbg = Debugger::new();
        dbg.breakpoint_add(
            0x0100,
            Breakpoint {
                enabled: true,
                ..Breakpoint::default()
            },
        );

        let (stop, spent) = dbg.run(&mut cpu, u64::MAX);
        assert_eq!(stop, Stop::Breakpoint(0x0100));
        assert_eq!(spent, 0);
        assert_eq!(cpu.reg.b, 0);
        // Resuming gets past the reported stop without re-triggering
        let (stop, _) = dbg.run(&mut cpu, u64::MAX);
        assert_eq!(stop, Stop::Halted);
        assert_eq!(cpu.reg.b, 1);
    }

    #[test]
    fn stepping_onto_a_breakpoint_still_reports_it() {
        let mut cpu = setup(&[0x00, 0x04, 0x76]); // NOP / INR B / HLT
        let mut dbg = Debugger::new();
        dbg.breakpoint_add(
            0x0101,
            Breakpoint {
                enabled: true,
                ..Breakpoint::default()
            },
        );

        // Land on the breakpoint address by stepping, not by resuming
        dbg.step_into(&mut cpu);
        assert_eq!(cpu.reg.pc, 0x0101);
        // The next run stops before executing the instruction there
        let (stop, spent) = dbg.run(&mut cpu, u64::MAX);
        assert_eq!(stop, Stop::Breakpoint(0x0101));
        assert_eq!(spent, 0);
        assert_eq!(cpu.reg.b, 0);
    }

    #[test]
    fn disabled_breakpoints_are_ignored() {
        let mut cpu = setup(&[0x00, 0x00, 0x76]);
        let mut dbg = Debugger::new();
        dbg.breakpoint_add(0x0101, Breakpoint::default());

        let (stop, _) = dbg.run(&mut cpu, u64::MAX);
        assert_eq!(stop, Stop::Halted);
    }

    #[test]
    fn autodel_breakpoint_fires_once() {
        // Loop forever: JMP 0x0100
        let mut cpu = setup(&[0xc3, 0x00, 0x01]);
        let mut dbg = Debugger::new();
        dbg.breakpoint_add(
            0x0100,
            Breakpoint {
                enabled: true,
                autodel: true,
                ..Breakpoint::default()
            },
        );

        let (stop, _) = dbg.run(&mut cpu, u64::MAX);
        assert_eq!(stop, Stop::Breakpoint(0x0100));
        assert_eq!(dbg.breakpoints().count(), 0);
        // Second run exhausts the budget instead
        let (stop, _) = dbg.run(&mut cpu, 400);
        assert_eq!(stop, Stop::Budget);
    }

    #[test]
    fn run_honours_budget_and_counts_cycles() {
        let mut cpu = setup(&[0xc3, 0x00, 0x01]); // JMP self: 10 cycles * 4
        let mut dbg = Debugger::new();
        let (stop, spent) = dbg.run(&mut cpu, 200);
        assert_eq!(stop, Stop::Budget);
        assert_eq!(spent, cpu.cycles);
        assert_eq!(spent % 40, 0);
    }

    #[test]
    fn no_breaks_run_ignores_breakpoints() {
        let mut cpu = setup(&[0x00, 0x00, 0x76]);
        let mut dbg = Debugger::new();
        dbg.breakpoint_add(
            0x0101,
            Breakpoint {
                enabled: true,
                ..Breakpoint::default()
            },
        );
        let (stop, _) = dbg.run_no_breaks(&mut cpu, u64::MAX);
        assert_eq!(stop, Stop::Halted);
    }

    #[test]
    fn step_over_call_lands_after_it() {
        // 0x0100: CALL 0x0110 / HLT ; 0x0110: RET
        let mut program = vec![0xcd, 0x10, 0x01, 0x76];
        program.resize(0x10, 0x00);
        program.push(0xc9);
        let mut cpu = setup(&program);
        let mut dbg = Debugger::new();

        let (stop, _) = dbg.step_over(&mut cpu);
        assert_eq!(stop, Stop::Breakpoint(0x0103));
        assert_eq!(dbg.breakpoints().count(), 0);

        // Plain instructions degrade to a single step; no breakpoint fires
        let mut cpu = setup(&[0x04, 0x76]); // INR B
        let (stop, cycles) = dbg.step_over(&mut cpu);
        assert_eq!(stop, Stop::Stepped);
        assert_eq!(cpu.reg.b, 1);
        assert_eq!(cycles, 5 * 4);
    }

    #[test]
    fn step_out_runs_to_return_address() {
        // 0x0100: CALL 0x0110 / HLT ; 0x0110: INR B / RET
        let mut program = vec![0xcd, 0x10, 0x01, 0x76];
        program.resize(0x10, 0x00);
        program.extend([0x04, 0xc9]);
        let mut cpu = setup(&program);
        let mut dbg = Debugger::new();

        dbg.step_into(&mut cpu); // into the subroutine
        let (stop, _) = dbg.step_out(&mut cpu);
        assert_eq!(stop, Stop::Breakpoint(0x0103));
        assert_eq!(cpu.reg.b, 1);
    }

    #[test]
    fn access_log_accumulates_across_window() {
        // STA 0x3000 / LDA 0x3001 / HLT
        let mut cpu = setup(&[0x32, 0x00, 0x30, 0x3a, 0x01, 0x30, 0x76]);
        let mut dbg = Debugger::new();
        let (stop, _) = dbg.run(&mut cpu, u64::MAX);
        assert_eq!(stop, Stop::Halted);

        let (reads, writes) = dbg.access_log();
        assert!(reads.contains(&0x3001));
        assert!(writes.contains(&0x3000));

        dbg.access_log_reset();
        let (reads, writes) = dbg.access_log();
        assert!(reads.is_empty() && writes.is_empty());
    }

    #[test]
    fn hot_patch_writes_only_differing_spans() {
        let mut cpu = setup(&[0x00; 0x80]);
        let old = cpu.mem.rom().to_vec();
        let mut new = old.clone();
        new[0x42] = 0xaa;

        let before = crate::cpu::State::from(&cpu);
        let patch = hot_patch(&mut cpu, &old, &new);
        assert_eq!(patch, Patch { spans: 1, bytes: 1 });
        assert_eq!(cpu.mem.read(0x0142, Space::Data), 0xaa);
        assert_eq!(crate::cpu::State::from(&cpu), before);
    }

    #[test]
    fn hot_patch_handles_multiple_spans_and_growth() {
        let mut cpu = setup(&[0x11, 0x22, 0x33, 0x44]);
        let old = cpu.mem.rom().to_vec();
        let new = vec![0x11, 0xff, 0x33, 0xee, 0x55, 0x66];

        let patch = hot_patch(&mut cpu, &old, &new);
        assert_eq!(patch, Patch { spans: 2, bytes: 4 });
        assert_eq!(cpu.mem.read(0x0101, Space::Data), 0xff);
        assert_eq!(cpu.mem.read(0x0104, Space::Data), 0x55);
        assert_eq!(cpu.mem.read(0x0105, Space::Data), 0x66);
    }
}
