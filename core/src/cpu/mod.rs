//! 8080 processor core.
//!
//! Single-threaded, step-per-call: every [`step`](Cpu::step) fetches one
//! opcode, executes it whole, and returns the consumed cycle count (the
//! per-opcode machine-cycle figure times four). The CPU exclusively owns
//! its [`Memory`]; peripherals reach it only through the injected I/O port
//! hooks.

use std::fmt::{self, Debug, Display};

use log::{trace, warn};

use self::insn::Insn;
use crate::mem::{Memory, Space};
use crate::{Byte, Word};

pub mod insn;

/// Clock ticks per machine cycle.
pub const CYCLE_SCALE: u32 = 4;

/// Machine cycles consumed by an interrupt acknowledge.
const INT_CYCLES: u32 = 11;

/// Processor flags, as laid out in the PSW.
///
/// The PSW packs `S Z 0 AC 0 P 1 CY`: bit 1 is wired high and bits 3/5 are
/// wired low.
#[derive(Clone, Copy, Debug)]
pub enum Flag {
    /// Sign flag.
    S = 0b1000_0000,
    /// Zero flag.
    Z = 0b0100_0000,
    /// Auxiliary-carry flag.
    AC = 0b0001_0000,
    /// Parity flag.
    P = 0b0000_0100,
    /// Carry flag.
    CY = 0b0000_0001,
}

impl Flag {
    /// Gets the value of the corresponding bit of the flag byte.
    #[must_use]
    pub fn get(self, flags: &Byte) -> bool {
        flags & self as Byte != 0
    }

    /// Sets the corresponding bit of the flag byte.
    pub fn set(self, flags: &mut Byte, enable: bool) {
        if enable {
            *flags |= self as Byte;
        } else {
            *flags &= !(self as Byte);
        }
    }
}

/// Fixed bits of the flag byte: bit 1 high, bits 3/5 low.
const PSW_FIXED: Byte = 0b0000_0010;

/// Mask of the defined flag bits.
const PSW_FLAGS: Byte = 0b1101_0101;

/// Interrupt-enable latch.
///
/// `EI` requests enablement, which takes effect only after the instruction
/// following it has executed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
enum Ime {
    /// Prevent interrupts.
    #[default]
    Disabled,
    /// Allow interrupts.
    Enabled,
    /// Pending allow.
    WillEnable,
}

/// Processor registers.
///
/// | Size | Name | Description        |
/// |------|------|--------------------|
/// | Byte | A    | Accumulator.       |
/// | Byte | F    | Flags (PSW low).   |
/// | Byte | B, C | General pair BC.   |
/// | Byte | D, E | General pair DE.   |
/// | Byte | H, L | Address pair HL.   |
/// | Word | SP   | Stack pointer.     |
/// | Word | PC   | Program counter.   |
#[derive(Clone, Debug)]
pub struct Control {
    /// Accumulator register.
    pub a: Byte,
    /// Flags register.
    pub f: Byte,
    /// General register B.
    pub b: Byte,
    /// General register C.
    pub c: Byte,
    /// General register D.
    pub d: Byte,
    /// General register E.
    pub e: Byte,
    /// Address (HI) byte.
    pub h: Byte,
    /// Address (LO) byte.
    pub l: Byte,
    /// Stack pointer.
    pub sp: Word,
    /// Program counter.
    pub pc: Word,
}

impl Default for Control {
    fn default() -> Self {
        Self {
            a: 0,
            f: PSW_FIXED,
            b: 0,
            c: 0,
            d: 0,
            e: 0,
            h: 0,
            l: 0,
            sp: 0,
            pc: 0,
        }
    }
}

impl Control {
    /// Joint BC register.
    #[must_use]
    pub fn bc(&self) -> Word {
        Word::from_le_bytes([self.c, self.b])
    }

    /// Stores the joint BC register.
    pub fn set_bc(&mut self, value: Word) {
        [self.c, self.b] = value.to_le_bytes();
    }

    /// Joint DE register.
    #[must_use]
    pub fn de(&self) -> Word {
        Word::from_le_bytes([self.e, self.d])
    }

    /// Stores the joint DE register.
    pub fn set_de(&mut self, value: Word) {
        [self.e, self.d] = value.to_le_bytes();
    }

    /// Address register HL.
    #[must_use]
    pub fn hl(&self) -> Word {
        Word::from_le_bytes([self.l, self.h])
    }

    /// Stores the address register HL.
    pub fn set_hl(&mut self, value: Word) {
        [self.l, self.h] = value.to_le_bytes();
    }

    /// Program status word: A in the high byte, flags in the low.
    #[must_use]
    pub fn psw(&self) -> Word {
        Word::from_le_bytes([self.f, self.a])
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

impl Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "┌───┬────┬───┬────┐")?;
        writeln!(f, "│ A │ {:02x} │ F │ {:02x} │", self.a, self.f)?;
        writeln!(f, "├───┼────┼───┼────┤")?;
        writeln!(f, "│ B │ {:02x} │ C │ {:02x} │", self.b, self.c)?;
        writeln!(f, "├───┼────┼───┼────┤")?;
        writeln!(f, "│ D │ {:02x} │ E │ {:02x} │", self.d, self.e)?;
        writeln!(f, "├───┼────┼───┼────┤")?;
        writeln!(f, "│ H │ {:02x} │ L │ {:02x} │", self.h, self.l)?;
        writeln!(f, "├───┴────┼───┴────┤")?;
        writeln!(f, "│   SP   │  {:04x}  │", self.sp)?;
        writeln!(f, "├────────┼────────┤")?;
        writeln!(f, "│   PC   │  {:04x}  │", self.pc)?;
        write!(f, "└────────┴────────┘")
    }
}

/// Effective addresses touched by the last instruction.
///
/// Instruction and immediate fetches are excluded; only operand reads and
/// writes (including stack traffic) are recorded.
#[derive(Clone, Debug, Default)]
pub struct Touched {
    /// Addresses read.
    pub reads: Vec<Word>,
    /// Addresses written.
    pub writes: Vec<Word>,
}

impl Touched {
    fn clear(&mut self) {
        self.reads.clear();
        self.writes.clear();
    }
}

/// Injected I/O port hooks.
///
/// The sole bridge between the processor and its peripherals.
#[derive(Default)]
pub struct Ports {
    /// `IN port` callback.
    pub input: Option<Box<dyn FnMut(Byte) -> Byte>>,
    /// `OUT port, A` callback.
    pub output: Option<Box<dyn FnMut(Byte, Byte)>>,
}

impl Debug for Ports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ports")
            .field("input", &self.input.as_ref().map(|_| ".."))
            .field("output", &self.output.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Central processing unit.
#[derive(Debug, Default)]
pub struct Cpu {
    /// Processor registers.
    pub reg: Control,
    /// Processor memory.
    pub mem: Memory,
    /// Cycle counter.
    pub cycles: u64,
    /// Halted status (`HLT` executed, no interrupt yet).
    pub halted: bool,
    /// I/O port hooks.
    pub io: Ports,
    /// Addresses touched by the last step.
    pub touched: Touched,
    ime: Ime,
    pending: Option<Byte>,
}

impl Cpu {
    /// Constructs a new `Cpu` owning the given memory.
    #[must_use]
    pub fn new(mem: Memory) -> Self {
        Self {
            mem,
            ..Self::default()
        }
    }

    /// Checks whether the interrupt-enable latch is set.
    #[must_use]
    pub fn int_enabled(&self) -> bool {
        self.ime == Ime::Enabled
    }

    /// Resets processor state; memory mappings and contents are kept.
    pub fn reset(&mut self) {
        self.reg.reset();
        self.cycles = 0;
        self.halted = false;
        self.ime = Ime::Disabled;
        self.pending = None;
        self.touched.clear();
    }

    /// Executes one instruction and returns the consumed cycles.
    ///
    /// While halted, steps consume idle cycles without advancing PC until
    /// an interrupt fires.
    pub fn step(&mut self) -> u32 {
        self.touched.clear();

        // Take a latched interrupt once the latch allows it
        if self.ime == Ime::Enabled {
            if let Some(vector) = self.pending.take() {
                return self.service(vector);
            }
        }

        if self.halted {
            let cycles = u32::from(Insn::decode(0x00).cycles) * CYCLE_SCALE;
            self.cycles += u64::from(cycles);
            return cycles;
        }

        let pc = self.reg.pc;
        let code = self.fetch();
        trace!("${pc:04x}: {}", Insn::decode(code).repr);
        self.exec(code);

        // EI takes effect after the instruction following it
        if self.ime == Ime::WillEnable && code != 0xfb {
            self.ime = Ime::Enabled;
        }

        let cycles = u32::from(Insn::decode(code).cycles) * CYCLE_SCALE;
        self.cycles += u64::from(cycles);
        cycles
    }

    /// Raises an interrupt with the given vector.
    ///
    /// With the latch set the interrupt is acknowledged immediately: the
    /// latch clears, PC is pushed, and execution continues at `vector * 8`.
    /// Otherwise the vector stays latched until interrupts are enabled.
    /// Returns whether the interrupt was acknowledged.
    pub fn interrupt(&mut self, vector: Byte) -> bool {
        if self.ime == Ime::Enabled {
            self.service(vector);
            true
        } else {
            self.pending = Some(vector);
            false
        }
    }

    fn service(&mut self, vector: Byte) -> u32 {
        trace!("interrupt: vector {vector}");
        self.ime = Ime::Disabled;
        self.halted = false;
        self.push_word(self.reg.pc);
        self.reg.pc = Word::from(vector) * 8;
        let cycles = INT_CYCLES * CYCLE_SCALE;
        self.cycles += u64::from(cycles);
        cycles
    }

    // Memory helpers.
    //
    // Instruction/immediate fetches bypass the access log; operand loads
    // and stores (and stack traffic) are recorded.

    fn fetch(&mut self) -> Byte {
        let byte = self.mem.read(self.reg.pc, Space::Data);
        self.reg.pc = self.reg.pc.wrapping_add(1);
        byte
    }

    fn fetch_word(&mut self) -> Word {
        let lo = self.fetch();
        let hi = self.fetch();
        Word::from_le_bytes([lo, hi])
    }

    fn load(&mut self, addr: Word) -> Byte {
        self.touched.reads.push(addr);
        self.mem.read(addr, Space::Data)
    }

    fn store(&mut self, addr: Word, data: Byte) {
        self.touched.writes.push(addr);
        self.mem.write(addr, Space::Data, data);
    }

    fn load_stack(&mut self, addr: Word) -> Byte {
        self.touched.reads.push(addr);
        self.mem.read(addr, Space::Stack)
    }

    fn store_stack(&mut self, addr: Word, data: Byte) {
        self.touched.writes.push(addr);
        self.mem.write(addr, Space::Stack, data);
    }

    fn push(&mut self, data: Byte) {
        self.reg.sp = self.reg.sp.wrapping_sub(1);
        self.store_stack(self.reg.sp, data);
    }

    fn pop(&mut self) -> Byte {
        let byte = self.load_stack(self.reg.sp);
        self.reg.sp = self.reg.sp.wrapping_add(1);
        byte
    }

    fn push_word(&mut self, value: Word) {
        let [lo, hi] = value.to_le_bytes();
        self.push(hi);
        self.push(lo);
    }

    fn pop_word(&mut self) -> Word {
        let lo = self.pop();
        let hi = self.pop();
        Word::from_le_bytes([lo, hi])
    }

    // Operand helpers.

    /// Reads operand `r` (0..=7); index 6 is the M pseudo-register `[HL]`.
    fn get(&mut self, idx: Byte) -> Byte {
        match idx {
            0 => self.reg.b,
            1 => self.reg.c,
            2 => self.reg.d,
            3 => self.reg.e,
            4 => self.reg.h,
            5 => self.reg.l,
            6 => {
                let hl = self.reg.hl();
                self.load(hl)
            }
            _ => self.reg.a,
        }
    }

    /// Writes operand `r` (0..=7); index 6 is the M pseudo-register `[HL]`.
    fn put(&mut self, idx: Byte, data: Byte) {
        match idx {
            0 => self.reg.b = data,
            1 => self.reg.c = data,
            2 => self.reg.d = data,
            3 => self.reg.e = data,
            4 => self.reg.h = data,
            5 => self.reg.l = data,
            6 => {
                let hl = self.reg.hl();
                self.store(hl, data);
            }
            _ => self.reg.a = data,
        }
    }

    /// Reads register pair `rp` (0..=3: BC, DE, HL, SP).
    fn pair(&self, idx: Byte) -> Word {
        match idx {
            0 => self.reg.bc(),
            1 => self.reg.de(),
            2 => self.reg.hl(),
            _ => self.reg.sp,
        }
    }

    /// Writes register pair `rp` (0..=3: BC, DE, HL, SP).
    fn set_pair(&mut self, idx: Byte, value: Word) {
        match idx {
            0 => self.reg.set_bc(value),
            1 => self.reg.set_de(value),
            2 => self.reg.set_hl(value),
            _ => self.reg.sp = value,
        }
    }

    fn flag(&self, flag: Flag) -> bool {
        flag.get(&self.reg.f)
    }

    /// Evaluates condition code `cc` (0..=7: NZ, Z, NC, C, PO, PE, P, M).
    fn cond(&self, cc: Byte) -> bool {
        match cc {
            0 => !self.flag(Flag::Z),
            1 => self.flag(Flag::Z),
            2 => !self.flag(Flag::CY),
            3 => self.flag(Flag::CY),
            4 => !self.flag(Flag::P),
            5 => self.flag(Flag::P),
            6 => !self.flag(Flag::S),
            _ => self.flag(Flag::S),
        }
    }

    // Flag computation.

    fn set_szp(&mut self, result: Byte) {
        Flag::S.set(&mut self.reg.f, result & 0x80 != 0);
        Flag::Z.set(&mut self.reg.f, result == 0);
        Flag::P.set(&mut self.reg.f, PARITY[usize::from(result)]);
    }

    fn add(&mut self, value: Byte, carry: bool) {
        let a = self.reg.a;
        let sum = u16::from(a) + u16::from(value) + u16::from(carry);
        let result = sum as Byte;
        Flag::CY.set(&mut self.reg.f, sum > 0xff);
        Flag::AC.set(
            &mut self.reg.f,
            (a & 0x0f) + (value & 0x0f) + Byte::from(carry) > 0x0f,
        );
        self.set_szp(result);
        self.reg.a = result;
    }

    fn sub(&mut self, value: Byte, borrow: bool) -> Byte {
        let a = self.reg.a;
        let diff = i16::from(a) - i16::from(value) - i16::from(borrow);
        let result = diff as Byte;
        Flag::CY.set(&mut self.reg.f, diff < 0);
        Flag::AC.set(
            &mut self.reg.f,
            i16::from(a & 0x0f) - i16::from(value & 0x0f) - i16::from(borrow) < 0,
        );
        self.set_szp(result);
        result
    }

    fn alu(&mut self, op: Byte, value: Byte) {
        match op {
            0 => self.add(value, false),
            1 => {
                let carry = self.flag(Flag::CY);
                self.add(value, carry);
            }
            2 => self.reg.a = self.sub(value, false),
            3 => {
                let borrow = self.flag(Flag::CY);
                self.reg.a = self.sub(value, borrow);
            }
            4 => {
                let a = self.reg.a;
                let result = a & value;
                Flag::CY.set(&mut self.reg.f, false);
                Flag::AC.set(&mut self.reg.f, (a | value) & 0x08 != 0);
                self.set_szp(result);
                self.reg.a = result;
            }
            5 => {
                let result = self.reg.a ^ value;
                Flag::CY.set(&mut self.reg.f, false);
                Flag::AC.set(&mut self.reg.f, false);
                self.set_szp(result);
                self.reg.a = result;
            }
            6 => {
                let result = self.reg.a | value;
                Flag::CY.set(&mut self.reg.f, false);
                Flag::AC.set(&mut self.reg.f, false);
                self.set_szp(result);
                self.reg.a = result;
            }
            _ => {
                // CMP discards the difference
                self.sub(value, false);
            }
        }
    }

    fn inr(&mut self, idx: Byte) {
        let value = self.get(idx);
        let result = value.wrapping_add(1);
        Flag::AC.set(&mut self.reg.f, value & 0x0f == 0x0f);
        self.set_szp(result);
        self.put(idx, result);
    }

    fn dcr(&mut self, idx: Byte) {
        let value = self.get(idx);
        let result = value.wrapping_sub(1);
        Flag::AC.set(&mut self.reg.f, value & 0x0f == 0x00);
        self.set_szp(result);
        self.put(idx, result);
    }

    fn daa(&mut self) {
        let a = self.reg.a;
        let mut adjust = 0u8;
        let mut carry = self.flag(Flag::CY);
        if a & 0x0f > 0x09 || self.flag(Flag::AC) {
            adjust |= 0x06;
        }
        if a > 0x99 || carry {
            adjust |= 0x60;
            carry = true;
        }
        let result = a.wrapping_add(adjust);
        Flag::AC.set(&mut self.reg.f, (a & 0x0f) + (adjust & 0x0f) > 0x0f);
        self.set_szp(result);
        Flag::CY.set(&mut self.reg.f, carry);
        self.reg.a = result;
    }

    // Dispatch.

    fn exec(&mut self, code: Byte) {
        match code {
            // HLT sits in the middle of the MOV block
            0x76 => self.halted = true,
            0x40..=0x7f => {
                let value = self.get(code & 0x07);
                self.put(code >> 3 & 0x07, value);
            }
            0x80..=0xbf => {
                let value = self.get(code & 0x07);
                self.alu(code >> 3 & 0x07, value);
            }
            _ => self.misc(code),
        }
    }

    #[expect(clippy::too_many_lines)]
    fn misc(&mut self, code: Byte) {
        match code {
            0x00 => (),
            // LXI rp, d16
            0x01 | 0x11 | 0x21 | 0x31 => {
                let value = self.fetch_word();
                self.set_pair(code >> 4 & 0x03, value);
            }
            // STAX / LDAX
            0x02 | 0x12 => {
                let addr = self.pair(code >> 4 & 0x01);
                let a = self.reg.a;
                self.store(addr, a);
            }
            0x0a | 0x1a => {
                let addr = self.pair(code >> 4 & 0x01);
                self.reg.a = self.load(addr);
            }
            // INX / DCX rp
            0x03 | 0x13 | 0x23 | 0x33 => {
                let rp = code >> 4 & 0x03;
                self.set_pair(rp, self.pair(rp).wrapping_add(1));
            }
            0x0b | 0x1b | 0x2b | 0x3b => {
                let rp = code >> 4 & 0x03;
                self.set_pair(rp, self.pair(rp).wrapping_sub(1));
            }
            // DAD rp
            0x09 | 0x19 | 0x29 | 0x39 => {
                let (result, carry) = self.reg.hl().overflowing_add(self.pair(code >> 4 & 0x03));
                self.reg.set_hl(result);
                Flag::CY.set(&mut self.reg.f, carry);
            }
            // INR / DCR r
            0x04 | 0x0c | 0x14 | 0x1c | 0x24 | 0x2c | 0x34 | 0x3c => self.inr(code >> 3 & 0x07),
            0x05 | 0x0d | 0x15 | 0x1d | 0x25 | 0x2d | 0x35 | 0x3d => self.dcr(code >> 3 & 0x07),
            // MVI r, d8
            0x06 | 0x0e | 0x16 | 0x1e | 0x26 | 0x2e | 0x36 | 0x3e => {
                let value = self.fetch();
                self.put(code >> 3 & 0x07, value);
            }
            // Rotates only touch CY
            0x07 => {
                let a = self.reg.a;
                self.reg.a = a.rotate_left(1);
                Flag::CY.set(&mut self.reg.f, a & 0x80 != 0);
            }
            0x0f => {
                let a = self.reg.a;
                self.reg.a = a.rotate_right(1);
                Flag::CY.set(&mut self.reg.f, a & 0x01 != 0);
            }
            0x17 => {
                let a = self.reg.a;
                let carry = Byte::from(self.flag(Flag::CY));
                self.reg.a = a << 1 | carry;
                Flag::CY.set(&mut self.reg.f, a & 0x80 != 0);
            }
            0x1f => {
                let a = self.reg.a;
                let carry = Byte::from(self.flag(Flag::CY));
                self.reg.a = a >> 1 | carry << 7;
                Flag::CY.set(&mut self.reg.f, a & 0x01 != 0);
            }
            // Direct loads and stores
            0x22 => {
                let addr = self.fetch_word();
                let (l, h) = (self.reg.l, self.reg.h);
                self.store(addr, l);
                self.store(addr.wrapping_add(1), h);
            }
            0x2a => {
                let addr = self.fetch_word();
                self.reg.l = self.load(addr);
                self.reg.h = self.load(addr.wrapping_add(1));
            }
            0x32 => {
                let addr = self.fetch_word();
                let a = self.reg.a;
                self.store(addr, a);
            }
            0x3a => {
                let addr = self.fetch_word();
                self.reg.a = self.load(addr);
            }
            0x27 => self.daa(),
            0x2f => self.reg.a = !self.reg.a,
            0x37 => Flag::CY.set(&mut self.reg.f, true),
            0x3f => {
                let carry = self.flag(Flag::CY);
                Flag::CY.set(&mut self.reg.f, !carry);
            }
            // Jumps
            0xc3 => self.reg.pc = self.fetch_word(),
            0xc2 | 0xca | 0xd2 | 0xda | 0xe2 | 0xea | 0xf2 | 0xfa => {
                let addr = self.fetch_word();
                if self.cond(code >> 3 & 0x07) {
                    self.reg.pc = addr;
                }
            }
            // Calls push the address of the next instruction
            0xcd => {
                let addr = self.fetch_word();
                self.push_word(self.reg.pc);
                self.reg.pc = addr;
            }
            0xc4 | 0xcc | 0xd4 | 0xdc | 0xe4 | 0xec | 0xf4 | 0xfc => {
                let addr = self.fetch_word();
                if self.cond(code >> 3 & 0x07) {
                    self.push_word(self.reg.pc);
                    self.reg.pc = addr;
                }
            }
            // Returns
            0xc9 => self.reg.pc = self.pop_word(),
            0xc0 | 0xc8 | 0xd0 | 0xd8 | 0xe0 | 0xe8 | 0xf0 | 0xf8 => {
                if self.cond(code >> 3 & 0x07) {
                    self.reg.pc = self.pop_word();
                }
            }
            // RST n
            0xc7 | 0xcf | 0xd7 | 0xdf | 0xe7 | 0xef | 0xf7 | 0xff => {
                self.push_word(self.reg.pc);
                self.reg.pc = Word::from(code >> 3 & 0x07) * 8;
            }
            // PUSH / POP
            0xc5 | 0xd5 | 0xe5 => {
                let value = self.pair(code >> 4 & 0x03);
                self.push_word(value);
            }
            0xf5 => {
                let psw = self.reg.psw();
                self.push_word(psw);
            }
            0xc1 | 0xd1 | 0xe1 => {
                let value = self.pop_word();
                self.set_pair(code >> 4 & 0x03, value);
            }
            0xf1 => {
                let value = self.pop_word();
                let [f, a] = value.to_le_bytes();
                self.reg.a = a;
                self.reg.f = f & PSW_FLAGS | PSW_FIXED;
            }
            // I/O goes through the injected hooks
            0xdb => {
                let port = self.fetch();
                self.reg.a = self.io.input.as_mut().map_or(0xff, |hook| hook(port));
            }
            0xd3 => {
                let port = self.fetch();
                let a = self.reg.a;
                if let Some(hook) = self.io.output.as_mut() {
                    hook(port, a);
                }
            }
            0xe3 => {
                let sp = self.reg.sp;
                let lo = self.load_stack(sp);
                let hi = self.load_stack(sp.wrapping_add(1));
                let (l, h) = (self.reg.l, self.reg.h);
                self.store_stack(sp, l);
                self.store_stack(sp.wrapping_add(1), h);
                self.reg.l = lo;
                self.reg.h = hi;
            }
            0xe9 => self.reg.pc = self.reg.hl(),
            0xeb => {
                let (hl, de) = (self.reg.hl(), self.reg.de());
                self.reg.set_hl(de);
                self.reg.set_de(hl);
            }
            0xf9 => self.reg.sp = self.reg.hl(),
            0xf3 => self.ime = Ime::Disabled,
            0xfb => {
                if self.ime != Ime::Enabled {
                    self.ime = Ime::WillEnable;
                }
            }
            other => {
                // Permissive dispatch: unknown opcodes execute as NOP
                warn!("unknown opcode {other:#04x}; executing as NOP");
            }
        }
    }
}

/// CPU state snapshot for external callers.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct State {
    /// Accumulator register.
    pub a: Byte,
    /// Flags register.
    pub f: Byte,
    /// General register B.
    pub b: Byte,
    /// General register C.
    pub c: Byte,
    /// General register D.
    pub d: Byte,
    /// General register E.
    pub e: Byte,
    /// Address (HI) byte.
    pub h: Byte,
    /// Address (LO) byte.
    pub l: Byte,
    /// Stack pointer.
    pub sp: Word,
    /// Program counter.
    pub pc: Word,
    /// Cycle counter.
    pub cycles: u64,
    /// Halted status.
    pub halted: bool,
    /// Interrupt-enable latch.
    pub int_enabled: bool,
}

impl From<&Cpu> for State {
    fn from(cpu: &Cpu) -> Self {
        Self {
            a: cpu.reg.a,
            f: cpu.reg.f,
            b: cpu.reg.b,
            c: cpu.reg.c,
            d: cpu.reg.d,
            e: cpu.reg.e,
            h: cpu.reg.h,
            l: cpu.reg.l,
            sp: cpu.reg.sp,
            pc: cpu.reg.pc,
            cycles: cpu.cycles,
            halted: cpu.halted,
            int_enabled: cpu.int_enabled(),
        }
    }
}

/// Even-parity lookup table.
static PARITY: [bool; 0x100] = {
    let mut table = [false; 0x100];
    let mut idx = 0;
    while idx < 0x100 {
        table[idx] = (idx as u8).count_ones() % 2 == 0;
        idx += 1;
    }
    table
};
