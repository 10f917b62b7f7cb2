//! 8080 instruction encoding.
//!
//! One entry point per pass: [`size`] answers how many bytes a mnemonic
//! occupies (fixed per mnemonic on the 8080), and [`encode`] produces the
//! bytes once operand expressions can be evaluated.

use crate::err::{Error, Result};

/// Condition codes in encoding order.
const CONDITIONS: [&str; 8] = ["NZ", "Z", "NC", "C", "PO", "PE", "P", "M"];

/// Mnemonics occupying one byte.
const BYTES_1: [&str; 30] = [
    "NOP", "MOV", "LDAX", "STAX", "INR", "DCR", "INX", "DCX", "DAD", "ADD", "ADC", "SUB", "SBB",
    "ANA", "XRA", "ORA", "CMP", "RET", "RST", "PUSH", "POP", "RLC", "RRC", "RAL", "RAR", "DAA",
    "STC", "CMC", "CMA", "HLT",
];

/// Mnemonics occupying one byte (no condition-code family).
const BYTES_1_MISC: [&str; 6] = ["XCHG", "XTHL", "SPHL", "PCHL", "EI", "DI"];

/// Mnemonics occupying two bytes (opcode + d8).
const BYTES_2: [&str; 11] = [
    "MVI", "ADI", "ACI", "SUI", "SBI", "ANI", "XRI", "ORI", "CPI", "IN", "OUT",
];

/// Mnemonics occupying three bytes (opcode + a16).
const BYTES_3: [&str; 7] = ["LXI", "LDA", "STA", "LHLD", "SHLD", "JMP", "CALL"];

/// Returns the encoded size of a mnemonic in bytes.
///
/// Conditional jump/call/return mnemonics (`JNZ`, `CC`, `RM`, …) are part of
/// their family. `None` means the mnemonic is not an 8080 instruction.
#[must_use]
pub fn size(mnemonic: &str) -> Option<u16> {
    if BYTES_1.contains(&mnemonic) || BYTES_1_MISC.contains(&mnemonic) {
        return Some(1);
    }
    if BYTES_2.contains(&mnemonic) {
        return Some(2);
    }
    if BYTES_3.contains(&mnemonic) {
        return Some(3);
    }
    if let Some(cc) = mnemonic.strip_prefix('J') {
        if CONDITIONS.contains(&cc) {
            return Some(3);
        }
    }
    if let Some(cc) = mnemonic.strip_prefix('C') {
        if CONDITIONS.contains(&cc) {
            return Some(3);
        }
    }
    if let Some(cc) = mnemonic.strip_prefix('R') {
        if CONDITIONS.contains(&cc) {
            return Some(1);
        }
    }
    None
}

/// Operand evaluation callback.
///
/// Evaluates an expression, masking to the given bit width; truncation
/// warnings are the callback's business.
pub trait Eval {
    /// Evaluates `expr` in a `bits`-wide context.
    ///
    /// # Errors
    ///
    /// Errors when the expression does not resolve.
    fn eval(&mut self, expr: &str, bits: u8) -> Result<u16>;
}

impl<F: FnMut(&str, u8) -> Result<u16>> Eval for F {
    fn eval(&mut self, expr: &str, bits: u8) -> Result<u16> {
        self(expr, bits)
    }
}

/// Encodes one instruction into its byte sequence.
///
/// # Errors
///
/// Errors with [`Error::UnknownOpcode`] for foreign mnemonics,
/// [`Error::BadOperand`] for operand shape mismatches,
/// [`Error::InvalidMovMm`] for `MOV M,M`, and whatever the evaluator raises
/// for unresolvable expressions.
pub fn encode(mnemonic: &str, operands: &[String], eval: &mut impl Eval) -> Result<Vec<u8>> {
    match mnemonic {
        "NOP" => fixed(0x00, operands),
        "HLT" => fixed(0x76, operands),
        "RLC" => fixed(0x07, operands),
        "RRC" => fixed(0x0f, operands),
        "RAL" => fixed(0x17, operands),
        "RAR" => fixed(0x1f, operands),
        "DAA" => fixed(0x27, operands),
        "CMA" => fixed(0x2f, operands),
        "STC" => fixed(0x37, operands),
        "CMC" => fixed(0x3f, operands),
        "XCHG" => fixed(0xeb, operands),
        "XTHL" => fixed(0xe3, operands),
        "SPHL" => fixed(0xf9, operands),
        "PCHL" => fixed(0xe9, operands),
        "EI" => fixed(0xfb, operands),
        "DI" => fixed(0xf3, operands),
        "RET" => fixed(0xc9, operands),
        "MOV" => {
            let [dst, src] = two(mnemonic, operands)?;
            let (d, s) = (reg(dst)?, reg(src)?);
            if d == 6 && s == 6 {
                return Err(Error::InvalidMovMm);
            }
            Ok(vec![0x40 | d << 3 | s])
        }
        "MVI" => {
            let [dst, imm] = two(mnemonic, operands)?;
            let r = reg(dst)?;
            let d8 = eval.eval(imm, 8)?;
            Ok(vec![0x06 | r << 3, d8 as u8])
        }
        "LXI" => {
            let [pair, imm] = two(mnemonic, operands)?;
            let rp = pair_sp(pair)?;
            let d16 = eval.eval(imm, 16)?;
            Ok(vec![0x01 | rp << 4, d16 as u8, (d16 >> 8) as u8])
        }
        "LDA" => absolute(0x3a, mnemonic, operands, eval),
        "STA" => absolute(0x32, mnemonic, operands, eval),
        "LHLD" => absolute(0x2a, mnemonic, operands, eval),
        "SHLD" => absolute(0x22, mnemonic, operands, eval),
        "LDAX" | "STAX" => {
            let [pair] = one(mnemonic, operands)?;
            let base = if mnemonic == "LDAX" { 0x0a } else { 0x02 };
            match pair.to_ascii_uppercase().as_str() {
                "B" => Ok(vec![base]),
                "D" => Ok(vec![base | 0x10]),
                other => Err(Error::BadOperand(format!("{mnemonic} {other}"))),
            }
        }
        "INR" | "DCR" => {
            let [dst] = one(mnemonic, operands)?;
            let base = if mnemonic == "INR" { 0x04 } else { 0x05 };
            Ok(vec![base | reg(dst)? << 3])
        }
        "INX" | "DCX" | "DAD" => {
            let [pair] = one(mnemonic, operands)?;
            let base = match mnemonic {
                "INX" => 0x03,
                "DCX" => 0x0b,
                _ => 0x09,
            };
            Ok(vec![base | pair_sp(pair)? << 4])
        }
        "ADD" | "ADC" | "SUB" | "SBB" | "ANA" | "XRA" | "ORA" | "CMP" => {
            let [src] = one(mnemonic, operands)?;
            let base = match mnemonic {
                "ADD" => 0x80,
                "ADC" => 0x88,
                "SUB" => 0x90,
                "SBB" => 0x98,
                "ANA" => 0xa0,
                "XRA" => 0xa8,
                "ORA" => 0xb0,
                _ => 0xb8,
            };
            Ok(vec![base | reg(src)?])
        }
        "ADI" | "ACI" | "SUI" | "SBI" | "ANI" | "XRI" | "ORI" | "CPI" => {
            let [imm] = one(mnemonic, operands)?;
            let base = match mnemonic {
                "ADI" => 0xc6,
                "ACI" => 0xce,
                "SUI" => 0xd6,
                "SBI" => 0xde,
                "ANI" => 0xe6,
                "XRI" => 0xee,
                "ORI" => 0xf6,
                _ => 0xfe,
            };
            let d8 = eval.eval(imm, 8)?;
            Ok(vec![base, d8 as u8])
        }
        "JMP" => absolute(0xc3, mnemonic, operands, eval),
        "CALL" => absolute(0xcd, mnemonic, operands, eval),
        "RST" => {
            let [num] = one(mnemonic, operands)?;
            let n = eval.eval(num, 8)?;
            if n > 7 {
                return Err(Error::BadOperand(format!("RST {n}")));
            }
            Ok(vec![0xc7 | (n as u8) << 3])
        }
        "PUSH" | "POP" => {
            let [pair] = one(mnemonic, operands)?;
            let base = if mnemonic == "PUSH" { 0xc5 } else { 0xc1 };
            Ok(vec![base | pair_psw(pair)? << 4])
        }
        "IN" | "OUT" => {
            let [port] = one(mnemonic, operands)?;
            let base = if mnemonic == "IN" { 0xdb } else { 0xd3 };
            let d8 = eval.eval(port, 8)?;
            Ok(vec![base, d8 as u8])
        }
        other => {
            // Conditional jump/call/return families
            if let Some(cc) = condition(other, 'J') {
                return absolute(0xc2 | cc << 3, mnemonic, operands, eval);
            }
            if let Some(cc) = condition(other, 'C') {
                return absolute(0xc4 | cc << 3, mnemonic, operands, eval);
            }
            if let Some(cc) = condition(other, 'R') {
                return fixed(0xc0 | cc << 3, operands);
            }
            Err(Error::UnknownOpcode(other.to_string()))
        }
    }
}

fn condition(mnemonic: &str, head: char) -> Option<u8> {
    let cc = mnemonic.strip_prefix(head)?;
    CONDITIONS
        .iter()
        .position(|&c| c == cc)
        .map(|p| p as u8)
}

fn fixed(code: u8, operands: &[String]) -> Result<Vec<u8>> {
    if operands.is_empty() {
        Ok(vec![code])
    } else {
        Err(Error::BadOperand(format!(
            "unexpected operands `{}`",
            operands.join(",")
        )))
    }
}

fn absolute(code: u8, mnemonic: &str, operands: &[String], eval: &mut impl Eval) -> Result<Vec<u8>> {
    let [addr] = one(mnemonic, operands)?;
    let a16 = eval.eval(addr, 16)?;
    Ok(vec![code, a16 as u8, (a16 >> 8) as u8])
}

fn one<'a>(mnemonic: &str, operands: &'a [String]) -> Result<[&'a str; 1]> {
    match operands {
        [a] => Ok([a.as_str()]),
        _ => Err(Error::BadOperand(format!(
            "{mnemonic} takes 1 operand, got {}",
            operands.len()
        ))),
    }
}

fn two<'a>(mnemonic: &str, operands: &'a [String]) -> Result<[&'a str; 2]> {
    match operands {
        [a, b] => Ok([a.as_str(), b.as_str()]),
        _ => Err(Error::BadOperand(format!(
            "{mnemonic} takes 2 operands, got {}",
            operands.len()
        ))),
    }
}

/// Register operand: B, C, D, E, H, L, M, A with codes 0..=7.
fn reg(tok: &str) -> Result<u8> {
    match tok.to_ascii_uppercase().as_str() {
        "B" => Ok(0),
        "C" => Ok(1),
        "D" => Ok(2),
        "E" => Ok(3),
        "H" => Ok(4),
        "L" => Ok(5),
        "M" => Ok(6),
        "A" => Ok(7),
        other => Err(Error::BadOperand(format!("register `{other}`"))),
    }
}

/// Register-pair operand: B, D, H, SP with codes 0..=3.
fn pair_sp(tok: &str) -> Result<u8> {
    match tok.to_ascii_uppercase().as_str() {
        "B" => Ok(0),
        "D" => Ok(1),
        "H" => Ok(2),
        "SP" => Ok(3),
        other => Err(Error::BadOperand(format!("register pair `{other}`"))),
    }
}

/// Register-pair operand for PUSH/POP: B, D, H, PSW.
fn pair_psw(tok: &str) -> Result<u8> {
    match tok.to_ascii_uppercase().as_str() {
        "B" => Ok(0),
        "D" => Ok(1),
        "H" => Ok(2),
        "PSW" => Ok(3),
        other => Err(Error::BadOperand(format!("register pair `{other}`"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lex;

    fn enc(mnemonic: &str, operands: &[&str]) -> Result<Vec<u8>> {
        let operands: Vec<String> = operands.iter().map(|&s| s.into()).collect();
        let mut eval = |expr: &str, _bits: u8| {
            lex::literal(expr)
                .map(|v| v as u16)
                .ok_or_else(|| Error::UndefinedSymbol(expr.into()))
        };
        encode(mnemonic, &operands, &mut eval)
    }

    #[test]
    fn canonical_patterns() {
        assert_eq!(enc("NOP", &[]).unwrap(), [0x00]);
        assert_eq!(enc("MOV", &["B", "C"]).unwrap(), [0x41]);
        assert_eq!(enc("MOV", &["M", "A"]).unwrap(), [0x77]);
        assert_eq!(enc("MVI", &["C", "0x12"]).unwrap(), [0x0e, 0x12]);
        assert_eq!(enc("LXI", &["SP", "0x1234"]).unwrap(), [0x31, 0x34, 0x12]);
        assert_eq!(enc("LDA", &["0x2010"]).unwrap(), [0x3a, 0x10, 0x20]);
        assert_eq!(enc("STA", &["0x2010"]).unwrap(), [0x32, 0x10, 0x20]);
        assert_eq!(enc("LHLD", &["0x2010"]).unwrap(), [0x2a, 0x10, 0x20]);
        assert_eq!(enc("SHLD", &["0x2010"]).unwrap(), [0x22, 0x10, 0x20]);
        assert_eq!(enc("LDAX", &["D"]).unwrap(), [0x1a]);
        assert_eq!(enc("STAX", &["B"]).unwrap(), [0x02]);
        assert_eq!(enc("INR", &["M"]).unwrap(), [0x34]);
        assert_eq!(enc("DCR", &["A"]).unwrap(), [0x3d]);
        assert_eq!(enc("INX", &["H"]).unwrap(), [0x23]);
        assert_eq!(enc("DCX", &["SP"]).unwrap(), [0x3b]);
        assert_eq!(enc("DAD", &["B"]).unwrap(), [0x09]);
        assert_eq!(enc("ADD", &["B"]).unwrap(), [0x80]);
        assert_eq!(enc("ADC", &["M"]).unwrap(), [0x8e]);
        assert_eq!(enc("SUB", &["L"]).unwrap(), [0x95]);
        assert_eq!(enc("SBB", &["A"]).unwrap(), [0x9f]);
        assert_eq!(enc("ANA", &["B"]).unwrap(), [0xa0]);
        assert_eq!(enc("XRA", &["C"]).unwrap(), [0xa9]);
        assert_eq!(enc("ORA", &["D"]).unwrap(), [0xb2]);
        assert_eq!(enc("CMP", &["E"]).unwrap(), [0xbb]);
        assert_eq!(enc("ADI", &["1"]).unwrap(), [0xc6, 0x01]);
        assert_eq!(enc("SBI", &["2"]).unwrap(), [0xde, 0x02]);
        assert_eq!(enc("CPI", &["0xff"]).unwrap(), [0xfe, 0xff]);
        assert_eq!(enc("JMP", &["0x0100"]).unwrap(), [0xc3, 0x00, 0x01]);
        assert_eq!(enc("JNZ", &["0x0100"]).unwrap(), [0xc2, 0x00, 0x01]);
        assert_eq!(enc("JM", &["0x0100"]).unwrap(), [0xfa, 0x00, 0x01]);
        assert_eq!(enc("CALL", &["0x0100"]).unwrap(), [0xcd, 0x00, 0x01]);
        assert_eq!(enc("CPE", &["0x0100"]).unwrap(), [0xec, 0x00, 0x01]);
        assert_eq!(enc("RET", &[]).unwrap(), [0xc9]);
        assert_eq!(enc("RNC", &[]).unwrap(), [0xd0]);
        assert_eq!(enc("RST", &["7"]).unwrap(), [0xff]);
        assert_eq!(enc("PUSH", &["PSW"]).unwrap(), [0xf5]);
        assert_eq!(enc("POP", &["B"]).unwrap(), [0xc1]);
        assert_eq!(enc("IN", &["0x10"]).unwrap(), [0xdb, 0x10]);
        assert_eq!(enc("OUT", &["0x10"]).unwrap(), [0xd3, 0x10]);
        assert_eq!(enc("XTHL", &[]).unwrap(), [0xe3]);
        assert_eq!(enc("EI", &[]).unwrap(), [0xfb]);
        assert_eq!(enc("HLT", &[]).unwrap(), [0x76]);
    }

    #[test]
    fn mov_m_m_is_rejected() {
        assert_eq!(enc("MOV", &["M", "M"]).unwrap_err(), Error::InvalidMovMm);
    }

    #[test]
    fn sizes_match_encodings() {
        for (mnemonic, operands) in [
            ("NOP", vec![]),
            ("MOV", vec!["B", "C"]),
            ("MVI", vec!["A", "1"]),
            ("LXI", vec!["B", "0x1234"]),
            ("LDA", vec!["0x2000"]),
            ("JZ", vec!["0x2000"]),
            ("CNZ", vec!["0x2000"]),
            ("RPO", vec![]),
            ("RST", vec!["0"]),
            ("OUT", vec!["1"]),
        ] {
            let bytes = enc(mnemonic, &operands).unwrap();
            assert_eq!(
                size(mnemonic),
                Some(bytes.len() as u16),
                "size mismatch for {mnemonic}"
            );
        }
    }

    #[test]
    fn unknown_mnemonic() {
        assert_eq!(
            enc("MOVE", &["B", "C"]).unwrap_err(),
            Error::UnknownOpcode("MOVE".into())
        );
        assert_eq!(size("MOVE"), None);
    }
}
