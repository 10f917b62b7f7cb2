//! Assembler passes.
//!
//! Pass-1 walks the expanded stream, assigning an address to every line and
//! registering symbols; pass-2 re-walks it, emitting bytes and recording the
//! line-to-address and data-span mappings the debug index is built from.
//! Both passes collect every error they meet instead of stopping at the
//! first.

use log::{debug, info};

use crate::enc;
use crate::err::{Diagnostic, Error, Notice, Report};
use crate::expand::Item;
use crate::lex::Stmt;
use crate::sym::{self, Ctx, Symbols};

/// Address of one emitted line.
#[derive(Clone, Debug)]
pub struct LineAddr {
    /// Index of the item in the expanded stream.
    pub item: usize,
    /// Address of the line's first emitted byte.
    pub addr: u16,
}

/// Extent of one `DB`/`DS` line.
#[derive(Clone, Debug)]
pub struct DataLine {
    /// Index of the item in the expanded stream.
    pub item: usize,
    /// First address of the span.
    pub start: u16,
    /// Span length in bytes.
    pub bytes: u16,
    /// Element width for per-element highlighting.
    pub unit: u16,
}

/// Everything pass-2 emits.
#[derive(Debug, Default)]
pub struct Emit {
    /// ROM image, starting at [`Self::base`].
    pub rom: Vec<u8>,
    /// Address of `rom[0]`.
    pub base: u16,
    /// First-byte address of every line that produced bytes, in emission
    /// order (macro/loop replays repeat their invocation line).
    pub lines: Vec<LineAddr>,
    /// `DB`/`DS` spans.
    pub data: Vec<DataLine>,
    /// Rendered `.print` output, in source order.
    pub prints: Vec<String>,
}

/// Runs pass-1: address assignment and symbol registration.
pub fn pass1(items: &[Item], syms: &mut Symbols, report: &mut Report, notices: &mut Vec<Notice>) {
    let mut addr = 0u32;
    for (idx, item) in items.iter().enumerate() {
        let mut fail =
            |error: Error| report.push(Diagnostic::new(error, item.src.origin.clone(), item.src.text.as_str()));

        // `.org` relocates before its labels bind
        if let Stmt::Org(expr) = &item.line.stmt {
            match syms.eval(expr, None) {
                Ok(value) if (0..=0xffff).contains(&value) => addr = value as u32,
                Ok(value) => fail(Error::BadOrg(format!("{value:#x} out of range"))),
                Err(_) => fail(Error::BadOrg(expr.clone())),
            }
        }
        if let Stmt::Align(expr) = &item.line.stmt {
            match syms.eval(expr, None) {
                Ok(value) if value > 0 && (value as u32).is_power_of_two() => {
                    let align = value as u32;
                    addr = addr.div_ceil(align) * align;
                }
                Ok(value) => fail(Error::BadAlign((value & 0xffff_ffff) as u32)),
                Err(_) => fail(Error::BadAlign(0)),
            }
        }

        for label in &item.line.labels {
            if label.starts_with('@') {
                let uniq = syms.define_local(label, item.scope, idx, item.src.origin.clone());
                syms.place_local(uniq, addr as u16);
            } else if let Err(error) =
                syms.define_label(label, addr as u16, item.src.origin.clone())
            {
                report.push(Diagnostic::new(error, item.src.origin.clone(), item.src.text.as_str()));
            }
        }

        addr += size(item, idx, syms, report, notices);
    }
    debug!("pass-1 complete: {} labels", syms.labels.len());
}

/// Computes the byte size of one item, reporting sizing errors.
fn size(
    item: &Item,
    idx: usize,
    syms: &Symbols,
    report: &mut Report,
    notices: &mut Vec<Notice>,
) -> u32 {
    let mut fail =
        |error: Error| report.push(Diagnostic::new(error, item.src.origin.clone(), item.src.text.as_str()));
    match &item.line.stmt {
        Stmt::Instr { mnemonic, .. } => match enc::size(mnemonic) {
            Some(bytes) => u32::from(bytes),
            None => {
                fail(Error::UnknownOpcode(mnemonic.clone()));
                0
            }
        },
        Stmt::Db(entries) => entries.iter().map(|e| db_len(e)).sum(),
        Stmt::Ds(expr) => match syms.eval(expr, Some(Ctx { scope: item.scope, line: idx })) {
            Ok(count) if count >= 0 => {
                let (count, warning) = sym::narrow(count, 16);
                if let Some(warning) = warning {
                    notices.push(Notice::new(warning, item.src.origin.clone()));
                }
                u32::from(count)
            }
            _ => {
                fail(Error::BadDs(expr.clone()));
                0
            }
        },
        _ => 0,
    }
}

/// Byte length of one `DB` entry (strings expand to one byte per char).
fn db_len(entry: &str) -> u32 {
    if entry.len() >= 2 && entry.starts_with('\'') && entry.ends_with('\'') {
        (entry.len() - 2) as u32
    } else {
        1
    }
}

/// Runs pass-2: byte emission and mapping capture.
pub fn pass2(
    items: &[Item],
    syms: &Symbols,
    report: &mut Report,
    notices: &mut Vec<Notice>,
) -> Emit {
    let mut image = vec![0u8; 0x1_0000];
    let mut lo = usize::MAX;
    let mut hi = 0usize;
    let mut addr = 0u32;
    let mut out = Emit::default();

    for (idx, item) in items.iter().enumerate() {
        let ctx = Ctx {
            scope: item.scope,
            line: idx,
        };
        let mut eval = |expr: &str, bits: u8| -> Result<u16, Error> {
            let raw = syms.eval(expr, Some(ctx))?;
            let (value, warning) = sym::narrow(raw, bits);
            if let Some(warning) = warning {
                notices.push(Notice::new(warning, item.src.origin.clone()));
            }
            Ok(value)
        };

        match &item.line.stmt {
            Stmt::Org(expr) => {
                // Validated in pass-1
                if let Ok(value) = syms.eval(expr, None) {
                    addr = (value & 0xffff) as u32;
                }
            }
            Stmt::Align(expr) => {
                if let Ok(value) = syms.eval(expr, None) {
                    if value > 0 && (value as u32).is_power_of_two() {
                        addr = addr.div_ceil(value as u32) * (value as u32);
                    }
                }
            }
            Stmt::Instr { mnemonic, operands } => {
                match enc::encode(mnemonic, operands, &mut eval) {
                    Ok(bytes) => {
                        out.lines.push(LineAddr {
                            item: idx,
                            addr: addr as u16,
                        });
                        for byte in bytes {
                            store(&mut image, &mut lo, &mut hi, addr, byte);
                            addr += 1;
                        }
                    }
                    Err(error) => {
                        // Unknown mnemonics were already reported by pass-1
                        if !matches!(error, Error::UnknownOpcode(_)) {
                            report.push(Diagnostic::new(
                                error,
                                item.src.origin.clone(),
                                item.src.text.as_str(),
                            ));
                        }
                        addr += u32::from(enc::size(mnemonic).unwrap_or(0));
                    }
                }
            }
            Stmt::Db(entries) => {
                let start = addr as u16;
                let mut emitted = 0u16;
                for entry in entries {
                    if entry.len() >= 2 && entry.starts_with('\'') && entry.ends_with('\'') {
                        for byte in entry[1..entry.len() - 1].bytes() {
                            store(&mut image, &mut lo, &mut hi, addr, byte);
                            addr += 1;
                            emitted += 1;
                        }
                    } else if entry.is_empty() {
                        report.push(Diagnostic::new(
                            Error::BadDb(entry.clone()),
                            item.src.origin.clone(),
                            item.src.text.as_str(),
                        ));
                    } else {
                        match eval(entry, 8) {
                            Ok(value) => {
                                store(&mut image, &mut lo, &mut hi, addr, value as u8);
                                addr += 1;
                                emitted += 1;
                            }
                            Err(_) => {
                                report.push(Diagnostic::new(
                                    Error::BadDb(entry.clone()),
                                    item.src.origin.clone(),
                                    item.src.text.as_str(),
                                ));
                                addr += 1;
                            }
                        }
                    }
                }
                out.lines.push(LineAddr { item: idx, addr: start });
                out.data.push(DataLine {
                    item: idx,
                    start,
                    bytes: emitted,
                    unit: 1,
                });
            }
            Stmt::Ds(expr) => {
                let count = syms
                    .eval(expr, Some(ctx))
                    .map(|v| sym::narrow(v, 16).0)
                    .unwrap_or(0);
                let start = addr as u16;
                for _ in 0..count {
                    store(&mut image, &mut lo, &mut hi, addr, 0x00);
                    addr += 1;
                }
                out.lines.push(LineAddr { item: idx, addr: start });
                out.data.push(DataLine {
                    item: idx,
                    start,
                    bytes: count,
                    unit: 1,
                });
            }
            Stmt::Print(args) => match print(args, &mut eval) {
                Ok(text) => {
                    info!("{}: {text}", item.src.origin);
                    out.prints.push(text);
                }
                Err(error) => {
                    report.push(Diagnostic::new(error, item.src.origin.clone(), item.src.text.as_str()));
                }
            },
            Stmt::Empty | Stmt::Const { .. } => (),
            // Block directives never survive expansion
            _ => (),
        }
    }

    if lo <= hi {
        out.base = lo as u16;
        out.rom = image[lo..=hi].to_vec();
    }
    debug!("pass-2 complete: {} bytes at {:#06x}", out.rom.len(), out.base);
    out
}

fn store(image: &mut [u8], lo: &mut usize, hi: &mut usize, addr: u32, byte: u8) {
    let at = (addr & 0xffff) as usize;
    image[at] = byte;
    *lo = (*lo).min(at);
    *hi = (*hi).max(at);
}

/// Renders a `.print "fmt" arg, arg, …` directive.
fn print(args: &str, eval: &mut impl enc::Eval) -> Result<String, Error> {
    let args = args.trim();
    let Some(rest) = args.strip_prefix('"') else {
        return Err(Error::BadOperand(format!("print format `{args}`")));
    };
    let Some(quote) = rest.find('"') else {
        return Err(Error::BadOperand(format!("print format `{args}`")));
    };
    let fmt = &rest[..quote];
    let tail = rest[quote + 1..].trim();
    let exprs: Vec<&str> = if tail.is_empty() {
        Vec::new()
    } else {
        tail.split(',').map(str::trim).collect()
    };

    let mut text = String::new();
    let mut pieces = fmt.split("{}");
    if let Some(head) = pieces.next() {
        text.push_str(head);
    }
    let mut exprs = exprs.into_iter();
    for piece in pieces {
        match exprs.next() {
            Some(expr) => {
                let value = eval.eval(expr, 16)?;
                text.push_str(&value.to_string());
            }
            None => text.push_str("{}"),
        }
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::err::Warning;
    use crate::expand::Expander;
    use crate::read;

    fn assemble(src: &str) -> (Emit, Symbols, Report, Vec<Notice>) {
        let lines = read::read_str(src, Path::new("test.asm")).unwrap();
        let mut syms = Symbols::new();
        let mut report = Report::default();
        let mut notices = Vec::new();
        let items = Expander::new(&mut syms, &mut report, &mut notices).run(&lines);
        pass1(&items, &mut syms, &mut report, &mut notices);
        let emit = pass2(&items, &syms, &mut report, &mut notices);
        (emit, syms, report, notices)
    }

    #[test]
    fn forward_and_backward_references_agree() {
        let (emit, syms, report, _) = assemble(
            ".org 0x0100\n\
             JMP after\n\
             before: NOP\n\
             JMP before\n\
             after: HLT\n",
        );
        assert!(report.is_empty(), "{report}");
        assert_eq!(syms.labels["before"].addr, 0x0103);
        assert_eq!(syms.labels["after"].addr, 0x0107);
        assert_eq!(
            emit.rom,
            [0xc3, 0x07, 0x01, 0x00, 0xc3, 0x03, 0x01, 0x76]
        );
        assert_eq!(emit.base, 0x0100);
    }

    #[test]
    fn size_law_for_directives() {
        let (_, syms, report, _) = assemble(
            "a: MVI A, 1\n\
             b: LXI H, 0\n\
             c: DB 1, 2, 'hi'\n\
             d: DS 5\n\
             e: NOP\n",
        );
        assert!(report.is_empty(), "{report}");
        assert_eq!(syms.labels["b"].addr - syms.labels["a"].addr, 2);
        assert_eq!(syms.labels["c"].addr - syms.labels["b"].addr, 3);
        assert_eq!(syms.labels["d"].addr - syms.labels["c"].addr, 4);
        assert_eq!(syms.labels["e"].addr - syms.labels["d"].addr, 5);
    }

    #[test]
    fn local_scopes_split_at_org() {
        let (_, _, report, _) = assemble(
            ".org 0x0100\n\
             @loop: JMP @loop\n\
             .org 0x0200\n\
             JMP @loop\n",
        );
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(
            report.diagnostics[0].error,
            Error::InvalidLocalScope("@loop".into())
        );
    }

    #[test]
    fn truncated_immediate_warns_and_masks() {
        let (emit, _, report, notices) = assemble("MVI A, 0x1FF\n");
        assert!(report.is_empty(), "{report}");
        assert_eq!(emit.rom, [0x3e, 0xff]);
        assert!(matches!(
            notices[0].warning,
            Warning::Truncated { value: 0x1ff, bits: 8 }
        ));
    }

    #[test]
    fn error_completeness() {
        let (_, _, report, _) = assemble(
            "dup: NOP\n\
             dup: NOP\n\
             BOGUS A, B\n\
             MOV M, M\n\
             MVI A, ghost\n",
        );
        let n = report.diagnostics.len();
        assert!(n >= 4, "expected at least 4 diagnostics, got {n}: {report}");
    }

    #[test]
    fn align_rounds_to_power_of_two() {
        let (_, syms, report, _) = assemble("NOP\n.align 8\nhere: HLT\n");
        assert!(report.is_empty(), "{report}");
        assert_eq!(syms.labels["here"].addr, 8);

        let (_, _, report, _) = assemble(".align 3\n");
        assert!(matches!(report.diagnostics[0].error, Error::BadAlign(3)));
    }

    #[test]
    fn print_renders_placeholders() {
        let (emit, _, report, _) = assemble("N = 3\n.print \"n is {}\" N\n");
        assert!(report.is_empty(), "{report}");
        assert_eq!(emit.prints, ["n is 3"]);
    }
}
