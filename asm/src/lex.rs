//! Line lexer and statement classifier.
//!
//! Works line-at-a-time: strips comments, peels off `label:` prefixes, and
//! classifies the remainder into one statement kind. Operand text is kept
//! raw here; expressions are evaluated later, once the symbol table exists.

use crate::err::{Error, Result};

/// A lexed source line: zero or more labels plus one statement.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Line {
    /// Labels defined on this line, in order.
    pub labels: Vec<String>,
    /// The statement following the labels.
    pub stmt: Stmt,
}

/// One classified statement.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum Stmt {
    /// Nothing to assemble (blank or label-only line).
    #[default]
    Empty,
    /// Constant definition: `NAME = expr` or `NAME EQU expr`.
    Const {
        /// Constant name.
        name: String,
        /// Right-hand side expression.
        expr: String,
    },
    /// `.org expr`.
    Org(String),
    /// `.align expr`.
    Align(String),
    /// `.if expr`.
    If(String),
    /// `.endif`.
    EndIf,
    /// `.loop expr`.
    Loop(String),
    /// `.endloop`.
    EndLoop,
    /// `.macro name(p1, p2, …)`.
    Macro {
        /// Macro name.
        name: String,
        /// Parameter names.
        params: Vec<String>,
    },
    /// `.endmacro`.
    EndMacro,
    /// `.print "fmt" arg, arg, …` (raw argument text).
    Print(String),
    /// `DB item, item, …` (raw item text, quote-aware split).
    Db(Vec<String>),
    /// `DS expr`.
    Ds(String),
    /// An 8080 instruction.
    Instr {
        /// Uppercased mnemonic.
        mnemonic: String,
        /// Comma-separated operands, trimmed.
        operands: Vec<String>,
    },
    /// Macro invocation: `name(arg, arg, …)`.
    Invoke {
        /// Macro name.
        name: String,
        /// Raw argument expressions.
        args: Vec<String>,
    },
}

/// Strips a trailing `;` or `//` comment, respecting single-quoted strings.
#[must_use]
pub fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut quoted = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => quoted = !quoted,
            b';' if !quoted => return &line[..i],
            b'/' if !quoted && bytes.get(i + 1) == Some(&b'/') => return &line[..i],
            _ => (),
        }
        i += 1;
    }
    line
}

/// Extracts the path of an `.include "path"` line, if this is one.
#[must_use]
pub fn include_path(line: &str) -> Option<&str> {
    let text = strip_comment(line).trim();
    let rest = text.strip_prefix(".include")?.trim();
    let rest = rest.strip_prefix('"')?;
    rest.split('"').next()
}

/// Lexes one line of source.
///
/// # Errors
///
/// Errors on malformed directives and macro headers.
pub fn line(text: &str) -> Result<Line> {
    let mut rest = strip_comment(text).trim();
    let mut labels = Vec::new();

    // Peel off `label:` prefixes
    while let Some((name, tail)) = split_label(rest) {
        labels.push(name.to_string());
        rest = tail.trim_start();
    }
    // A bare identifier directly before `.org` also defines a label
    if let Some((word, tail)) = split_word(rest) {
        if is_ident(word) && tail.trim_start().starts_with(".org") {
            labels.push(word.to_string());
            rest = tail.trim_start();
        }
    }

    let stmt = statement(rest)?;
    Ok(Line { labels, stmt })
}

fn statement(rest: &str) -> Result<Stmt> {
    if rest.is_empty() {
        return Ok(Stmt::Empty);
    }
    if rest.starts_with('.') {
        return directive(rest);
    }

    // Constant definitions: `NAME = expr` (any spacing), `NAME EQU expr`
    if let Some(eq) = rest.find('=') {
        let name = rest[..eq].trim();
        if is_ident(name) {
            return Ok(Stmt::Const {
                name: name.to_string(),
                expr: rest[eq + 1..].trim().to_string(),
            });
        }
    }

    let (word, tail) = split_word(rest).unwrap_or((rest, ""));
    let tail = tail.trim();
    if is_ident(word) {
        if let Some((eq, expr)) = split_word(tail) {
            if eq.eq_ignore_ascii_case("EQU") {
                return Ok(Stmt::Const {
                    name: word.to_string(),
                    expr: expr.trim().to_string(),
                });
            }
        }
    }

    // Data directives
    let upper = word.to_ascii_uppercase();
    if upper == "DB" {
        return Ok(Stmt::Db(split_items(tail)));
    }
    if upper == "DS" {
        return Ok(Stmt::Ds(tail.to_string()));
    }

    // Macro invocation: `name(args)`
    if let Some(open) = rest.find('(') {
        let name = rest[..open].trim();
        if is_ident(name) && rest.ends_with(')') {
            let args = &rest[open + 1..rest.len() - 1];
            let args = if args.trim().is_empty() {
                Vec::new()
            } else {
                split_items(args)
            };
            return Ok(Stmt::Invoke {
                name: name.to_string(),
                args,
            });
        }
    }

    // Anything else is an instruction
    let operands = if tail.is_empty() {
        Vec::new()
    } else {
        split_items(tail)
    };
    Ok(Stmt::Instr {
        mnemonic: upper,
        operands,
    })
}

fn directive(rest: &str) -> Result<Stmt> {
    let (word, tail) = split_word(rest).unwrap_or((rest, ""));
    let tail = tail.trim();
    match word.to_ascii_lowercase().as_str() {
        ".org" => Ok(Stmt::Org(tail.to_string())),
        ".align" => Ok(Stmt::Align(tail.to_string())),
        ".if" => Ok(Stmt::If(tail.to_string())),
        ".endif" => Ok(Stmt::EndIf),
        ".loop" => Ok(Stmt::Loop(tail.to_string())),
        ".endloop" => Ok(Stmt::EndLoop),
        ".macro" => macro_header(tail),
        ".endmacro" => Ok(Stmt::EndMacro),
        ".print" => Ok(Stmt::Print(tail.to_string())),
        // `.include` is consumed by the reader; reaching here means it
        // survived into a context where it cannot be expanded.
        other => Err(Error::UnknownOpcode(other.to_string())),
    }
}

fn macro_header(tail: &str) -> Result<Stmt> {
    let open = tail
        .find('(')
        .ok_or_else(|| Error::BadOperand(format!("macro header `{tail}`")))?;
    let name = tail[..open].trim();
    let close = tail
        .rfind(')')
        .filter(|&c| c > open)
        .ok_or_else(|| Error::BadOperand(format!("macro header `{tail}`")))?;
    if !is_ident(name) {
        return Err(Error::BadOperand(format!("macro name `{name}`")));
    }
    let params = tail[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect();
    Ok(Stmt::Macro {
        name: name.to_string(),
        params,
    })
}

/// Splits a leading `label:` off the text, if present.
fn split_label(text: &str) -> Option<(&str, &str)> {
    let colon = text.find(':')?;
    let name = &text[..colon];
    is_ident(name).then(|| (name, &text[colon + 1..]))
}

/// Splits the first whitespace-delimited word off the text.
fn split_word(text: &str) -> Option<(&str, &str)> {
    if text.is_empty() {
        return None;
    }
    match text.find(char::is_whitespace) {
        Some(ws) => Some((&text[..ws], &text[ws..])),
        None => Some((text, "")),
    }
}

/// Checks whether the text is a single identifier.
///
/// Local labels start with `@`; expanded locals carry dotted suffixes.
#[must_use]
pub fn is_ident(text: &str) -> bool {
    let mut chars = text.chars();
    let Some(head) = chars.next() else {
        return false;
    };
    (head.is_ascii_alphabetic() || head == '_' || head == '@')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Splits comma-separated items, keeping commas inside `'…'` strings.
#[must_use]
pub fn split_items(text: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut item = String::new();
    let mut quoted = false;
    for c in text.chars() {
        match c {
            '\'' => {
                quoted = !quoted;
                item.push(c);
            }
            ',' if !quoted => {
                items.push(item.trim().to_string());
                item.clear();
            }
            _ => item.push(c),
        }
    }
    if !item.trim().is_empty() || !items.is_empty() && text.trim_end().ends_with(',') {
        items.push(item.trim().to_string());
    }
    items
}

/// Parses a numeric literal.
///
/// Accepted forms: decimal, `0x…`/`$…` hex, `b…`/`%…` binary, `'c'` char.
#[must_use]
pub fn literal(tok: &str) -> Option<u32> {
    if let Some(hex) = tok.strip_prefix("0x").or_else(|| tok.strip_prefix("0X")) {
        return u32::from_str_radix(hex, 16).ok();
    }
    if let Some(hex) = tok.strip_prefix('$') {
        return u32::from_str_radix(hex, 16).ok();
    }
    if let Some(bin) = tok.strip_prefix('%') {
        return u32::from_str_radix(bin, 2).ok();
    }
    if let Some(bin) = tok.strip_prefix('b') {
        if !bin.is_empty() && bin.bytes().all(|b| b == b'0' || b == b'1') {
            return u32::from_str_radix(bin, 2).ok();
        }
    }
    if tok.len() == 3 && tok.starts_with('\'') && tok.ends_with('\'') {
        return Some(u32::from(tok.as_bytes()[1]));
    }
    if !tok.is_empty() && tok.bytes().all(|b| b.is_ascii_digit()) {
        return tok.parse().ok();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_strip_outside_quotes() {
        assert_eq!(strip_comment("NOP ; trailing"), "NOP ");
        assert_eq!(strip_comment("NOP // trailing"), "NOP ");
        assert_eq!(strip_comment("DB 'a;b' ; real"), "DB 'a;b' ");
    }

    #[test]
    fn labels_peel_in_order() {
        let line = line("start: @loop: JMP @loop").unwrap();
        assert_eq!(line.labels, ["start", "@loop"]);
        assert_eq!(
            line.stmt,
            Stmt::Instr {
                mnemonic: "JMP".into(),
                operands: vec!["@loop".into()],
            }
        );
    }

    #[test]
    fn bare_label_before_org() {
        let line = line("boot .org 0x0100").unwrap();
        assert_eq!(line.labels, ["boot"]);
        assert_eq!(line.stmt, Stmt::Org("0x0100".into()));
    }

    #[test]
    fn constants_both_spellings() {
        assert_eq!(
            line("SIZE = 0x10").unwrap().stmt,
            Stmt::Const {
                name: "SIZE".into(),
                expr: "0x10".into(),
            }
        );
        assert_eq!(
            line("SIZE EQU 16").unwrap().stmt,
            Stmt::Const {
                name: "SIZE".into(),
                expr: "16".into(),
            }
        );
    }

    #[test]
    fn db_split_respects_strings() {
        let Stmt::Db(items) = line("DB 'a,b', 0x00, 13").unwrap().stmt else {
            panic!("expected DB");
        };
        assert_eq!(items, ["'a,b'", "0x00", "13"]);
    }

    #[test]
    fn macro_header_and_invocation() {
        assert_eq!(
            line(".macro put(ch, port)").unwrap().stmt,
            Stmt::Macro {
                name: "put".into(),
                params: vec!["ch".into(), "port".into()],
            }
        );
        assert_eq!(
            line("put('x', 0x10)").unwrap().stmt,
            Stmt::Invoke {
                name: "put".into(),
                args: vec!["'x'".into(), "0x10".into()],
            }
        );
    }

    #[test]
    fn literal_forms() {
        assert_eq!(literal("255"), Some(255));
        assert_eq!(literal("0xFF"), Some(255));
        assert_eq!(literal("$ff"), Some(255));
        assert_eq!(literal("%1010"), Some(10));
        assert_eq!(literal("b1010"), Some(10));
        assert_eq!(literal("'A'"), Some(65));
        assert_eq!(literal("label"), None);
        assert_eq!(literal("beef"), None);
    }
}
