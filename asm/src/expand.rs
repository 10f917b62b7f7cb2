//! Macro engine.
//!
//! Streams the flat line array into its fully expanded form: macro
//! definitions are captured, invocations and `.loop` bodies are replayed
//! with per-expansion local-label suffixes, `.if` blocks are kept or dropped
//! at expansion time, and constants are registered eagerly so later
//! expansion-time expressions can see them. Every emitted item carries the
//! scope it belongs to.

use log::trace;

use crate::err::{Diagnostic, Error, Notice, Report};
use crate::lex::{self, Line, Stmt};
use crate::read::SourceLine;
use crate::sym::{Macro, Scope, Symbols};

/// Maximum depth of nested macro expansion.
const EXPAND_DEPTH: usize = 16;

/// One fully expanded line, ready for the assembler passes.
#[derive(Clone, Debug)]
pub struct Item {
    /// Source text and origin (expansions point at the invocation line).
    pub src: SourceLine,
    /// Lexed content.
    pub line: Line,
    /// Scope the line belongs to.
    pub scope: Scope,
}

/// Expansion-pass state.
pub struct Expander<'a> {
    syms: &'a mut Symbols,
    report: &'a mut Report,
    notices: &'a mut Vec<Notice>,
    out: Vec<Item>,
    scope: Scope,
    issued: Scope,
    file: Option<std::rc::Rc<std::path::PathBuf>>,
    suffix: u32,
}

impl<'a> Expander<'a> {
    /// Constructs a new `Expander` over the given sinks.
    pub fn new(
        syms: &'a mut Symbols,
        report: &'a mut Report,
        notices: &'a mut Vec<Notice>,
    ) -> Self {
        Self {
            syms,
            report,
            notices,
            out: Vec::new(),
            scope: 0,
            issued: 0,
            file: None,
            suffix: 0,
        }
    }

    /// Expands the whole line stream.
    ///
    /// Errors are collected into the report rather than aborting; callers
    /// check the report afterwards.
    pub fn run(mut self, lines: &[SourceLine]) -> Vec<Item> {
        self.process(lines, 0);
        self.out
    }

    /// Allocates a fresh scope and makes it current.
    fn enter_scope(&mut self) -> Scope {
        self.issued += 1;
        self.scope = self.issued;
        self.scope
    }

    fn fail(&mut self, error: Error, src: &SourceLine) {
        self.report
            .push(Diagnostic::new(error, src.origin.clone(), src.text.clone()));
    }

    fn process(&mut self, lines: &[SourceLine], depth: usize) {
        let mut i = 0;
        while i < lines.len() {
            let src = &lines[i];

            // Crossing into another file starts a new scope region
            if depth == 0 && self.file.as_ref() != Some(&src.origin.file) {
                if self.file.is_some() {
                    self.enter_scope();
                }
                self.file = Some(src.origin.file.clone());
            }

            let line = match lex::line(&src.text) {
                Ok(line) => line,
                Err(error) => {
                    self.fail(error, src);
                    i += 1;
                    continue;
                }
            };

            match line.stmt {
                Stmt::Macro { ref name, ref params } => {
                    let Some(end) = find_end(lines, i, BlockKind::Macro) else {
                        self.fail(Error::UnterminatedMacro, src);
                        return;
                    };
                    trace!("macro `{name}` captured ({} lines)", end - i - 1);
                    self.syms.define_macro(
                        name,
                        Macro {
                            params: params.clone(),
                            body: lines[i + 1..end].to_vec(),
                            origin: src.origin.clone(),
                        },
                    );
                    i = end + 1;
                }
                Stmt::If(ref expr) => {
                    let Some(end) = find_end(lines, i, BlockKind::If) else {
                        self.fail(Error::UnterminatedIf, src);
                        return;
                    };
                    match self.syms.eval(expr, None) {
                        Ok(value) if value != 0 => self.process(&lines[i + 1..end], depth),
                        Ok(_) => trace!("{}: `.if {expr}` dropped", src.origin),
                        Err(error) => self.fail(error, src),
                    }
                    i = end + 1;
                }
                Stmt::Loop(ref expr) => {
                    let Some(end) = find_end(lines, i, BlockKind::Loop) else {
                        self.fail(Error::UnterminatedLoop, src);
                        return;
                    };
                    match self.syms.eval(expr, None) {
                        Ok(count) if count >= 0 => {
                            for _ in 0..count {
                                let body = self.reissue(&lines[i + 1..end], &[], &[]);
                                self.process(&body, depth);
                            }
                        }
                        Ok(count) => {
                            self.fail(Error::BadOperand(format!("loop count {count}")), src);
                        }
                        Err(error) => self.fail(error, src),
                    }
                    i = end + 1;
                }
                Stmt::Invoke { ref name, ref args } => {
                    self.invoke(src, &line, name, args, depth);
                    i += 1;
                }
                Stmt::Const { ref name, ref expr } => {
                    match self.syms.define_const(name, expr, src.origin.clone()) {
                        Ok(Some(warning)) => {
                            self.notices.push(Notice::new(warning, src.origin.clone()));
                        }
                        Ok(None) => (),
                        Err(error) => self.fail(error, src),
                    }
                    self.emit(src, line);
                    i += 1;
                }
                Stmt::Org(_) => {
                    // `.org` opens a new scope region; the line itself
                    // (including any bare label on it) belongs to it
                    self.enter_scope();
                    self.emit(src, line);
                    i += 1;
                }
                Stmt::EndMacro | Stmt::EndIf | Stmt::EndLoop => {
                    self.fail(
                        Error::BadOperand(format!("unmatched `{}`", src.text.trim())),
                        src,
                    );
                    i += 1;
                }
                _ => {
                    self.emit(src, line);
                    i += 1;
                }
            }
        }
    }

    fn emit(&mut self, src: &SourceLine, line: Line) {
        self.out.push(Item {
            src: src.clone(),
            line,
            scope: self.scope,
        });
    }

    fn invoke(&mut self, src: &SourceLine, line: &Line, name: &str, args: &[String], depth: usize) {
        if depth + 1 > EXPAND_DEPTH {
            self.fail(
                Error::BadOperand(format!("macro recursion exceeds {EXPAND_DEPTH} levels")),
                src,
            );
            return;
        }
        let Some(def) = self.syms.macros.get(name) else {
            self.fail(Error::UnknownOpcode(name.to_string()), src);
            return;
        };
        if def.params.len() != args.len() {
            let error = Error::BadOperand(format!(
                "macro `{name}` takes {} arguments, got {}",
                def.params.len(),
                args.len()
            ));
            self.fail(error, src);
            return;
        }
        let params = def.params.clone();
        let body = def.body.clone();
        trace!("{}: expanding `{name}`", src.origin);

        // Labels on the invocation line itself stay at the call site
        if !line.labels.is_empty() {
            self.emit(
                src,
                Line {
                    labels: line.labels.clone(),
                    stmt: Stmt::Empty,
                },
            );
        }

        // Body lines take the invocation's origin and a fresh scope; the
        // call site's scope is restored afterwards so locals around the
        // invocation still resolve to each other
        let caller = self.scope;
        self.enter_scope();
        let body: Vec<SourceLine> = self
            .reissue(&body, &params, args)
            .into_iter()
            .map(|l| SourceLine::new(l.text, src.origin.clone()))
            .collect();
        self.process(&body, depth + 1);
        self.scope = caller;
    }

    /// Rewrites a body for one expansion: parameters are substituted and
    /// local labels gain this expansion's unique suffix.
    fn reissue(&mut self, body: &[SourceLine], params: &[String], args: &[String]) -> Vec<SourceLine> {
        self.suffix += 1;
        let suffix = self.suffix;
        body.iter()
            .map(|line| {
                SourceLine::new(
                    rewrite(&line.text, params, args, suffix),
                    line.origin.clone(),
                )
            })
            .collect()
    }
}

/// Block kinds with distinct terminators.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum BlockKind {
    Macro,
    If,
    Loop,
}

impl BlockKind {
    fn opens(self, stmt: &Stmt) -> bool {
        matches!(
            (self, stmt),
            (Self::Macro, Stmt::Macro { .. }) | (Self::If, Stmt::If(_)) | (Self::Loop, Stmt::Loop(_))
        )
    }

    fn closes(self, stmt: &Stmt) -> bool {
        matches!(
            (self, stmt),
            (Self::Macro, Stmt::EndMacro) | (Self::If, Stmt::EndIf) | (Self::Loop, Stmt::EndLoop)
        )
    }
}

/// Finds the index of the terminator matching the block opened at `open`.
///
/// Same-kind blocks nest; other kinds are ignored by the scan.
fn find_end(lines: &[SourceLine], open: usize, kind: BlockKind) -> Option<usize> {
    let mut level = 0usize;
    for (idx, line) in lines.iter().enumerate().skip(open + 1) {
        let Ok(line) = lex::line(&line.text) else {
            continue;
        };
        if kind.opens(&line.stmt) {
            level += 1;
        } else if kind.closes(&line.stmt) {
            if level == 0 {
                return Some(idx);
            }
            level -= 1;
        }
    }
    None
}

/// Rewrites one body line for an expansion.
///
/// Identifier runs are compared against the parameter list; runs starting
/// with `@` get the expansion suffix instead. Quoted text is untouched.
fn rewrite(text: &str, params: &[String], args: &[String], suffix: u32) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();
    let mut quoted = false;
    while let Some((start, c)) = chars.next() {
        if c == '\'' {
            quoted = !quoted;
            out.push(c);
            continue;
        }
        if quoted || !(c.is_ascii_alphabetic() || c == '_' || c == '@') {
            out.push(c);
            continue;
        }
        // Consume the identifier run
        let mut end = start + c.len_utf8();
        while let Some(&(idx, n)) = chars.peek() {
            if n.is_ascii_alphanumeric() || n == '_' || n == '.' {
                end = idx + n.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        let ident = &text[start..end];
        if let Some(local) = ident.strip_prefix('@') {
            out.push_str(&format!("@{local}.{suffix}"));
        } else if let Some(pos) = params.iter().position(|p| p == ident) {
            out.push_str(&args[pos]);
        } else {
            out.push_str(ident);
        }
    }
    out
}
