//! # Vostok assembler
//!
//! Two-pass symbolic assembler for the Intel 8080: `.include` expansion,
//! macros with argument substitution and per-expansion local-label
//! suffixes, `.loop`/`.if` blocks, file/`.org`-scoped local labels, and a
//! debug index mapping every source line to every address it emits.
//!
//! # Examples
//!
//! ```
//! use vostok_asm::Assembler;
//!
//! let out = Assembler::new()
//!     .assemble_str(".org 0x0100\nstart: @loop: JMP @loop\n", "demo.asm")
//!     .unwrap();
//! assert_eq!(out.base, 0x0100);
//! assert_eq!(out.rom, [0xc3, 0x00, 0x01]);
//! assert_eq!(out.index.labels["start"].addr, "0x0100");
//! ```

#![warn(clippy::pedantic)]

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::debug;

mod enc;
mod expand;
mod pass;
mod read;

pub mod err;
pub mod index;
pub mod lex;
pub mod sym;

pub use self::err::{Diagnostic, Error, Notice, Origin, Report, Warning};
pub use self::index::{BreakpointEntry, DebugIndex};
pub use self::read::{INCLUDE_DEPTH, SourceLine};

/// Assembler entry point.
///
/// Configure with the builder methods, then call
/// [`assemble_file`](Self::assemble_file) or
/// [`assemble_str`](Self::assemble_str). One invocation runs to completion
/// and produces either a ROM plus debug index, or the full set of
/// diagnostics.
#[derive(Debug, Default)]
pub struct Assembler {
    project_dir: Option<PathBuf>,
    breakpoints: IndexMap<String, Vec<BreakpointEntry>>,
}

impl Assembler {
    /// Constructs a new `Assembler`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Anchors debug-index file keys at a project directory.
    #[must_use]
    pub fn project_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_dir = Some(dir.into());
        self
    }

    /// Attaches a breakpoint table to round-trip through the debug index.
    #[must_use]
    pub fn breakpoints(mut self, breakpoints: IndexMap<String, Vec<BreakpointEntry>>) -> Self {
        self.breakpoints = breakpoints;
        self
    }

    /// Assembles a root source file.
    ///
    /// # Errors
    ///
    /// Errors with every diagnostic the run collected; the output artefacts
    /// exist only on success.
    pub fn assemble_file(&self, path: &Path) -> Result<Output, Report> {
        let lines = read::read(path).map_err(|diag| Report {
            diagnostics: vec![diag],
        })?;
        self.finish(&lines)
    }

    /// Assembles in-memory source, attributing lines to `name`.
    ///
    /// # Errors
    ///
    /// See [`assemble_file`](Self::assemble_file).
    pub fn assemble_str(&self, src: &str, name: impl AsRef<Path>) -> Result<Output, Report> {
        let lines = read::read_str(src, name.as_ref()).map_err(|diag| Report {
            diagnostics: vec![diag],
        })?;
        self.finish(&lines)
    }

    fn finish(&self, lines: &[SourceLine]) -> Result<Output, Report> {
        let mut syms = sym::Symbols::new();
        let mut report = Report::default();
        let mut notices = Vec::new();

        let items = expand::Expander::new(&mut syms, &mut report, &mut notices).run(lines);
        pass::pass1(&items, &mut syms, &mut report, &mut notices);
        let emit = pass::pass2(&items, &syms, &mut report, &mut notices);

        if !report.is_empty() {
            return Err(report);
        }
        debug!(
            "assembled {} bytes at {:#06x} from {} lines",
            emit.rom.len(),
            emit.base,
            lines.len()
        );

        let index = DebugIndex::build(
            &items,
            &syms,
            &emit,
            self.project_dir.as_deref(),
            self.breakpoints.clone(),
        );
        Ok(Output {
            rom: emit.rom,
            base: emit.base,
            index,
            notices,
            prints: emit.prints,
        })
    }
}

/// A successful assembly.
#[derive(Debug)]
pub struct Output {
    /// ROM image, starting at [`base`](Self::base).
    pub rom: Vec<u8>,
    /// Address of `rom[0]`.
    pub base: u16,
    /// Debug index for the run.
    pub index: DebugIndex,
    /// Warnings collected along the way.
    pub notices: Vec<Notice>,
    /// Rendered `.print` output.
    pub prints: Vec<String>,
}
