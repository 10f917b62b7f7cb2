//! Assembly diagnostics.

use std::fmt::{self, Display};
use std::path::PathBuf;
use std::rc::Rc;

use thiserror::Error;

/// A convenient type alias for [`Result`](std::result::Result).
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Location of a source line.
///
/// Lines are 1-based. The file is the resolved path of the file the line was
/// read from, which for included files differs from the root source.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Origin {
    /// Resolved source file path.
    pub file: Rc<PathBuf>,
    /// 1-based line number within `file`.
    pub line: u32,
}

impl Origin {
    /// Constructs a new `Origin`.
    #[must_use]
    pub fn new(file: Rc<PathBuf>, line: u32) -> Self {
        Self { file, line }
    }
}

impl Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

/// An error raised while assembling.
///
/// The set is closed; every variant corresponds to one failure mode of the
/// pipeline. Location is carried separately by [`Diagnostic`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum Error {
    /// Included file could not be read.
    #[error("include not found: {}", .0.display())]
    IncludeNotFound(PathBuf),
    /// Include recursion exceeded the depth cap.
    #[error("include depth exceeds {0} levels")]
    IncludeLimit(usize),
    /// `.macro` without a matching `.endmacro`.
    #[error("unterminated `.macro`")]
    UnterminatedMacro,
    /// `.if` without a matching `.endif`.
    #[error("unterminated `.if`")]
    UnterminatedIf,
    /// `.loop` without a matching `.endloop`.
    #[error("unterminated `.loop`")]
    UnterminatedLoop,
    /// `.align` argument is not a power of two.
    #[error("bad alignment: {0}")]
    BadAlign(u32),
    /// `.org` argument did not evaluate to an address.
    #[error("bad origin: {0}")]
    BadOrg(String),
    /// `DB` item is malformed.
    #[error("bad data byte: {0}")]
    BadDb(String),
    /// `DS` reserve count is malformed.
    #[error("bad data reserve: {0}")]
    BadDs(String),
    /// Global label defined twice.
    #[error("duplicate label `{name}` (first defined at line {prior})")]
    DuplicateLabel {
        /// Label name.
        name: String,
        /// Line of the earlier definition.
        prior: u32,
    },
    /// Symbol reference that never resolves.
    #[error("undefined symbol `{0}`")]
    UndefinedSymbol(String),
    /// Local label referenced outside any scope that defines it.
    #[error("local label `{0}` is not defined in this scope")]
    InvalidLocalScope(String),
    /// Mnemonic is not part of the 8080 instruction set.
    #[error("unknown opcode `{0}`")]
    UnknownOpcode(String),
    /// Operands do not fit the mnemonic.
    #[error("bad operand: {0}")]
    BadOperand(String),
    /// `MOV M,M` does not exist (its encoding is `HLT`).
    #[error("invalid instruction `MOV M,M`")]
    InvalidMovMm,
}

/// An error annotated with its source location.
///
/// Renders in the compiler-style `<path>:<line>: <message>` form, followed by
/// the offending source line.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    /// The underlying error.
    pub error: Error,
    /// Where the error was raised.
    pub origin: Origin,
    /// Text of the offending line.
    pub text: String,
}

impl Diagnostic {
    /// Constructs a new `Diagnostic`.
    #[must_use]
    pub fn new(error: Error, origin: Origin, text: impl Into<String>) -> Self {
        Self {
            error,
            origin,
            text: text.into(),
        }
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.origin, self.error)?;
        if !self.text.is_empty() {
            write!(f, "\n    {}", self.text)?;
        }
        Ok(())
    }
}

/// A non-fatal condition noticed while assembling.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum Warning {
    /// Value narrowed to the context's width.
    #[error("value {value:#x} truncated to {bits} bits")]
    Truncated {
        /// Value before masking.
        value: u32,
        /// Width of the destination context.
        bits: u8,
    },
}

/// A warning annotated with its source location.
#[derive(Clone, Debug)]
pub struct Notice {
    /// The underlying warning.
    pub warning: Warning,
    /// Where the warning was raised.
    pub origin: Origin,
}

impl Notice {
    /// Constructs a new `Notice`.
    #[must_use]
    pub fn new(warning: Warning, origin: Origin) -> Self {
        Self { warning, origin }
    }
}

impl Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: warning: {}", self.origin, self.warning)
    }
}

/// Every diagnostic collected by a failed assembly.
#[derive(Debug, Default)]
pub struct Report {
    /// Collected diagnostics, in source order.
    pub diagnostics: Vec<Diagnostic>,
}

impl Report {
    /// Checks whether any diagnostics were collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Records a diagnostic.
    pub fn push(&mut self, diag: Diagnostic) {
        self.diagnostics.push(diag);
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, diag) in self.diagnostics.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{diag}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Report {}
