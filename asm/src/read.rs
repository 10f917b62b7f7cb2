//! Source ingestion.
//!
//! Reads the root source file and recursively inlines `.include`d files,
//! producing a flat, order-preserving line stream in which every line knows
//! the file and 1-based line number it originally came from.

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::trace;

use crate::err::{Diagnostic, Error, Origin, Result};
use crate::lex;

/// Maximum depth of nested `.include` directives.
pub const INCLUDE_DEPTH: usize = 16;

/// A single line of expanded source.
#[derive(Clone, Debug)]
pub struct SourceLine {
    /// Raw line text (untrimmed, comments intact).
    pub text: String,
    /// File and line this text originally came from.
    pub origin: Origin,
}

impl SourceLine {
    /// Constructs a new `SourceLine`.
    #[must_use]
    pub fn new(text: impl Into<String>, origin: Origin) -> Self {
        Self {
            text: text.into(),
            origin,
        }
    }
}

/// Reads the root file and inlines every `.include`, depth-first.
///
/// # Errors
///
/// Errors with [`Error::IncludeNotFound`] when a referenced file cannot be
/// read, or [`Error::IncludeLimit`] past [`INCLUDE_DEPTH`] levels of nesting.
/// Both carry the `file:line` of the offending directive.
pub fn read(root: &Path) -> Result<Vec<SourceLine>, Diagnostic> {
    let text = fs::read_to_string(root).map_err(|_| {
        Diagnostic::new(
            Error::IncludeNotFound(root.to_path_buf()),
            Origin::new(Rc::new(root.to_path_buf()), 0),
            String::new(),
        )
    })?;
    let mut lines = Vec::new();
    inline(&text, root, 0, &mut lines)?;
    Ok(lines)
}

/// Splits an in-memory source, attributing lines to the given path.
///
/// Used for string-based assembly; `.include` directives resolve relative to
/// the path's parent directory.
///
/// # Errors
///
/// See [`read`].
pub fn read_str(text: &str, name: &Path) -> Result<Vec<SourceLine>, Diagnostic> {
    let mut lines = Vec::new();
    inline(text, name, 0, &mut lines)?;
    Ok(lines)
}

fn inline(
    text: &str,
    file: &Path,
    depth: usize,
    out: &mut Vec<SourceLine>,
) -> Result<(), Diagnostic> {
    let file = Rc::new(file.to_path_buf());
    for (idx, line) in text.lines().enumerate() {
        let origin = Origin::new(Rc::clone(&file), u32::try_from(idx).unwrap_or(u32::MAX) + 1);
        match lex::include_path(line) {
            Some(path) => {
                let target = resolve(&file, path);
                trace!("{origin}: including {}", target.display());
                if depth + 1 > INCLUDE_DEPTH {
                    return Err(Diagnostic::new(
                        Error::IncludeLimit(INCLUDE_DEPTH),
                        origin,
                        line,
                    ));
                }
                let nested = fs::read_to_string(&target).map_err(|_| {
                    Diagnostic::new(Error::IncludeNotFound(target.clone()), origin.clone(), line)
                })?;
                inline(&nested, &target, depth + 1, out)?;
            }
            None => out.push(SourceLine::new(line, origin)),
        }
    }
    Ok(())
}

/// Resolves an include path relative to the including file's directory.
fn resolve(from: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        from.parent().unwrap_or_else(|| Path::new(".")).join(path)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn read_str_keeps_origins() {
        let lines = read_str("NOP\n\nHLT\n", Path::new("demo.asm")).unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].text, "NOP");
        assert_eq!(lines[2].origin.line, 3);
        assert_eq!(*lines[2].origin.file, PathBuf::from("demo.asm"));
    }

    #[test]
    fn include_inlines_relative_to_parent() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("inner.asm"), "MVI A, 1\n").unwrap();
        fs::write(
            dir.path().join("root.asm"),
            ".include \"sub/inner.asm\"\nHLT\n",
        )
        .unwrap();

        let lines = read(&dir.path().join("root.asm")).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "MVI A, 1");
        assert_eq!(*lines[0].origin.file, sub.join("inner.asm"));
        assert_eq!(lines[1].text, "HLT");
    }

    #[test]
    fn missing_include_cites_directive() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("root.asm"), "NOP\n.include \"gone.asm\"\n").unwrap();

        let err = read(&dir.path().join("root.asm")).unwrap_err();
        assert!(matches!(err.error, Error::IncludeNotFound(_)));
        assert_eq!(err.origin.line, 2);
    }

    #[test]
    fn include_cycle_hits_depth_cap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loop.asm");
        fs::write(&path, ".include \"loop.asm\"\n").unwrap();

        let err = read(&path).unwrap_err();
        assert!(matches!(err.error, Error::IncludeLimit(INCLUDE_DEPTH)));
    }
}
