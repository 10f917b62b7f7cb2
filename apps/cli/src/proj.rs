//! Project files.
//!
//! A project is a JSON record naming the root source and, optionally, where
//! the ROM and debug index land. Relative paths are anchored at the project
//! file's directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use vostok::asm::index;

/// A loaded project record.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Project name.
    #[serde(default)]
    pub name: Option<String>,
    /// Root assembly source.
    pub asm_path: PathBuf,
    /// ROM output path (default: source with a `.rom` extension).
    #[serde(default)]
    pub rom_path: Option<PathBuf>,
    /// Debug-index output path (default: derived from the ROM path).
    #[serde(default)]
    pub debug_path: Option<PathBuf>,
    /// Optional settings block.
    #[serde(default)]
    pub settings: Option<Settings>,
}

/// Project settings.
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    /// Whether the emulator should hot-reload a rebuilt ROM.
    #[serde(rename = "RomHotReload", default)]
    pub rom_hot_reload: bool,
}

impl Project {
    /// Loads a project file.
    ///
    /// # Errors
    ///
    /// Errors when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("could not read project {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("could not parse project {}", path.display()))
    }

    /// The project's anchor directory.
    #[must_use]
    pub fn dir(path: &Path) -> PathBuf {
        path.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf)
    }

    /// Resolves the root source path against the anchor.
    #[must_use]
    pub fn asm(&self, dir: &Path) -> PathBuf {
        resolve(dir, &self.asm_path)
    }

    /// Resolves the ROM output path against the anchor.
    #[must_use]
    pub fn rom(&self, dir: &Path) -> PathBuf {
        self.rom_path.as_ref().map_or_else(
            || self.asm(dir).with_extension("rom"),
            |path| resolve(dir, path),
        )
    }

    /// Resolves the debug-index path against the anchor.
    #[must_use]
    pub fn debug(&self, dir: &Path) -> PathBuf {
        self.debug_path.as_ref().map_or_else(
            || index::path_for(&self.rom(dir)),
            |path| resolve(dir, path),
        )
    }
}

fn resolve(dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_derive_from_asm_path() {
        let project: Project =
            serde_json::from_str(r#"{ "name": "demo", "asmPath": "src/main.asm" }"#).unwrap();
        let dir = Path::new("/proj");
        assert_eq!(project.asm(dir), Path::new("/proj/src/main.asm"));
        assert_eq!(project.rom(dir), Path::new("/proj/src/main.rom"));
        assert_eq!(project.debug(dir), Path::new("/proj/src/main.debug.json"));
    }

    #[test]
    fn explicit_paths_and_settings_win() {
        let project: Project = serde_json::from_str(
            r#"{
                "asmPath": "main.asm",
                "romPath": "out/main.rom",
                "settings": { "RomHotReload": true },
                "editor": { "ignored": 1 }
            }"#,
        )
        .unwrap();
        let dir = Path::new("/p");
        assert_eq!(project.rom(dir), Path::new("/p/out/main.rom"));
        assert_eq!(project.debug(dir), Path::new("/p/out/main.debug.json"));
        assert!(project.settings.unwrap().rom_hot_reload);
    }
}
