//! Debug index.
//!
//! The side-car record emitted next to the ROM. It maps every source
//! artefact (labels, constants, macros, lines, data spans) back to machine
//! addresses so a debugger can correlate machine state with source.
//! Addresses serialize as `0x` + 4 uppercase hex digits; file keys are
//! basenames unless a project directory anchors relative paths.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::expand::Item;
use crate::pass::Emit;
use crate::sym::Symbols;

/// A label entry.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct LabelEntry {
    /// Address, as `0xHHHH`.
    pub addr: String,
    /// Originating file key.
    pub src: String,
    /// 1-based source line.
    pub line: u32,
}

/// A constant entry.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ConstEntry {
    /// Constant value, as `0xHHHH`.
    pub value: String,
    /// Originating file key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    /// 1-based source line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// A macro entry.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MacroEntry {
    /// Originating file key.
    pub src: String,
    /// 1-based source line of the `.macro` header.
    pub line: u32,
    /// Parameter names.
    pub params: Vec<String>,
}

/// Addresses contributed by one source line.
///
/// A single address for plain lines; an array when macro or loop replays
/// emit the line more than once.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Addrs {
    /// The line maps to one address.
    One(String),
    /// The line maps to several addresses, in emission order.
    Many(Vec<String>),
}

/// A `DB`/`DS` span entry.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct DataEntry {
    /// First address of the span, as `0xHHHH`.
    pub start: String,
    /// Span length in bytes.
    #[serde(rename = "byteLength")]
    pub byte_length: u16,
    /// Element width in bytes.
    #[serde(rename = "unitBytes")]
    pub unit_bytes: u16,
}

/// A persisted breakpoint.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct BreakpointEntry {
    /// 1-based source line.
    pub line: u32,
    /// Whether the breakpoint is active.
    pub enabled: bool,
    /// Label the breakpoint was set on, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Resolved address, as `0xHHHH`, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,
}

/// The debug index record.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct DebugIndex {
    /// Global and local labels by (unique) name.
    pub labels: IndexMap<String, LabelEntry>,
    /// Constants by name.
    pub consts: IndexMap<String, ConstEntry>,
    /// Macros by name.
    pub macros: IndexMap<String, MacroEntry>,
    /// Per file, per 1-based line: the addresses the line contributes to.
    #[serde(rename = "lineAddresses")]
    pub line_addresses: IndexMap<String, IndexMap<String, Addrs>>,
    /// Per file, per 1-based line: `DB`/`DS` span extents.
    #[serde(rename = "dataLines")]
    pub data_lines: IndexMap<String, IndexMap<String, DataEntry>>,
    /// Persisted breakpoints, by file basename.
    #[serde(skip_serializing_if = "IndexMap::is_empty", default)]
    pub breakpoints: IndexMap<String, Vec<BreakpointEntry>>,
    /// Anchor for relative file keys.
    #[serde(rename = "projectDir", skip_serializing_if = "Option::is_none")]
    pub project_dir: Option<String>,
}

impl DebugIndex {
    /// Builds the index from the assembled artefacts.
    pub(crate) fn build(
        items: &[Item],
        syms: &Symbols,
        emit: &Emit,
        project_dir: Option<&Path>,
        breakpoints: IndexMap<String, Vec<BreakpointEntry>>,
    ) -> Self {
        let mut index = Self {
            breakpoints,
            project_dir: project_dir.map(|p| p.display().to_string()),
            ..Self::default()
        };

        for (name, label) in &syms.labels {
            index.labels.insert(
                name.clone(),
                LabelEntry {
                    addr: hex(label.addr),
                    src: file_key(&label.origin.file, project_dir),
                    line: label.origin.line,
                },
            );
        }
        for local in &syms.locals {
            index.labels.insert(
                local.index_name(),
                LabelEntry {
                    addr: hex(local.addr),
                    src: file_key(&local.origin.file, project_dir),
                    line: local.origin.line,
                },
            );
        }
        for (name, constant) in &syms.consts {
            index.consts.insert(
                name.clone(),
                ConstEntry {
                    value: hex(constant.value),
                    src: Some(file_key(&constant.origin.file, project_dir)),
                    line: Some(constant.origin.line),
                },
            );
        }
        for (name, def) in &syms.macros {
            index.macros.insert(
                name.clone(),
                MacroEntry {
                    src: file_key(&def.origin.file, project_dir),
                    line: def.origin.line,
                    params: def.params.clone(),
                },
            );
        }

        for line in &emit.lines {
            let origin = &items[line.item].src.origin;
            let file = index
                .line_addresses
                .entry(file_key(&origin.file, project_dir))
                .or_default();
            match file.entry(origin.line.to_string()).or_insert_with(|| Addrs::Many(Vec::new())) {
                Addrs::Many(list) => list.push(hex(line.addr)),
                Addrs::One(_) => unreachable!("collapsed before serialization"),
            }
        }
        // Collapse single-address lines to the scalar form
        for file in index.line_addresses.values_mut() {
            for addrs in file.values_mut() {
                if let Addrs::Many(list) = addrs {
                    if list.len() == 1 {
                        *addrs = Addrs::One(list.remove(0));
                    }
                }
            }
        }

        for data in &emit.data {
            let origin = &items[data.item].src.origin;
            index
                .data_lines
                .entry(file_key(&origin.file, project_dir))
                .or_default()
                .entry(origin.line.to_string())
                .or_insert(DataEntry {
                    start: hex(data.start),
                    byte_length: data.bytes,
                    unit_bytes: data.unit,
                });
        }

        index
    }

    /// Writes the index as JSON.
    ///
    /// # Errors
    ///
    /// Errors when the file cannot be created or written.
    pub fn write(&self, path: &Path) -> io::Result<()> {
        let file = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(file, self).map_err(io::Error::from)
    }
}

/// Formats an address per the external contract.
#[must_use]
pub fn hex(addr: u16) -> String {
    format!("0x{addr:04X}")
}

/// Derives the debug-index path adjacent to a ROM path.
#[must_use]
pub fn path_for(rom: &Path) -> PathBuf {
    rom.with_extension("debug.json")
}

/// Computes a file key: relative to the project directory when anchored,
/// the file's basename otherwise.
#[must_use]
pub fn file_key(file: &Path, project_dir: Option<&Path>) -> String {
    if let Some(dir) = project_dir {
        if let Ok(rel) = file.strip_prefix(dir) {
            return rel.display().to_string();
        }
    }
    file.file_name()
        .map_or_else(|| file.display().to_string(), |n| n.to_string_lossy().into_owned())
}
