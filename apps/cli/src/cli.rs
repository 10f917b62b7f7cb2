//! Command-line interface.

use std::path::PathBuf;

use clap::Parser;

/// Assembles an 8080 project.
#[derive(Debug, Parser)]
#[command(name = "vostok", version, about)]
pub struct Cli {
    /// Project file to assemble.
    #[arg(value_name = "PROJECT")]
    pub project: PathBuf,

    /// Logging filter (overrides `RUST_LOG`).
    #[arg(short, long)]
    pub log: Option<String>,
}
