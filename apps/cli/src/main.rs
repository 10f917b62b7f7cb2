#![warn(clippy::pedantic)]

use std::fs;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use vostok::asm::Assembler;

use crate::cli::Cli;
use crate::proj::Project;

mod cli;
mod proj;

/// Exit code for a failed assembly.
const EXIT_FAILURE: u8 = 2;

fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(err) = setup(&args) {
        eprintln!("vostok: {err:#}");
        return ExitCode::from(EXIT_FAILURE);
    }
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

/// Initializes the logger.
fn setup(args: &Cli) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .parse(args.log.clone().unwrap_or_else(|| {
            std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default()
        }))
        .context("could not parse logging filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn run(args: &Cli) -> Result<()> {
    // Load the project record
    let project = Project::load(&args.project)?;
    let dir = Project::dir(&args.project);
    debug!("project: {project:?}");

    // Resolve paths; diagnostics want the absolute source path
    let asm = fs::canonicalize(project.asm(&dir)).with_context(|| {
        format!("could not find source {}", project.asm(&dir).display())
    })?;
    let rom = project.rom(&dir);
    let index = project.debug(&dir);

    // Assemble
    let out = Assembler::new()
        .project_dir(fs::canonicalize(&dir).unwrap_or(dir))
        .assemble_file(&asm)
        .map_err(|report| anyhow::anyhow!("{report}"))?;
    for notice in &out.notices {
        eprintln!("{notice}");
    }
    for line in &out.prints {
        println!("{line}");
    }

    // Write the artefacts; the index only exists on success
    fs::write(&rom, &out.rom)
        .with_context(|| format!("could not write ROM {}", rom.display()))?;
    out.index
        .write(&index)
        .with_context(|| format!("could not write debug index {}", index.display()))?;

    info!(
        "{}: {} bytes at {:#06x} -> {}",
        project.name.as_deref().unwrap_or("project"),
        out.rom.len(),
        out.base,
        rom.display()
    );
    Ok(())
}
