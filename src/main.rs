//! Binary entry point for dataset.
//!
//! This binary provides the CLI interface for the dataset import engine.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use dataset::cli::{self, CheckArgs, CommandContext, CountArgs, ImportArgs, PurgeArgs};
use dataset::config::DatasetSettings;
use dataset::observability;
use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

/// Dataset - resumable bulk import and purge of tabular and XML sources.
#[derive(Parser)]
#[command(name = "dataset")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the settings file.
    #[arg(short, long, global = true)]
    settings: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Import a source, resuming an unfinished task.
    Import(ImportArgs),

    /// Delete every entity of a dataset.
    Purge(PurgeArgs),

    /// Count the records of a source.
    Count(CountArgs),

    /// Validate an import configuration.
    Check(CheckArgs),
}

impl Commands {
    const fn time_budget(&self) -> Option<u64> {
        match self {
            Self::Import(args) => args.time_budget,
            Self::Purge(args) => args.time_budget,
            Self::Count(_) | Self::Check(_) => None,
        }
    }
}

/// Main entry point.
fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_settings(cli.settings.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load settings: {e:#}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = observability::init_from_settings(&settings.logging, cli.verbose) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli, settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
fn run_command(cli: Cli, settings: DatasetSettings) -> anyhow::Result<()> {
    let context = CommandContext::open(settings, cli.command.time_budget())
        .context("failed to open the content store")?;

    let active = context.scheduler.active_flag();
    ctrlc::set_handler(move || {
        tracing::warn!("Interrupted, suspending after the current record");
        active.store(false, Ordering::Release);
    })
    .context("failed to install the Ctrl-C handler")?;

    match cli.command {
        Commands::Import(args) => {
            cli::import::execute(&context, &args)?;
        },
        Commands::Purge(args) => {
            cli::purge::execute(&context, &args)?;
        },
        Commands::Count(args) => {
            cli::count::execute(&context, &args)?;
        },
        Commands::Check(args) => {
            cli::check::execute(&context, &args)?;
        },
    }
    Ok(())
}

/// Loads settings.
fn load_settings(path: Option<&str>) -> anyhow::Result<DatasetSettings> {
    if let Some(path) = cli::settings_path(path) {
        return DatasetSettings::load_from_file(&path)
            .with_context(|| format!("reading {}", path.display()));
    }

    if let Ok(path) = std::env::var(dataset::config::CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return DatasetSettings::load_from_file(Path::new(&path))
                .with_context(|| format!("reading {path}"));
        }
    }

    Ok(DatasetSettings::load_default())
}
