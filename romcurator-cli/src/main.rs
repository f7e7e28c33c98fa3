//! romcurator CLI - Command-line interface
//!
//! Matches input files against a DAT catalog and copies, moves, or links
//! every complete game into an output directory.

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use romcurator::config::ConfigFile;
use romcurator::logging::init_logging;
use romcurator::writer::WriteMode;

use commands::CurateArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "romcurator", version, about = "Curate ROM collections against DAT catalogs")]
struct Cli {
    /// Config file (default: ~/.config/romcurator/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show what would be written, and any output conflicts
    Plan(CurateArgs),
    /// Copy matched files to the output
    Copy(CurateArgs),
    /// Move matched files to the output
    Move(CurateArgs),
    /// Hard link matched files into the output
    Link(CurateArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = match &cli.config {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    let _logging = init_logging(&config.logging)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Config(format!("failed to start runtime: {}", e)))?;

    runtime.block_on(async {
        match cli.command {
            Commands::Plan(args) => commands::plan::run(args, &config).await,
            Commands::Copy(args) => commands::write::run(WriteMode::Copy, args, &config).await,
            Commands::Move(args) => commands::write::run(WriteMode::Move, args, &config).await,
            Commands::Link(args) => commands::write::run(WriteMode::Link, args, &config).await,
        }
    })
}
