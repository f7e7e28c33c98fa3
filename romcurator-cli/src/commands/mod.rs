//! CLI command implementations.

pub mod plan;
pub mod write;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use romcurator::candidates::{
    CandidateGenerator, CandidateValidator, IndexedFiles, PatchCandidateGenerator, WriteCandidate,
};
use romcurator::concurrency::DriveScheduler;
use romcurator::config::ConfigFile;
use romcurator::dat::Dat;
use romcurator::output::{GameSubdir, TemplateOutputFormatter};
use romcurator::scanner::FileScanner;
use tracing::info;

use crate::error::CliError;

/// Arguments shared by every curation command.
#[derive(Debug, Clone, Args)]
pub struct CurateArgs {
    /// DAT catalog (JSON)
    #[arg(long)]
    pub dat: PathBuf,

    /// Input files, directories, or globs
    #[arg(long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Patch files, directories, or globs
    #[arg(long, num_args = 1..)]
    pub patch: Vec<String>,

    /// Output directory template, e.g. "roms/{dat}/{region}"
    #[arg(long)]
    pub output: Option<String>,

    /// When to nest ROMs in a directory named after their game
    #[arg(long, value_name = "never|multiple|always")]
    pub game_subdir: Option<GameSubdir>,

    /// Replace existing output files that don't match
    #[arg(long)]
    pub overwrite: bool,

    /// Re-hash written files and check them against the catalog
    #[arg(long)]
    pub test: bool,
}

/// Everything a command needs after candidate resolution.
pub struct Resolved {
    pub dat: Dat,
    pub candidates: Vec<Arc<WriteCandidate>>,
    pub conflicts: Vec<Arc<WriteCandidate>>,
    pub drives: Arc<DriveScheduler>,
}

/// Loads the catalog, scans inputs and patches, and resolves candidates.
pub async fn resolve(args: &CurateArgs, config: &ConfigFile) -> Result<Resolved, CliError> {
    let template = args
        .output
        .clone()
        .or_else(|| config.output.directory.clone())
        .ok_or_else(|| {
            CliError::Config(
                "No output directory specified. Set directory in config.ini [output] section or use --output."
                    .to_string(),
            )
        })?;
    let game_subdir = args.game_subdir.unwrap_or(config.output.game_subdir);

    let dat = Dat::load(&args.dat)?;

    let concurrency = &config.concurrency;
    let drives = Arc::new(
        DriveScheduler::new(concurrency.threads)
            .with_drive_threads(concurrency.drive_threads)
            .with_max_fs_threads(concurrency.max_fs_threads),
    );
    let scanner = FileScanner::new(Arc::clone(&drives)).with_checksums(config.checksums.minimum);

    let files = scanner.scan_files(&args.input).await?;
    let patches = scanner.scan_patches(&args.patch)?;

    let formatter = Arc::new(TemplateOutputFormatter::new(template).with_game_subdir(game_subdir));
    let index = IndexedFiles::from_files(files);
    let candidates = CandidateGenerator::new(formatter).generate(&dat, &index);
    let candidates = PatchCandidateGenerator::generate(&dat, candidates, &patches).candidates();
    let conflicts = CandidateValidator::validate(dat.name(), &candidates);

    info!(
        dat = %dat.name(),
        games = dat.games().len(),
        candidates = candidates.len(),
        conflicts = conflicts.len(),
        "Resolved candidates"
    );

    Ok(Resolved {
        dat,
        candidates,
        conflicts,
        drives,
    })
}
