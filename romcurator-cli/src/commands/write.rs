//! `copy`, `move`, and `link` commands.

use std::sync::Arc;

use romcurator::concurrency::{FileMoveTracker, WriteCoordinator};
use romcurator::config::ConfigFile;
use romcurator::writer::{CandidateWriter, WriteMode, WriterOptions};

use super::{resolve, CurateArgs};
use crate::error::CliError;

pub async fn run(mode: WriteMode, args: CurateArgs, config: &ConfigFile) -> Result<(), CliError> {
    let resolved = resolve(&args, config).await?;

    if !resolved.conflicts.is_empty() {
        for candidate in &resolved.conflicts {
            eprintln!("  conflict: {}", candidate.name());
        }
        return Err(CliError::Conflicts {
            dat: resolved.dat.name().to_string(),
            candidates: resolved.conflicts.len(),
        });
    }

    let concurrency = &config.concurrency;
    let coordinator = WriteCoordinator::with_max_kilobytes(
        concurrency.writer_threads,
        concurrency.max_read_write_kilobytes,
    );
    let options = WriterOptions::new(mode)
        .with_overwrite(args.overwrite || config.output.overwrite)
        .with_test(args.test || config.output.test);

    let writer = CandidateWriter::new(
        options,
        Arc::new(coordinator),
        resolved.drives,
        Arc::new(FileMoveTracker::new()),
    );
    let report = writer.write(&resolved.dat, resolved.candidates).await;

    println!(
        "{}: {} written, {} skipped, {} failed",
        mode,
        report.written,
        report.skipped,
        report.failed()
    );
    for failure in &report.failures {
        eprintln!("  {} ({}): {}", failure.candidate, failure.output.display(), failure.error);
    }

    if report.is_success() {
        Ok(())
    } else {
        Err(CliError::Write {
            failed: report.failed(),
        })
    }
}
