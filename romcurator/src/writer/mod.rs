//! Writes candidates to disk.
//!
//! The writer is the consumer of the coordination primitives: every
//! candidate is admitted by the [`WriteCoordinator`], every input read is
//! throttled by the [`DriveScheduler`], and moved inputs are tracked by the
//! [`FileMoveTracker`] so later candidates sharing an input can still find it.

mod error;
mod fs;

pub use error::{WriteError, WriteResult};

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::candidates::{RomWithFiles, WriteCandidate};
use crate::concurrency::{path_key, DriveScheduler, FileMoveTracker, WriteCoordinator};
use crate::dat::Dat;
use crate::file::DiscoveredFile;
use crate::patch::{Patch, PatchApplier};

/// How input files become output files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    #[default]
    Copy,
    Move,
    /// Hard link.
    Link,
}

impl FromStr for WriteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "copy" => Ok(Self::Copy),
            "move" => Ok(Self::Move),
            "link" => Ok(Self::Link),
            other => Err(format!("unknown write mode '{}'", other)),
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Copy => "copy",
            Self::Move => "move",
            Self::Link => "link",
        };
        f.write_str(name)
    }
}

/// Options for a [`CandidateWriter`].
#[derive(Debug, Clone, Default)]
pub struct WriterOptions {
    pub mode: WriteMode,
    /// Replace existing output files that don't already match.
    pub overwrite: bool,
    /// Re-hash every written file and compare it against the catalog.
    pub test: bool,
}

impl WriterOptions {
    pub fn new(mode: WriteMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_test(mut self, test: bool) -> Self {
        self.test = test;
        self
    }
}

/// A file that could not be written.
#[derive(Debug)]
pub struct WriteFailure {
    pub candidate: String,
    pub output: PathBuf,
    pub error: WriteError,
}

/// Summary of a [`CandidateWriter::write`] run.
#[derive(Debug, Default)]
pub struct WriteReport {
    pub written: usize,
    pub skipped: usize,
    pub failures: Vec<WriteFailure>,
}

impl WriteReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOutcome {
    Written,
    Skipped,
}

type PatchStep<'a> = Option<(&'a Patch, &'a dyn PatchApplier)>;

/// Writes [`WriteCandidate`]s to their output paths.
pub struct CandidateWriter {
    options: WriterOptions,
    coordinator: Arc<WriteCoordinator>,
    drives: Arc<DriveScheduler>,
    moves: Arc<FileMoveTracker>,
    patch_applier: Option<Arc<dyn PatchApplier>>,
}

impl CandidateWriter {
    pub fn new(
        options: WriterOptions,
        coordinator: Arc<WriteCoordinator>,
        drives: Arc<DriveScheduler>,
        moves: Arc<FileMoveTracker>,
    ) -> Self {
        Self {
            options,
            coordinator,
            drives,
            moves,
            patch_applier: None,
        }
    }

    pub fn with_patch_applier(mut self, applier: Arc<dyn PatchApplier>) -> Self {
        self.patch_applier = Some(applier);
        self
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// Writes every candidate of `dat`.
    ///
    /// Failures don't stop the run; they are logged and collected in the
    /// report.
    pub async fn write(&self, dat: &Dat, candidates: Vec<Arc<WriteCandidate>>) -> WriteReport {
        info!(
            dat = %dat.name(),
            candidates = candidates.len(),
            mode = %self.options.mode,
            "Writing candidates"
        );

        let outcomes = self
            .coordinator
            .map(candidates, |candidate| async move {
                let results = self.write_candidate(&candidate).await;
                (candidate, results)
            })
            .await;

        let mut report = WriteReport::default();
        for (candidate, results) in outcomes {
            for (output, result) in results {
                match result {
                    Ok(FileOutcome::Written) => report.written += 1,
                    Ok(FileOutcome::Skipped) => report.skipped += 1,
                    Err(e) => {
                        error!(
                            dat = %dat.name(),
                            game = %candidate.name(),
                            output_path = %output.display(),
                            error = %e,
                            "Failed to write file"
                        );
                        report.failures.push(WriteFailure {
                            candidate: candidate.name().to_string(),
                            output,
                            error: e,
                        });
                    }
                }
            }
        }

        info!(
            dat = %dat.name(),
            written = report.written,
            skipped = report.skipped,
            failed = report.failed(),
            "Finished writing candidates"
        );
        report
    }

    async fn write_candidate(
        &self,
        candidate: &WriteCandidate,
    ) -> Vec<(PathBuf, WriteResult<FileOutcome>)> {
        let mut seen = HashSet::new();
        let mut results = Vec::new();

        for pair in candidate.roms_with_files() {
            if !seen.insert(path_key(pair.output().path())) {
                continue;
            }
            let result = self.write_file(candidate, pair).await;
            results.push((pair.output().path().to_path_buf(), result));
        }
        results
    }

    async fn write_file(&self, candidate: &WriteCandidate, pair: &RomWithFiles) -> WriteResult<FileOutcome> {
        let input = pair.input();
        let output = pair.output();
        let output_path = output.path();

        if input.is_archive_entry() {
            return Err(WriteError::ArchiveEntryUnsupported(input.to_string()));
        }
        let patch: PatchStep<'_> = match (input.patch(), &self.patch_applier) {
            (None, _) => None,
            (Some(patch), Some(applier)) => Some((patch.as_ref(), applier.as_ref())),
            (Some(_), None) => return Err(WriteError::NoPatchApplier(input.to_string())),
        };

        if patch.is_none() && path_key(input.path()) == path_key(output_path) {
            let moved_away =
                self.options.mode == WriteMode::Move && self.moves.was_moved(input.path()).await;
            if !moved_away {
                debug!(game = %candidate.name(), output_path = %output_path.display(), "Input is already the output");
                return Ok(FileOutcome::Skipped);
            }
        }

        if tokio::fs::try_exists(output_path).await.unwrap_or(false) {
            if self.is_up_to_date(output_path, output).await {
                debug!(game = %candidate.name(), output_path = %output_path.display(), "Output already up to date");
                return Ok(FileOutcome::Skipped);
            }
            if !self.options.overwrite {
                debug!(game = %candidate.name(), output_path = %output_path.display(), "Output exists, not overwriting");
                return Ok(FileOutcome::Skipped);
            }
        }

        match self.options.mode {
            WriteMode::Copy => self.copy_input(input, output_path, patch).await?,
            WriteMode::Link if patch.is_some() => self.copy_input(input, output_path, patch).await?,
            WriteMode::Link => {
                self.drives
                    .run_exclusive(input.path(), || fs::link_file(input.path(), output_path))
                    .await?
            }
            WriteMode::Move => self.move_input(input, output_path, patch).await?,
        }

        if self.options.test {
            if let Some(reason) = fs::check_file(output_path, output).await? {
                return Err(WriteError::VerificationFailed {
                    path: output_path.to_path_buf(),
                    reason,
                });
            }
        }

        debug!(
            game = %candidate.name(),
            input = %input,
            output_path = %output_path.display(),
            mode = %self.options.mode,
            "Wrote file"
        );
        Ok(FileOutcome::Written)
    }

    async fn is_up_to_date(&self, path: &Path, expected: &DiscoveredFile) -> bool {
        if expected.crc32().is_none() {
            return false;
        }
        matches!(fs::check_file(path, expected).await, Ok(None))
    }

    async fn copy_input(&self, input: &DiscoveredFile, output_path: &Path, patch: PatchStep<'_>) -> WriteResult<()> {
        self.drives
            .run_exclusive(input.path(), || fs::copy_file(input.path(), output_path, patch))
            .await
    }

    /// Moves `input` to `output_path`, or copies it from wherever an
    /// earlier move put it. Patched inputs are always copied since the
    /// unpatched file is still needed.
    async fn move_input(&self, input: &DiscoveredFile, output_path: &Path, patch: PatchStep<'_>) -> WriteResult<()> {
        self.moves
            .move_file(input.path(), |previous| async move {
                match previous {
                    Some(moved) if path_key(&moved) == path_key(output_path) => (Ok(()), None),
                    Some(moved) => {
                        let result = self
                            .drives
                            .run_exclusive(&moved, || fs::copy_file(&moved, output_path, patch))
                            .await;
                        (result, None)
                    }
                    None if patch.is_some() => (self.copy_input(input, output_path, patch).await, None),
                    None => {
                        let result = self
                            .drives
                            .run_exclusive(input.path(), || fs::move_file(input.path(), output_path))
                            .await;
                        let moved_to = result.is_ok().then(|| output_path.to_path_buf());
                        (result, moved_to)
                    }
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_mode_parse() {
        assert_eq!("copy".parse::<WriteMode>().unwrap(), WriteMode::Copy);
        assert_eq!("MOVE".parse::<WriteMode>().unwrap(), WriteMode::Move);
        assert_eq!("link".parse::<WriteMode>().unwrap(), WriteMode::Link);
        assert!("symlink".parse::<WriteMode>().is_err());
        assert_eq!(WriteMode::Move.to_string(), "move");
    }

    #[test]
    fn test_options_builder() {
        let options = WriterOptions::new(WriteMode::Link)
            .with_overwrite(true)
            .with_test(true);
        assert_eq!(options.mode, WriteMode::Link);
        assert!(options.overwrite);
        assert!(options.test);
        assert!(!WriterOptions::default().overwrite);
    }

    #[test]
    fn test_report_counts() {
        let mut report = WriteReport::default();
        assert!(report.is_success());
        report.failures.push(WriteFailure {
            candidate: "Game".to_string(),
            output: PathBuf::from("out/game.rom"),
            error: WriteError::NoPatchApplier("in/game.rom".to_string()),
        });
        assert_eq!(report.failed(), 1);
        assert!(!report.is_success());
    }
}
