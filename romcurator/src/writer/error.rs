use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::checksum::ChecksumError;

/// Errors writing a single output file.
#[derive(Debug, Error)]
pub enum WriteError {
    /// A filesystem operation failed.
    #[error("Failed to {action} {} -> {}: {source}", from.display(), to.display())]
    Io {
        action: &'static str,
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The input lives inside an archive, which this writer can't extract.
    #[error("Cannot write archive member {0}: archive extraction is not supported")]
    ArchiveEntryUnsupported(String),

    /// The input needs a patch applied but no applier was configured.
    #[error("No patch applier configured for patched input {0}")]
    NoPatchApplier(String),

    /// The written file doesn't match what the catalog expects.
    #[error("Written file {} failed verification: {reason}", path.display())]
    VerificationFailed { path: PathBuf, reason: String },

    /// Hashing the written file failed.
    #[error(transparent)]
    Checksum(#[from] ChecksumError),
}

pub type WriteResult<T> = Result<T, WriteError>;

impl WriteError {
    pub(crate) fn io(
        action: &'static str,
        from: impl Into<PathBuf>,
        to: impl Into<PathBuf>,
        source: io::Error,
    ) -> Self {
        Self::Io {
            action,
            from: from.into(),
            to: to.into(),
            source,
        }
    }
}
