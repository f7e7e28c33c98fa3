//! Logging setup.
//!
//! Logs go to stderr and, when a file is configured, to that file through a
//! non-blocking writer. `RUST_LOG` overrides the configured level.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Errors installing the global subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log level or filter: {0}")]
    InvalidFilter(String),

    #[error("Failed to create log directory {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to install logger: {0}")]
    Init(String),
}

pub type LoggingResult<T> = Result<T, LoggingError>;

/// `[logging]` settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Level or `EnvFilter` directive, e.g. `info` or `romcurator=debug`.
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }
}

/// Keeps the file writer flushing. Hold it until the program exits.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Installs the global subscriber.
pub fn init_logging(config: &LoggingConfig) -> LoggingResult<LoggingGuard> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(&config.level)?,
    };

    let console = fmt::layer().with_target(false).with_writer(io::stderr);

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let (directory, file_name) = split_log_path(path);
            std::fs::create_dir_all(&directory).map_err(|source| LoggingError::Io {
                path: directory.clone(),
                source,
            })?;
            let appender = tracing_appender::rolling::never(&directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    tracing::debug!(
        level = %config.level,
        file = ?config.file,
        "Logging initialized"
    );

    Ok(LoggingGuard { _file: guard })
}

fn build_filter(level: &str) -> LoggingResult<EnvFilter> {
    EnvFilter::try_new(level).map_err(|_| LoggingError::InvalidFilter(level.to_string()))
}

fn split_log_path(path: &Path) -> (PathBuf, PathBuf) {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("romcurator.log"));
    (directory, file_name)
}
