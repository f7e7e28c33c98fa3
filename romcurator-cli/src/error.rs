//! CLI error type.

use std::fmt;

use romcurator::config::ConfigError;
use romcurator::dat::CatalogError;
use romcurator::logging::LoggingError;
use romcurator::scanner::ScanError;

/// Errors that end a CLI run with a non-zero exit code.
#[derive(Debug)]
pub enum CliError {
    /// Configuration file or argument problem.
    Config(String),
    /// Logging could not be set up.
    Logging(LoggingError),
    /// The catalog could not be loaded.
    Catalog(CatalogError),
    /// Input or patch paths could not be expanded.
    Scan(ScanError),
    /// Games in the catalog would overwrite each other's files.
    Conflicts { dat: String, candidates: usize },
    /// Some files could not be written.
    Write { failed: usize },
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Logging(e) => write!(f, "{}", e),
            CliError::Catalog(e) => write!(f, "{}", e),
            CliError::Scan(e) => write!(f, "{}", e),
            CliError::Conflicts { dat, candidates } => write!(
                f,
                "{} candidates in '{}' write to the same output files; nothing was written",
                candidates, dat
            ),
            CliError::Write { failed } => write!(f, "{} files could not be written", failed),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Logging(e) => Some(e),
            CliError::Catalog(e) => Some(e),
            CliError::Scan(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<CatalogError> for CliError {
    fn from(e: CatalogError) -> Self {
        CliError::Catalog(e)
    }
}

impl From<ScanError> for CliError {
    fn from(e: ScanError) -> Self {
        CliError::Scan(e)
    }
}
