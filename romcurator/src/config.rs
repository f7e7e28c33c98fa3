//! Configuration file.
//!
//! Settings are read from an INI file, by default
//! `~/.config/romcurator/config.ini`. A missing file means defaults.
//!
//! ```ini
//! [concurrency]
//! threads = 8
//! writer_threads = 4
//! drive_threads = 8
//! max_fs_threads = 100
//! max_read_write_kilobytes = 716800
//!
//! [output]
//! directory = roms/{dat}
//! game_subdir = multiple
//! overwrite = false
//! test = true
//!
//! [checksums]
//! minimum = crc32
//!
//! [logging]
//! level = info
//! file = /var/log/romcurator.log
//! ```

use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ini::{Ini, Properties};
use thiserror::Error;

use crate::checksum::ChecksumBitmask;
use crate::concurrency::{
    DEFAULT_DRIVE_THREADS, DEFAULT_MAX_FS_THREADS, DEFAULT_MAX_READ_WRITE_KILOBYTES,
    DEFAULT_WRITER_THREADS,
};
use crate::logging::LoggingConfig;
use crate::output::GameSubdir;

/// Default number of concurrent file reads.
pub const DEFAULT_THREADS: usize = 8;

/// Errors loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(String),

    #[error("Invalid value '{value}' for [{section}] {key}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// `[concurrency]` settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrencySettings {
    /// Concurrent file reads across all volumes.
    pub threads: usize,
    /// Candidates written at once.
    pub writer_threads: usize,
    /// Concurrent operations per local volume.
    pub drive_threads: usize,
    /// Operations in flight across all volumes.
    pub max_fs_threads: usize,
    /// Input bytes, in KiB, that writes may hold at once.
    pub max_read_write_kilobytes: u64,
}

impl Default for ConcurrencySettings {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            writer_threads: DEFAULT_WRITER_THREADS,
            drive_threads: DEFAULT_DRIVE_THREADS,
            max_fs_threads: DEFAULT_MAX_FS_THREADS,
            max_read_write_kilobytes: DEFAULT_MAX_READ_WRITE_KILOBYTES,
        }
    }
}

/// `[output]` settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputSettings {
    /// Output directory template.
    pub directory: Option<String>,
    pub game_subdir: GameSubdir,
    pub overwrite: bool,
    pub test: bool,
}

/// `[checksums]` settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ChecksumSettings {
    /// Checksums always computed for input files.
    pub minimum: ChecksumBitmask,
}

impl Default for ChecksumSettings {
    fn default() -> Self {
        Self {
            minimum: ChecksumBitmask::CRC32,
        }
    }
}

/// Contents of the configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub concurrency: ConcurrencySettings,
    pub output: OutputSettings,
    pub checksums: ChecksumSettings,
    pub logging: LoggingConfig,
}

/// Default location of the configuration file.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("romcurator")
        .join("config.ini")
}

impl ConfigFile {
    /// Loads the file at [`config_file_path`].
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&config_file_path())
    }

    /// Loads `path`, or defaults if it doesn't exist.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let config = Self::parse(&contents)?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Parses INI text. Keys that are absent keep their defaults.
    pub fn parse(contents: &str) -> ConfigResult<Self> {
        let ini = Ini::load_from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("concurrency")) {
            let c = &mut config.concurrency;
            read_value(section, "concurrency", "threads", &mut c.threads)?;
            read_value(section, "concurrency", "writer_threads", &mut c.writer_threads)?;
            read_value(section, "concurrency", "drive_threads", &mut c.drive_threads)?;
            read_value(section, "concurrency", "max_fs_threads", &mut c.max_fs_threads)?;
            read_value(
                section,
                "concurrency",
                "max_read_write_kilobytes",
                &mut c.max_read_write_kilobytes,
            )?;
            for (key, value) in [
                ("threads", c.threads),
                ("writer_threads", c.writer_threads),
                ("drive_threads", c.drive_threads),
                ("max_fs_threads", c.max_fs_threads),
            ] {
                if value == 0 {
                    return Err(invalid("concurrency", key, value));
                }
            }
        }

        if let Some(section) = ini.section(Some("output")) {
            let o = &mut config.output;
            if let Some(directory) = section.get("directory").filter(|d| !d.trim().is_empty()) {
                o.directory = Some(directory.trim().to_string());
            }
            read_value(section, "output", "game_subdir", &mut o.game_subdir)?;
            read_bool(section, "output", "overwrite", &mut o.overwrite)?;
            read_bool(section, "output", "test", &mut o.test)?;
        }

        if let Some(section) = ini.section(Some("checksums")) {
            if let Some(value) = section.get("minimum") {
                config.checksums.minimum = ChecksumBitmask::parse_list(value)
                    .map_err(|_| invalid("checksums", "minimum", value))?;
            }
        }

        if let Some(section) = ini.section(Some("logging")) {
            if let Some(level) = section.get("level").filter(|l| !l.trim().is_empty()) {
                config.logging.level = level.trim().to_string();
            }
            if let Some(file) = section.get("file").filter(|f| !f.trim().is_empty()) {
                config.logging.file = Some(PathBuf::from(file.trim()));
            }
        }

        Ok(config)
    }

    pub fn with_concurrency(mut self, concurrency: ConcurrencySettings) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_output(mut self, output: OutputSettings) -> Self {
        self.output = output;
        self
    }

    pub fn with_checksums(mut self, checksums: ChecksumSettings) -> Self {
        self.checksums = checksums;
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }
}

fn invalid(section: &str, key: &str, value: impl Display) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn read_value<T: FromStr>(
    properties: &Properties,
    section: &str,
    key: &str,
    target: &mut T,
) -> ConfigResult<()> {
    if let Some(value) = properties.get(key) {
        *target = value
            .trim()
            .parse()
            .map_err(|_| invalid(section, key, value))?;
    }
    Ok(())
}

fn read_bool(properties: &Properties, section: &str, key: &str, target: &mut bool) -> ConfigResult<()> {
    if let Some(value) = properties.get(key) {
        *target = match value.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => true,
            "false" | "no" | "off" | "0" => false,
            _ => return Err(invalid(section, key, value)),
        };
    }
    Ok(())
}
