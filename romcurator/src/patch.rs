//! ROM patches.
//!
//! A patch is identified by the CRC32 of the ROM it applies to. That CRC is
//! taken from the patch's file name, which by convention carries it as an
//! 8-digit hex token next to the name of the patched ROM:
//!
//! ```text
//! Super Game (Translation) 1a2b3c4d.ips   → crc 1a2b3c4d, name "Super Game (Translation)"
//! 1a2b3c4d Super Game Hack.bps            → crc 1a2b3c4d, name "Super Game Hack"
//! ```
//!
//! Decoding patch formats is the job of a [`PatchApplier`].

use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors recognising a patch file.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("No CRC32 found in patch file name: {0}")]
    MissingCrc(String),

    #[error("No ROM name left in patch file name: {0}")]
    MissingRomName(String),

    #[error("Unsupported patch format: {0}")]
    UnknownFormat(String),
}

pub type PatchResult<T> = Result<T, PatchError>;

/// Patch container formats, by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatchFormat {
    Aps,
    Bps,
    Dps,
    Ips,
    Ninja,
    Ppf,
    Ups,
    Vcdiff,
}

impl PatchFormat {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "aps" => Some(Self::Aps),
            "bps" => Some(Self::Bps),
            "dps" => Some(Self::Dps),
            "ips" | "ips32" | "ebp" => Some(Self::Ips),
            "rup" => Some(Self::Ninja),
            "ppf" => Some(Self::Ppf),
            "ups" => Some(Self::Ups),
            "vcdiff" | "xdelta" => Some(Self::Vcdiff),
            _ => None,
        }
    }

    /// Whether `path` has a patch extension.
    pub fn is_patch_path(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
            .is_some()
    }
}

/// A patch file and the ROM it turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    path: PathBuf,
    format: PatchFormat,
    crc_before: String,
    crc_after: Option<String>,
    size_after: Option<u64>,
    rom_name: String,
}

impl Patch {
    pub fn new(
        path: impl Into<PathBuf>,
        format: PatchFormat,
        crc_before: impl Into<String>,
        rom_name: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            format,
            crc_before: crc_before.into().to_ascii_lowercase(),
            crc_after: None,
            size_after: None,
            rom_name: rom_name.into(),
        }
    }

    /// Sets the CRC32 and size of the patched ROM, when the format declares them.
    pub fn with_target(mut self, crc_after: impl Into<String>, size_after: u64) -> Self {
        self.crc_after = Some(crc_after.into().to_ascii_lowercase());
        self.size_after = Some(size_after);
        self
    }

    /// Recognises a patch from its file name.
    pub fn from_path(path: impl Into<PathBuf>) -> PatchResult<Self> {
        let path = path.into();
        let display = path.display().to_string();

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        let format = PatchFormat::from_extension(extension)
            .ok_or_else(|| PatchError::UnknownFormat(display.clone()))?;

        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (crc_before, rom_name) = parse_file_stem(&stem)
            .ok_or_else(|| PatchError::MissingCrc(display.clone()))?;
        if rom_name.is_empty() {
            return Err(PatchError::MissingRomName(display));
        }

        Ok(Self::new(path, format, crc_before, rom_name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> PatchFormat {
        self.format
    }

    /// CRC32 of the ROM this patch applies to.
    pub fn crc_before(&self) -> &str {
        &self.crc_before
    }

    pub fn crc_after(&self) -> Option<&str> {
        self.crc_after.as_deref()
    }

    pub fn size_after(&self) -> Option<u64> {
        self.size_after
    }

    /// Name of the patched ROM, without extension.
    pub fn rom_name(&self) -> &str {
        &self.rom_name
    }
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path.display(), self.crc_before)
    }
}

/// Splits a file stem into its CRC token and the remaining name.
fn parse_file_stem(stem: &str) -> Option<(String, String)> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"(?:^|[\s_\-])[\[(]?([0-9A-Fa-f]{8})[\])]?(?:$|[\s_\-])")
            .expect("valid patch CRC regex")
    });

    let captures = pattern.captures(stem)?;
    let whole = captures.get(0)?;
    let crc = captures[1].to_ascii_lowercase();

    let is_separator = |c: char| c.is_whitespace() || c == '_' || c == '-';
    let before = stem[..whole.start()].trim_end_matches(is_separator);
    let after = stem[whole.end()..].trim_start_matches(is_separator);

    let name = match (before.is_empty(), after.is_empty()) {
        (true, _) => after.to_string(),
        (false, true) => before.to_string(),
        (false, false) => format!("{} {}", before, after),
    };
    Some((crc, name))
}

/// Applies patches to ROM files.
///
/// Implementations decode one or more [`PatchFormat`]s; the writer only
/// hands them an input and an output path.
pub trait PatchApplier: Send + Sync {
    /// Writes the result of applying `patch` to `input` at `output`.
    fn apply<'a>(
        &'a self,
        patch: &'a Patch,
        input: &'a Path,
        output: &'a Path,
    ) -> BoxFuture<'a, io::Result<()>>;
}
