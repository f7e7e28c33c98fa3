//! Discovered files.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::checksum::{hash_file_async, ChecksumBitmask, ChecksumResult, Checksums};
use crate::concurrency::DrivePath;
use crate::patch::Patch;

/// A file found on disk, or a member of an archive on disk.
///
/// Immutable once built; share it as `Arc<DiscoveredFile>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    path: PathBuf,
    /// Member path inside the archive at `path`.
    entry_path: Option<PathBuf>,
    size: u64,
    checksums: Checksums,
    patch: Option<Arc<Patch>>,
}

impl DiscoveredFile {
    pub fn new(path: impl Into<PathBuf>, size: u64, checksums: Checksums) -> Self {
        Self {
            path: path.into(),
            entry_path: None,
            size,
            checksums,
            patch: None,
        }
    }

    /// A member of the archive at `archive`.
    pub fn archive_entry(
        archive: impl Into<PathBuf>,
        entry_path: impl Into<PathBuf>,
        size: u64,
        checksums: Checksums,
    ) -> Self {
        Self {
            entry_path: Some(entry_path.into()),
            ..Self::new(archive, size, checksums)
        }
    }

    /// Stats and hashes a file on disk.
    pub async fn from_path(path: impl Into<PathBuf>, bitmask: ChecksumBitmask) -> ChecksumResult<Self> {
        let path = path.into();
        let (checksums, size) = hash_file_async(path.clone(), bitmask).await?;
        Ok(Self::new(path, size, checksums))
    }

    /// A copy of this file that will have `patch` applied when written.
    pub fn with_patch(&self, patch: Arc<Patch>) -> Self {
        Self {
            patch: Some(patch),
            ..self.clone()
        }
    }

    /// A copy at a different path.
    pub fn with_path(&self, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..self.clone()
        }
    }

    /// A copy with a different size and checksums.
    pub fn with_contents(&self, size: u64, checksums: Checksums) -> Self {
        Self {
            size,
            checksums,
            ..self.clone()
        }
    }

    /// Path on disk; the archive's path for archive members.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry_path(&self) -> Option<&Path> {
        self.entry_path.as_deref()
    }

    pub fn is_archive_entry(&self) -> bool {
        self.entry_path.is_some()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn checksums(&self) -> &Checksums {
        &self.checksums
    }

    pub fn crc32(&self) -> Option<&str> {
        self.checksums.crc32.as_deref()
    }

    pub fn patch(&self) -> Option<&Arc<Patch>> {
        self.patch.as_ref()
    }

    /// The file name of the member, or of the file itself.
    pub fn file_name(&self) -> Option<&std::ffi::OsStr> {
        self.entry_path
            .as_deref()
            .unwrap_or(&self.path)
            .file_name()
    }
}

impl DrivePath for DiscoveredFile {
    fn drive_path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for DiscoveredFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.entry_path {
            Some(entry) => write!(f, "{}|{}", self.path.display(), entry.display()),
            None => write!(f, "{}", self.path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_display_includes_archive_entry() {
        let raw = DiscoveredFile::new("roms/a.rom", 4, Checksums::default());
        assert_eq!(raw.to_string(), "roms/a.rom");

        let member = DiscoveredFile::archive_entry("roms/a.zip", "a.rom", 4, Checksums::default());
        assert_eq!(member.to_string(), "roms/a.zip|a.rom");
        assert!(member.is_archive_entry());
        assert_eq!(member.file_name().unwrap(), "a.rom");
    }

    #[test]
    fn test_with_path_keeps_contents() {
        let file = DiscoveredFile::new("a.rom", 4, Checksums::from_crc32("aabbccdd"));
        let moved = file.with_path("b.rom");
        assert_eq!(moved.path(), Path::new("b.rom"));
        assert_eq!(moved.crc32(), Some("aabbccdd"));
        assert_eq!(moved.size(), 4);
    }

    #[tokio::test]
    async fn test_from_path_hashes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"123456789").unwrap();

        let discovered = DiscoveredFile::from_path(file.path(), ChecksumBitmask::CRC32)
            .await
            .unwrap();
        assert_eq!(discovered.size(), 9);
        assert_eq!(discovered.crc32(), Some("cbf43926"));
        assert!(discovered.patch().is_none());
    }
}
