//! Input discovery.
//!
//! Expands input globs into files on disk and hashes them. Hashing goes
//! through the [`DriveScheduler`] so each volume sees a bounded number of
//! readers.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::checksum::ChecksumBitmask;
use crate::concurrency::DriveScheduler;
use crate::file::DiscoveredFile;
use crate::patch::{Patch, PatchFormat};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Invalid path pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },
}

pub type ScanResult<T> = Result<T, ScanError>;

/// Finds and hashes input files.
pub struct FileScanner {
    drives: Arc<DriveScheduler>,
    bitmask: ChecksumBitmask,
}

impl FileScanner {
    pub fn new(drives: Arc<DriveScheduler>) -> Self {
        Self {
            drives,
            bitmask: ChecksumBitmask::CRC32,
        }
    }

    /// Checksums to compute for every file. CRC32 is always included.
    pub fn with_checksums(mut self, bitmask: ChecksumBitmask) -> Self {
        self.bitmask = bitmask | ChecksumBitmask::CRC32;
        self
    }

    /// Files matching any of `patterns`, sorted and without duplicates.
    ///
    /// A pattern naming a directory matches every file beneath it.
    pub fn expand(&self, patterns: &[String]) -> ScanResult<Vec<PathBuf>> {
        let mut paths = BTreeSet::new();

        for pattern in patterns {
            let expanded = if Path::new(pattern).is_dir() {
                format!("{}/**/*", glob::Pattern::escape(pattern.trim_end_matches(['/', '\\'])))
            } else {
                pattern.clone()
            };

            let entries = glob::glob(&expanded).map_err(|e| ScanError::Pattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;

            let before = paths.len();
            for entry in entries {
                match entry {
                    Ok(path) if path.is_file() => {
                        paths.insert(path);
                    }
                    Ok(_) => {}
                    Err(e) => warn!(pattern = %pattern, error = %e, "Skipping unreadable path"),
                }
            }
            debug!(pattern = %pattern, files = paths.len() - before, "Expanded path pattern");
        }

        Ok(paths.into_iter().collect())
    }

    /// Hashes every file matching `patterns`.
    ///
    /// Files that can't be read are logged and left out.
    pub async fn scan_files(&self, patterns: &[String]) -> ScanResult<Vec<Arc<DiscoveredFile>>> {
        let paths = self.expand(patterns)?;
        let total = paths.len();
        let bitmask = self.bitmask;

        let results = self
            .drives
            .map(paths, |path| async move {
                let result = DiscoveredFile::from_path(path.clone(), bitmask).await;
                (path, result)
            })
            .await;

        let mut files = Vec::with_capacity(total);
        for (path, result) in results {
            match result {
                Ok(file) => files.push(Arc::new(file)),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to hash file"),
            }
        }

        info!(found = total, hashed = files.len(), checksums = %bitmask, "Scanned input files");
        Ok(files)
    }

    /// Recognises every patch file matching `patterns`.
    ///
    /// Files that aren't patches, or whose names carry no CRC32, are
    /// logged and left out.
    pub fn scan_patches(&self, patterns: &[String]) -> ScanResult<Vec<Arc<Patch>>> {
        let mut patches = Vec::new();

        for path in self.expand(patterns)? {
            if !PatchFormat::is_patch_path(&path) {
                continue;
            }
            match Patch::from_path(&path) {
                Ok(patch) => patches.push(Arc::new(patch)),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping patch"),
            }
        }

        info!(patches = patches.len(), "Scanned patch files");
        Ok(patches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::MountPoint;
    use tempfile::TempDir;

    fn scanner() -> FileScanner {
        let drives = DriveScheduler::new(4).with_mount_points(vec![MountPoint::local("/")]);
        FileScanner::new(Arc::new(drives))
    }

    fn write(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_expand_directory_recurses() {
        let dir = TempDir::new().unwrap();
        let a = write(dir.path(), "a.rom", b"a");
        let b = write(dir.path(), "sub/b.rom", b"b");

        let paths = scanner()
            .expand(&[dir.path().display().to_string()])
            .unwrap();
        assert_eq!(paths, vec![a, b]);
    }

    #[test]
    fn test_expand_glob_deduplicates() {
        let dir = TempDir::new().unwrap();
        let a = write(dir.path(), "a.rom", b"a");
        write(dir.path(), "notes.txt", b"x");

        let rom_glob = format!("{}/*.rom", dir.path().display());
        let paths = scanner().expand(&[rom_glob.clone(), rom_glob]).unwrap();
        assert_eq!(paths, vec![a]);
    }

    #[test]
    fn test_invalid_pattern() {
        let err = scanner().expand(&["[".to_string()]).unwrap_err();
        assert!(matches!(err, ScanError::Pattern { .. }));
    }

    #[tokio::test]
    async fn test_scan_files_hashes() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "check.rom", b"123456789");

        let files = scanner()
            .scan_files(&[dir.path().display().to_string()])
            .await
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].size(), 9);
        assert_eq!(files[0].crc32(), Some("cbf43926"));
    }

    #[test]
    fn test_scan_patches_skips_unrecognised() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "Game Hack 1a2b3c4d.ips", b"PATCH");
        write(dir.path(), "no crc here.ips", b"PATCH");
        write(dir.path(), "readme.txt", b"x");

        let patches = scanner()
            .scan_patches(&[dir.path().display().to_string()])
            .unwrap();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].crc_before(), "1a2b3c4d");
        assert_eq!(patches[0].rom_name(), "Game Hack");
    }
}
