//! Filesystem steps of a write.
//!
//! Copies land in a temporary sibling of the output first and are renamed
//! into place, so a failed copy never leaves a truncated output behind.

use std::path::{Path, PathBuf};

use tokio::fs;

use super::error::{WriteError, WriteResult};
use crate::checksum::{hash_file_async, ChecksumBitmask};
use crate::file::DiscoveredFile;
use crate::patch::{Patch, PatchApplier};

pub(crate) async fn ensure_parent_dir(output: &Path) -> WriteResult<()> {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .await
            .map_err(|e| WriteError::io("create directory", parent, parent, e)),
        _ => Ok(()),
    }
}

fn temp_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!(".{}.romcurator-tmp", name))
}

/// Copies `source` to `output`, applying `patch` on the way if given.
pub(crate) async fn copy_file(
    source: &Path,
    output: &Path,
    patch: Option<(&Patch, &dyn PatchApplier)>,
) -> WriteResult<()> {
    ensure_parent_dir(output).await?;
    let temp = temp_path(output);

    let result = match patch {
        Some((patch, applier)) => applier
            .apply(patch, source, &temp)
            .await
            .map_err(|e| WriteError::io("patch", source, output, e)),
        None => fs::copy(source, &temp)
            .await
            .map(|_| ())
            .map_err(|e| WriteError::io("copy", source, output, e)),
    };
    if let Err(e) = result {
        let _ = fs::remove_file(&temp).await;
        return Err(e);
    }

    if let Err(e) = fs::rename(&temp, output).await {
        let _ = fs::remove_file(&temp).await;
        return Err(WriteError::io("rename", &temp, output, e));
    }
    Ok(())
}

/// Moves `source` to `output`. Falls back to copy and delete when a rename
/// isn't possible, e.g. across devices.
pub(crate) async fn move_file(source: &Path, output: &Path) -> WriteResult<()> {
    ensure_parent_dir(output).await?;

    if fs::rename(source, output).await.is_ok() {
        return Ok(());
    }

    copy_file(source, output, None).await?;
    fs::remove_file(source)
        .await
        .map_err(|e| WriteError::io("remove", source, source, e))
}

/// Hard links `output` to `source`, replacing an existing `output`.
pub(crate) async fn link_file(source: &Path, output: &Path) -> WriteResult<()> {
    ensure_parent_dir(output).await?;

    if fs::symlink_metadata(output).await.is_ok() {
        fs::remove_file(output)
            .await
            .map_err(|e| WriteError::io("remove", output, output, e))?;
    }
    fs::hard_link(source, output)
        .await
        .map_err(|e| WriteError::io("link", source, output, e))
}

/// Checks the file at `path` against the size and CRC32 of `expected`.
///
/// Returns the reason for a mismatch, or `None` if the file is correct.
/// Without an expected CRC32 only the size is compared.
pub(crate) async fn check_file(path: &Path, expected: &DiscoveredFile) -> WriteResult<Option<String>> {
    let (checksums, size) = hash_file_async(path.to_path_buf(), ChecksumBitmask::CRC32).await?;

    if size != expected.size() {
        return Ok(Some(format!("size {} != expected {}", size, expected.size())));
    }
    if let (Some(actual), Some(wanted)) = (checksums.crc32.as_deref(), expected.crc32()) {
        if actual != wanted {
            return Ok(Some(format!("crc32 {} != expected {}", actual, wanted)));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Checksums;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_copy_creates_directories() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.rom");
        std::fs::write(&source, b"data").unwrap();
        let output = dir.path().join("nested/deeper/a.rom");

        copy_file(&source, &output, None).await.unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), b"data");
        assert!(source.exists());
        assert!(!temp_path(&output).exists());
    }

    #[tokio::test]
    async fn test_copy_missing_source_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out/a.rom");

        let err = copy_file(&dir.path().join("missing.rom"), &output, None)
            .await
            .unwrap_err();
        assert!(matches!(err, WriteError::Io { action: "copy", .. }));
        assert!(!output.exists());
        assert!(!temp_path(&output).exists());
    }

    #[tokio::test]
    async fn test_move_removes_source() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.rom");
        std::fs::write(&source, b"data").unwrap();
        let output = dir.path().join("out/a.rom");

        move_file(&source, &output).await.unwrap();
        assert!(!source.exists());
        assert_eq!(std::fs::read(&output).unwrap(), b"data");
    }

    #[tokio::test]
    async fn test_link_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.rom");
        std::fs::write(&source, b"new").unwrap();
        let output = dir.path().join("out/a.rom");
        std::fs::create_dir_all(output.parent().unwrap()).unwrap();
        std::fs::write(&output, b"old").unwrap();

        link_file(&source, &output).await.unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_check_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.rom");
        std::fs::write(&path, b"123456789").unwrap();

        let good = DiscoveredFile::new(&path, 9, Checksums::from_crc32("cbf43926"));
        assert_eq!(check_file(&path, &good).await.unwrap(), None);

        let bad_crc = DiscoveredFile::new(&path, 9, Checksums::from_crc32("00000000"));
        assert!(check_file(&path, &bad_crc).await.unwrap().unwrap().contains("crc32"));

        let bad_size = DiscoveredFile::new(&path, 3, Checksums::default());
        assert!(check_file(&path, &bad_size).await.unwrap().unwrap().contains("size"));
    }
}
