//! Coordination primitives for concurrent file operations.
//!
//! Every primitive in this module is cooperative: acquiring a lock or permit
//! suspends the calling task until the table grants entry, and every grant is
//! an RAII guard released exactly once on every exit path.
//!
//! ```text
//! WriteCoordinator ──► worker semaphore        (bounded concurrent candidates)
//!                  ──► KeyedLock<output path>  (no two writers per output)
//!                  ──► WeightedSemaphore (KiB) (bounded in-flight bytes)
//!
//! DriveScheduler   ──► per-volume limiter      (1 for network shares)
//! FileMoveTracker  ──► KeyedLock<input path>   + moved-to map
//! ```
//!
//! Instances are plain structs passed around as `Arc` handles; there is no
//! process-global state.

mod drive;
mod keyed_lock;
mod move_tracker;
mod volumes;
mod weighted;
mod write_coordinator;

pub use drive::{DrivePath, DriveScheduler, DEFAULT_DRIVE_THREADS, DEFAULT_MAX_FS_THREADS};
pub use keyed_lock::{KeyedLock, KeyedLockGuard};
pub use move_tracker::FileMoveTracker;
pub use volumes::{mount_points, MountPoint};
pub use weighted::{WeightedPermit, WeightedSemaphore};
pub use write_coordinator::{
    WriteCoordinator, DEFAULT_MAX_READ_WRITE_KILOBYTES, DEFAULT_WRITER_THREADS,
    OUTPUT_PATH_LOCK_CAPACITY,
};

use std::path::{Component, Path, PathBuf};

/// Builds the lock key for a path.
///
/// The path is normalized lexically (`.` removed, `..` folded into its
/// parent) and both separator styles are rendered as `/`, so two spellings
/// of the same path always share one lock.
pub fn path_key(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut prefix = String::new();

    for component in path.components() {
        match component {
            Component::Prefix(p) => prefix = p.as_os_str().to_string_lossy().into_owned(),
            Component::RootDir => prefix.push('/'),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.last().is_some_and(|last| last != "..") {
                    parts.pop();
                } else if prefix.is_empty() {
                    parts.push("..".to_string());
                }
            }
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
        }
    }

    let joined = parts.join("/");
    let key = format!("{}{}", prefix, joined).replace('\\', "/");
    if key.is_empty() {
        ".".to_string()
    } else {
        key
    }
}

/// Folds `.` and `..` components without touching the filesystem.
///
/// `..` above the root is dropped; leading `..` of a relative path is kept.
pub(crate) fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
