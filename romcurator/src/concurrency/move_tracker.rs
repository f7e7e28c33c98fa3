//! Tracks input files relocated during a move run.
//!
//! When several candidates share one input file, the first to write it moves
//! the file and every later one must read from wherever it went. All access
//! to one input path is serialized through its lock.

use std::future::Future;
use std::path::{Path, PathBuf};

use dashmap::DashMap;

use super::{path_key, KeyedLock};

/// Remembers, per input path, where the file was moved to.
#[derive(Debug, Default)]
pub struct FileMoveTracker {
    locks: KeyedLock<String>,
    moved: DashMap<String, PathBuf>,
}

impl FileMoveTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `body` while holding the lock for `input_path`.
    ///
    /// `body` receives the path the input was previously moved to, if any,
    /// and returns its result along with the path the input now lives at.
    /// A returned path different from `input_path` is recorded.
    pub async fn move_file<F, Fut, T>(&self, input_path: &Path, body: F) -> T
    where
        F: FnOnce(Option<PathBuf>) -> Fut,
        Fut: Future<Output = (T, Option<PathBuf>)>,
    {
        let key = path_key(input_path);
        let _guard = self.locks.acquire_one(key.clone()).await;

        let previous = self.moved.get(&key).map(|entry| entry.value().clone());
        let (result, moved_to) = body(previous).await;

        if let Some(moved_to) = moved_to {
            if path_key(&moved_to) != key {
                tracing::debug!(
                    from = %input_path.display(),
                    to = %moved_to.display(),
                    "Recorded moved input file"
                );
                self.moved.insert(key, moved_to);
            }
        }

        result
    }

    /// Whether `path` has been moved.
    ///
    /// Waits for a move in progress on `path` to finish before answering.
    pub async fn was_moved(&self, path: &Path) -> bool {
        let key = path_key(path);
        if self.moved.contains_key(&key) {
            return true;
        }

        self.locks.acquire_one(key.clone()).await.release();
        self.moved.contains_key(&key)
    }

    /// Where `path` was moved to, if it was.
    pub fn moved_to(&self, path: &Path) -> Option<PathBuf> {
        self.moved
            .get(&path_key(path))
            .map(|entry| entry.value().clone())
    }

    /// Number of inputs moved so far.
    pub fn moved_count(&self) -> usize {
        self.moved.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_records_new_location() {
        let tracker = FileMoveTracker::new();
        let input = Path::new("in/a.rom");
        assert!(!tracker.was_moved(input).await);

        let seen = tracker
            .move_file(input, |previous| async move {
                (previous, Some(PathBuf::from("out/a.rom")))
            })
            .await;

        assert_eq!(seen, None);
        assert!(tracker.was_moved(input).await);
        assert_eq!(tracker.moved_to(input), Some(PathBuf::from("out/a.rom")));
    }

    #[tokio::test]
    async fn test_later_move_sees_recorded_path() {
        let tracker = FileMoveTracker::new();
        let input = Path::new("in/a.rom");

        tracker
            .move_file(input, |_| async { ((), Some(PathBuf::from("out/a.rom"))) })
            .await;
        let seen = tracker
            .move_file(input, |previous| async move { (previous, None) })
            .await;

        assert_eq!(seen, Some(PathBuf::from("out/a.rom")));
    }

    #[tokio::test]
    async fn test_same_path_not_recorded() {
        let tracker = FileMoveTracker::new();
        let input = Path::new("in/a.rom");

        tracker
            .move_file(input, |_| async { ((), Some(PathBuf::from("in/./a.rom"))) })
            .await;

        assert!(!tracker.was_moved(input).await);
        assert_eq!(tracker.moved_count(), 0);
    }

    #[tokio::test]
    async fn test_was_moved_waits_for_move_in_progress() {
        let tracker = Arc::new(FileMoveTracker::new());
        let (started_tx, started_rx) = oneshot::channel();
        let (finish_tx, finish_rx) = oneshot::channel::<()>();

        let mover = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move {
                tracker
                    .move_file(Path::new("in/a.rom"), |_| async move {
                        started_tx.send(()).unwrap();
                        finish_rx.await.unwrap();
                        ((), Some(PathBuf::from("out/a.rom")))
                    })
                    .await;
            })
        };

        started_rx.await.unwrap();
        let checker = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move { tracker.was_moved(Path::new("in/a.rom")).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!checker.is_finished(), "was_moved must wait for the move");

        finish_tx.send(()).unwrap();
        mover.await.unwrap();
        assert!(checker.await.unwrap());
    }
}
