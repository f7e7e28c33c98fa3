//! Admission control for writing candidates.
//!
//! Writing a candidate passes three gates, outermost first:
//!
//! 1. a worker permit, bounding how many candidates are written at once;
//! 2. the locks for every output path of the candidate, so two candidates
//!    never write the same file concurrently;
//! 3. a weighted permit sized by the candidate's input data in KiB, bounding
//!    the bytes being read and written at once.
//!
//! Gates are released in reverse order when the body finishes, fails, or is
//! dropped.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tracing::trace;

use super::{path_key, KeyedLock, WeightedSemaphore};
use crate::candidates::WriteCandidate;

/// Default in-flight budget: one 700 MiB CD image, in KiB.
pub const DEFAULT_MAX_READ_WRITE_KILOBYTES: u64 = 716_800;

/// Output path keys kept by the output lock table.
pub const OUTPUT_PATH_LOCK_CAPACITY: usize = 1000;

/// Default number of candidates written at once.
pub const DEFAULT_WRITER_THREADS: usize = 4;

/// Schedules candidate writes.
#[derive(Debug)]
pub struct WriteCoordinator {
    workers: Arc<Semaphore>,
    worker_count: usize,
    output_paths: KeyedLock<String>,
    kilobytes: WeightedSemaphore,
    /// Bodies currently executing.
    open_locks: Arc<AtomicUsize>,
}

impl WriteCoordinator {
    /// Creates a coordinator writing at most `threads` candidates at once.
    pub fn new(threads: usize) -> Self {
        Self::with_max_kilobytes(threads, DEFAULT_MAX_READ_WRITE_KILOBYTES)
    }

    /// Creates a coordinator with a custom in-flight KiB budget.
    pub fn with_max_kilobytes(threads: usize, max_kilobytes: u64) -> Self {
        let threads = threads.max(1);

        tracing::debug!(threads, max_kilobytes, "Created write coordinator");

        Self {
            workers: Arc::new(Semaphore::new(threads)),
            worker_count: threads,
            output_paths: KeyedLock::with_max_size(OUTPUT_PATH_LOCK_CAPACITY),
            kilobytes: WeightedSemaphore::new(max_kilobytes as f64),
            open_locks: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Runs `body` once `candidate` has passed every gate.
    pub async fn run_exclusive<F, Fut, T>(&self, candidate: &WriteCandidate, body: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _worker = Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .expect("writer semaphore closed");

        let keys: Vec<String> = candidate
            .output_paths()
            .into_iter()
            .map(path_key)
            .collect();
        let _paths = self.output_paths.acquire(keys).await;

        let kilobytes = candidate.total_input_size() as f64 / 1024.0;
        let _bytes = self.kilobytes.acquire(kilobytes).await;

        trace!(candidate = %candidate.name(), kilobytes, "Write admitted");

        let _open = OpenLock::enter(&self.open_locks);
        body().await
    }

    /// Runs `body` for every candidate.
    ///
    /// Candidates with fewer ROMs go first, ties broken by name. Outputs are
    /// returned in that sorted order.
    pub async fn map<F, Fut, T>(&self, candidates: Vec<Arc<WriteCandidate>>, body: F) -> Vec<T>
    where
        F: Fn(Arc<WriteCandidate>) -> Fut,
        Fut: Future<Output = T>,
    {
        if candidates.is_empty() {
            return Vec::new();
        }

        let sorted = sort_for_writing(candidates);

        // A little over-subscription keeps a worker busy while the next
        // candidate waits on its path locks.
        let concurrency = if self.worker_count == 1 {
            1
        } else {
            self.worker_count * 3 / 2
        };

        let body = &body;
        stream::iter(sorted)
            .map(|candidate| async move {
                let target = Arc::clone(&candidate);
                self.run_exclusive(&target, || body(candidate)).await
            })
            .buffered(concurrency)
            .collect()
            .await
    }

    /// Bodies currently executing.
    pub fn open_locks(&self) -> usize {
        self.open_locks.load(Ordering::Relaxed)
    }

    /// Maximum candidates written at once.
    pub fn threads(&self) -> usize {
        self.worker_count
    }

    /// The in-flight KiB budget.
    pub fn max_kilobytes(&self) -> u32 {
        self.kilobytes.capacity()
    }
}

impl Default for WriteCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_WRITER_THREADS)
    }
}

/// Sorts candidates by ROM count, then name.
pub(crate) fn sort_for_writing(mut candidates: Vec<Arc<WriteCandidate>>) -> Vec<Arc<WriteCandidate>> {
    candidates.sort_by(|a, b| {
        a.rom_count()
            .cmp(&b.rom_count())
            .then_with(|| a.name().cmp(b.name()))
    });
    candidates
}

/// Counts an executing body. Decrements on drop.
struct OpenLock {
    open: Arc<AtomicUsize>,
}

impl OpenLock {
    fn enter(open: &Arc<AtomicUsize>) -> Self {
        open.fetch_add(1, Ordering::Relaxed);
        Self {
            open: Arc::clone(open),
        }
    }
}

impl Drop for OpenLock {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::RomWithFiles;
    use crate::dat::{Game, Rom, SingleValueGame};
    use crate::file::DiscoveredFile;
    use std::path::PathBuf;
    use std::time::Duration;

    fn candidate(name: &str, outputs: &[(&str, u64)]) -> Arc<WriteCandidate> {
        let mut game = Game::new(name);
        let mut pairs = Vec::new();
        for (output, size) in outputs {
            let rom = Rom::new(*output, *size).with_crc32("00000000");
            game = game.with_rom(rom.clone());
            let input = Arc::new(DiscoveredFile::new(
                PathBuf::from("input").join(output),
                *size,
                rom.checksums(),
            ));
            let out = DiscoveredFile::new(PathBuf::from("out").join(output), *size, rom.checksums());
            pairs.push(RomWithFiles::new(rom, input, out));
        }
        let game = SingleValueGame::from_game(Arc::new(game));
        Arc::new(WriteCandidate::new(game, pairs))
    }

    #[tokio::test]
    async fn test_same_output_path_serialized() {
        let coordinator = Arc::new(WriteCoordinator::new(4));
        let a = candidate("A", &[("shared.rom", 10)]);
        let b = candidate("B", &[("shared.rom", 10)]);

        let first = coordinator.output_paths.acquire_one(path_key(&PathBuf::from("out/shared.rom"))).await;

        let handle = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.run_exclusive(&a, || async { 1 }).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!handle.is_finished(), "writer must wait for the output path");
        assert_eq!(coordinator.open_locks(), 0);

        drop(first);
        assert_eq!(handle.await.unwrap(), 1);
        assert_eq!(coordinator.run_exclusive(&b, || async { 2 }).await, 2);
    }

    #[tokio::test]
    async fn test_oversized_candidate_still_runs() {
        let coordinator = WriteCoordinator::with_max_kilobytes(2, 4);
        let big = candidate("Big", &[("disc.bin", 1024 * 1024 * 1024)]);

        let value = coordinator.run_exclusive(&big, || async { "done" }).await;
        assert_eq!(value, "done");
    }

    #[tokio::test]
    async fn test_open_locks_tracks_running_bodies() {
        let coordinator = WriteCoordinator::new(2);
        let a = candidate("A", &[("a.rom", 1)]);

        coordinator
            .run_exclusive(&a, || async {
                assert_eq!(coordinator.open_locks(), 1);
            })
            .await;
        assert_eq!(coordinator.open_locks(), 0);
    }

    #[tokio::test]
    async fn test_error_propagates_after_release() {
        let coordinator = WriteCoordinator::new(1);
        let a = candidate("A", &[("a.rom", 1)]);

        let result: Result<(), String> = coordinator
            .run_exclusive(&a, || async { Err("disk full".to_string()) })
            .await;
        assert_eq!(result, Err("disk full".to_string()));

        // Everything was released, so the same candidate can run again.
        let again = tokio::time::timeout(
            Duration::from_secs(1),
            coordinator.run_exclusive(&a, || async { 3 }),
        )
        .await;
        assert_eq!(again.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_map_orders_by_rom_count_then_name() {
        let coordinator = WriteCoordinator::new(3);
        let candidates = vec![
            candidate("Zeta", &[("z.rom", 1)]),
            candidate("Multi", &[("m1.rom", 1), ("m2.rom", 1)]),
            candidate("Alpha", &[("a.rom", 1)]),
        ];

        let names = coordinator
            .map(candidates, |candidate| async move { candidate.name().to_string() })
            .await;

        assert_eq!(names, vec!["Alpha", "Zeta", "Multi"]);
    }

    #[tokio::test]
    async fn test_map_respects_worker_limit() {
        let coordinator = WriteCoordinator::new(2);
        let in_flight = &AtomicUsize::new(0);
        let max_seen = &AtomicUsize::new(0);

        let candidates = (0..8)
            .map(|i| {
                let file = format!("{}.rom", i);
                candidate(&format!("G{}", i), &[(file.as_str(), 1)])
            })
            .collect();

        coordinator
            .map(candidates, |_| async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            })
            .await;

        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }
}
