//! Per-volume I/O throttling.
//!
//! Reading many files from one spinning disk or network share in parallel is
//! slower than reading a few at a time, while files on different volumes can
//! be read fully in parallel. The [`DriveScheduler`] classifies every path to
//! the volume it lives on and gives each volume its own limiter:
//!
//! ```text
//! items ──► sort by path ──► group by volume ──► stripe (5 per volume)
//!                                                    │
//!        ┌───────────────────────────────────────────┘
//!        ▼
//!   volume limiter (drive_threads, or 1 for network shares)
//!        ▼
//!   global thread limiter (threads)
//!        ▼
//!      body(item)  ──► results restored to input order
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::Semaphore;
use tracing::{debug, trace};

use super::normalize_lexically;
use super::volumes::{mount_points, sort_longest_first, MountPoint};

/// Default concurrent operations per local volume.
pub const DEFAULT_DRIVE_THREADS: usize = 8;

/// Upper bound on futures a single `map` call keeps in flight.
pub const DEFAULT_MAX_FS_THREADS: usize = 100;

/// Items taken from each volume per stripe.
const STRIPE_CHUNK: usize = 5;

/// Something that lives at a filesystem path.
pub trait DrivePath {
    /// The path used to pick the item's volume.
    fn drive_path(&self) -> &Path;
}

impl DrivePath for Path {
    fn drive_path(&self) -> &Path {
        self
    }
}

impl DrivePath for PathBuf {
    fn drive_path(&self) -> &Path {
        self
    }
}

impl DrivePath for str {
    fn drive_path(&self) -> &Path {
        Path::new(self)
    }
}

impl DrivePath for String {
    fn drive_path(&self) -> &Path {
        Path::new(self)
    }
}

impl<T: DrivePath + ?Sized> DrivePath for &T {
    fn drive_path(&self) -> &Path {
        (**self).drive_path()
    }
}

impl<T: DrivePath + ?Sized> DrivePath for Arc<T> {
    fn drive_path(&self) -> &Path {
        (**self).drive_path()
    }
}

/// Where mount points come from.
#[derive(Debug)]
enum MountSource {
    /// Read from the operating system.
    System,
    /// A fixed list, used by tests and callers that already know the layout.
    Fixed,
}

/// A classified volume.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Volume {
    key: String,
    network: bool,
}

/// Throttles filesystem work per physical volume.
#[derive(Debug)]
pub struct DriveScheduler {
    /// Global limit across all volumes.
    threads: Arc<Semaphore>,
    thread_count: usize,
    drive_threads: usize,
    max_fs_threads: usize,
    /// One limiter per volume key, created on first use.
    limiters: Mutex<HashMap<String, Arc<Semaphore>>>,
    mounts: RwLock<Option<Vec<MountPoint>>>,
    source: MountSource,
}

impl DriveScheduler {
    /// Creates a scheduler running at most `threads` bodies at once.
    pub fn new(threads: usize) -> Self {
        let threads = threads.max(1);
        Self {
            threads: Arc::new(Semaphore::new(threads)),
            thread_count: threads,
            drive_threads: DEFAULT_DRIVE_THREADS,
            max_fs_threads: DEFAULT_MAX_FS_THREADS,
            limiters: Mutex::new(HashMap::new()),
            mounts: RwLock::new(None),
            source: MountSource::System,
        }
    }

    /// Sets the per-volume limit for local volumes.
    pub fn with_drive_threads(mut self, drive_threads: usize) -> Self {
        self.drive_threads = drive_threads.max(1);
        self
    }

    /// Sets how many futures one `map` call keeps in flight.
    pub fn with_max_fs_threads(mut self, max_fs_threads: usize) -> Self {
        self.max_fs_threads = max_fs_threads.max(1);
        self
    }

    /// Uses a fixed list of mount points instead of the system's.
    pub fn with_mount_points(mut self, mut mounts: Vec<MountPoint>) -> Self {
        sort_longest_first(&mut mounts);
        self.mounts = RwLock::new(Some(mounts));
        self.source = MountSource::Fixed;
        self
    }

    /// Global thread limit.
    pub fn threads(&self) -> usize {
        self.thread_count
    }

    /// Per-volume limit for local volumes.
    pub fn drive_threads(&self) -> usize {
        self.drive_threads
    }

    /// Number of volumes that have been given a limiter.
    pub fn volume_count(&self) -> usize {
        self.limiters.lock().len()
    }

    /// Runs `body` for every item and returns the outputs in input order.
    ///
    /// Items are spread across volumes so that a long run of files on one
    /// slow drive does not hold up files on the others. Every body runs to
    /// completion; errors are ordinary outputs and are returned with the
    /// rest.
    pub async fn map<T, F, Fut, V>(&self, items: Vec<T>, body: F) -> Vec<V>
    where
        T: DrivePath,
        F: Fn(T) -> Fut,
        Fut: Future<Output = V>,
    {
        if items.is_empty() {
            return Vec::new();
        }

        self.refresh_mounts();
        let mounts = self.current_mounts();

        let mut classified: Vec<(usize, T, Volume)> = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let volume = classify(item.drive_path(), &mounts);
                (index, item, volume)
            })
            .collect();
        classified.sort_by(|a, b| a.1.drive_path().cmp(b.1.drive_path()));

        let mut groups: Vec<(String, Vec<(usize, T, Volume)>)> = Vec::new();
        for entry in classified {
            match groups.iter_mut().find(|(key, _)| *key == entry.2.key) {
                Some((_, group)) => group.push(entry),
                None => groups.push((entry.2.key.clone(), vec![entry])),
            }
        }

        debug!(
            items = groups.iter().map(|(_, g)| g.len()).sum::<usize>(),
            volumes = groups.len(),
            "Scheduling file operations across volumes"
        );

        let ordered = stripe(groups.into_iter().map(|(_, group)| group).collect());

        let body = &body;
        let mut results: Vec<(usize, V)> = stream::iter(ordered)
            .map(|(index, item, volume)| async move {
                let value = self.run_on_volume(&volume, || body(item)).await;
                (index, value)
            })
            .buffer_unordered(self.max_fs_threads)
            .collect()
            .await;

        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, value)| value).collect()
    }

    /// Runs a single `body` under the limiter of `path`'s volume.
    pub async fn run_exclusive<P, F, Fut, V>(&self, path: P, body: F) -> V
    where
        P: AsRef<Path>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        if self.mounts.read().is_none() {
            self.refresh_mounts();
        }
        let volume = classify(path.as_ref(), &self.current_mounts());
        self.run_on_volume(&volume, body).await
    }

    /// The volume key `path` is scheduled under.
    pub fn volume_key(&self, path: &Path) -> String {
        if self.mounts.read().is_none() {
            self.refresh_mounts();
        }
        classify(path, &self.current_mounts()).key
    }

    async fn run_on_volume<F, Fut, V>(&self, volume: &Volume, body: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let limiter = self.limiter_for(volume);

        let _volume_permit = limiter.acquire_owned().await.expect("drive semaphore closed");
        let _thread_permit = Arc::clone(&self.threads)
            .acquire_owned()
            .await
            .expect("thread semaphore closed");

        body().await
    }

    fn limiter_for(&self, volume: &Volume) -> Arc<Semaphore> {
        let mut limiters = self.limiters.lock();
        let limiter = limiters.entry(volume.key.clone()).or_insert_with(|| {
            let limit = if volume.network { 1 } else { self.drive_threads };
            debug!(volume = %volume.key, network = volume.network, limit, "Created drive limiter");
            Arc::new(Semaphore::new(limit))
        });
        Arc::clone(limiter)
    }

    fn refresh_mounts(&self) {
        if let MountSource::System = self.source {
            let mounts = mount_points();
            trace!(count = mounts.len(), "Enumerated mount points");
            *self.mounts.write() = Some(mounts);
        }
    }

    fn current_mounts(&self) -> Vec<MountPoint> {
        self.mounts.read().clone().unwrap_or_default()
    }
}

impl Default for DriveScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_DRIVE_THREADS)
    }
}

/// Picks the volume for `path`.
///
/// The longest mount root containing the path wins. A UNC path
/// (`//host/...` or `\\host\...`) that only the filesystem root contains is
/// treated as a share of its own. Paths matching nothing share the `""`
/// volume.
fn classify(path: &Path, mounts: &[MountPoint]) -> Volume {
    let unc = unc_host(path);
    let absolute = absolutize(path);

    let mount = mounts.iter().find(|mount| absolute.starts_with(&mount.root));

    match (mount, unc) {
        (Some(mount), Some(host)) if mount.root.parent().is_none() => Volume {
            key: host,
            network: true,
        },
        (Some(mount), _) => Volume {
            key: mount.root.to_string_lossy().into_owned(),
            network: mount.network,
        },
        (None, Some(host)) => Volume {
            key: host,
            network: true,
        },
        (None, None) => Volume {
            key: String::new(),
            network: false,
        },
    }
}

/// Returns `//host` for a UNC-style path, with separators normalized.
fn unc_host(path: &Path) -> Option<String> {
    let raw = path.to_string_lossy();
    let is_separator = |c: char| c == '/' || c == '\\';

    let mut chars = raw.chars();
    if !(chars.next().is_some_and(is_separator) && chars.next().is_some_and(is_separator)) {
        return None;
    }

    let host: String = chars.take_while(|c| !is_separator(*c)).collect();
    if host.is_empty() {
        None
    } else {
        Some(format!("//{}", host))
    }
}

/// Joins a relative `path` onto the working directory and folds `.` and
/// `..` components, so a path can't reach another volume through `..`.
fn absolutize(path: &Path) -> PathBuf {
    let joined = match std::env::current_dir() {
        Ok(cwd) if !path.is_absolute() => cwd.join(path),
        _ => path.to_path_buf(),
    };
    normalize_lexically(&joined)
}

/// Interleaves per-volume groups, taking up to [`STRIPE_CHUNK`] items from
/// each group per round.
fn stripe<T>(groups: Vec<Vec<T>>) -> Vec<T> {
    if groups.len() <= 1 {
        return groups.into_iter().flatten().collect();
    }

    let total = groups.iter().map(Vec::len).sum();
    let mut iters: Vec<_> = groups.into_iter().map(Vec::into_iter).collect();
    let mut striped = Vec::with_capacity(total);

    while striped.len() < total {
        for iter in iters.iter_mut() {
            striped.extend(iter.by_ref().take(STRIPE_CHUNK));
        }
    }

    striped
}
