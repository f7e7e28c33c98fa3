//! Semaphore whose acquisitions consume a variable number of permits.
//!
//! Used to bound the total kilobytes of file data in flight. A request for
//! more than the whole capacity is clamped to the capacity rather than
//! rejected: it waits for the semaphore to drain and then runs alone. Tiny
//! and negative weights still count as one permit.
//!
//! ```text
//! capacity = 716800 KiB
//! ├── 4 KiB cartridge ROM   → 4
//! ├── 650 MiB disc image    → 665600
//! └── 4 GiB DVD image       → 716800 (runs alone)
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Largest capacity a tokio semaphore accepts for a single acquisition.
const MAX_CAPACITY: u32 = u32::MAX >> 3;

/// Weighted counting semaphore.
#[derive(Debug, Clone)]
pub struct WeightedSemaphore {
    semaphore: Arc<Semaphore>,
    capacity: u32,
    /// Weighted sections currently running.
    open: Arc<AtomicUsize>,
}

impl WeightedSemaphore {
    /// Creates a semaphore holding `ceil(capacity)` permits, minimum 1.
    pub fn new(capacity: f64) -> Self {
        let capacity = clamp_to_permits(capacity, MAX_CAPACITY);

        tracing::debug!(capacity, "Created weighted semaphore");

        Self {
            semaphore: Arc::new(Semaphore::new(capacity as usize)),
            capacity,
            open: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The number of permits an acquisition of `weight` consumes.
    ///
    /// `max(1, ceil(weight))`, capped at the capacity. NaN counts as 1.
    pub fn effective_weight(&self, weight: f64) -> u32 {
        clamp_to_permits(weight, self.capacity)
    }

    /// Waits until `weight` permits (after clamping) are available and takes
    /// them.
    pub async fn acquire(&self, weight: f64) -> WeightedPermit {
        let weight = self.effective_weight(weight);
        let permit = Arc::clone(&self.semaphore)
            .acquire_many_owned(weight)
            .await
            .expect("weighted semaphore closed");

        self.open.fetch_add(1, Ordering::Relaxed);
        WeightedPermit {
            _permit: permit,
            weight,
            open: Arc::clone(&self.open),
        }
    }

    /// Runs `body` while holding `weight` permits.
    pub async fn run_exclusive<F, Fut, T>(&self, weight: f64, body: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _permit = self.acquire(weight).await;
        body().await
    }

    /// Total permits.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Permits not currently held.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Weighted sections currently holding permits.
    pub fn open(&self) -> usize {
        self.open.load(Ordering::Relaxed)
    }
}

fn clamp_to_permits(value: f64, max: u32) -> u32 {
    if value.is_nan() || value <= 1.0 {
        return 1.min(max);
    }
    let ceiled = value.ceil();
    if ceiled >= max as f64 {
        max
    } else {
        ceiled as u32
    }
}

/// Permits held from a [`WeightedSemaphore`]. Released on drop.
#[must_use = "the permits are released as soon as this is dropped"]
pub struct WeightedPermit {
    _permit: OwnedSemaphorePermit,
    weight: u32,
    open: Arc<AtomicUsize>,
}

impl WeightedPermit {
    /// Permits actually consumed by this acquisition.
    pub fn weight(&self) -> u32 {
        self.weight
    }
}

impl Drop for WeightedPermit {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for WeightedPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeightedPermit")
            .field("weight", &self.weight)
            .finish()
    }
}
