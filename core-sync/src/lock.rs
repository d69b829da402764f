//! Process-wide "a sweep is running" lock.
//!
//! Acquisition never waits: a caller that finds the lock held skips its
//! sweep. The guard releases on drop, including on early return or panic.

use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Shared sweep lock. Clones refer to the same lock.
#[derive(Debug, Clone, Default)]
pub struct SweepLock {
    inner: Arc<Mutex<()>>,
}

/// Held while a sweep runs
#[derive(Debug)]
pub struct SweepGuard {
    _guard: OwnedMutexGuard<()>,
}

impl SweepLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` if another sweep holds the lock.
    pub fn try_acquire(&self) -> Option<SweepGuard> {
        self.inner
            .clone()
            .try_lock_owned()
            .ok()
            .map(|guard| SweepGuard { _guard: guard })
    }

    pub fn is_held(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}
