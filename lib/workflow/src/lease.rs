//! Per-run leases.
//!
//! Each run has its own async mutex; holding it is the right to step the run.
//! There is no lock over all runs, so unrelated runs never wait on each other.

use dashmap::DashMap;
use nodeflow_core::RunId;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Exclusive right to mutate one run. Released on drop.
#[derive(Debug)]
pub struct RunLease {
    run_id: RunId,
    _guard: OwnedMutexGuard<()>,
}

impl RunLease {
    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run_id
    }
}

/// The arena of run leases.
#[derive(Debug, Default)]
pub struct RunLeases {
    locks: DashMap<RunId, Arc<Mutex<()>>>,
}

impl RunLeases {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and takes the lease of `run_id`.
    pub async fn acquire(&self, run_id: RunId) -> RunLease {
        // Clone the mutex out so the map shard is not held across the await.
        let lock = Arc::clone(&self.locks.entry(run_id).or_default());
        RunLease {
            run_id,
            _guard: lock.lock_owned().await,
        }
    }

    /// Releases `lease` and drops its entry, for a run that is finished or
    /// does not exist. The entry stays while other callers wait on it.
    pub fn forget(&self, lease: RunLease) {
        // The map and `lease` each hold one reference; waiters hold more.
        self.locks
            .remove_if(&lease.run_id, |_, lock| Arc::strong_count(lock) <= 2);
        drop(lease);
    }

    /// Returns the number of runs with a lease entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
