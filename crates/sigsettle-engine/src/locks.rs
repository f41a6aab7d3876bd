//! Per-signal serialization.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use sigsettle_core::SignalId;

/// One async mutex per signal id.
///
/// Every state transition holds the signal's guard across its
/// read-check-write, so concurrent closers see a consistent status.
/// Entries exist only while a guard is held or awaited.
#[derive(Default)]
pub struct SignalLocks {
    locks: DashMap<SignalId, Arc<Mutex<()>>>,
}

impl SignalLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, id: &SignalId) -> SignalGuard<'_> {
        let lock = self
            .locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        SignalGuard {
            locks: self,
            id: id.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Drop the entry for `id` once nobody holds or waits on it.
    fn release(&self, id: &SignalId) {
        self.locks.remove_if(id, |_, lock| Arc::strong_count(lock) <= 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Exclusive hold on one signal.
pub struct SignalGuard<'a> {
    locks: &'a SignalLocks,
    id: SignalId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SignalGuard<'_> {
    fn drop(&mut self) {
        // Unlock first so the strong count reflects only waiters.
        self.guard.take();
        self.locks.release(&self.id);
    }
}
