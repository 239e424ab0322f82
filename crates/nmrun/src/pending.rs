//! # Correlation Table
//!
//! Maps outstanding request ids to the callers waiting on them.
//!
//! ## Invariants
//!
//! - Ids are allocated from a single atomic counter: strictly increasing and never
//!   reused, no matter how many sessions share the table.
//! - An entry is settled at most once. Settling removes it, so a duplicate or late
//!   response for the same id finds nothing.
//! - Settlement order is unrelated to registration order.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use tokio::sync::oneshot;

/// Table of pending calls, generic over what a settlement carries.
pub struct PendingTable<T> {
    pending: DashMap<u64, oneshot::Sender<T>>,
    seq_gen: AtomicU64,
}

impl<T> PendingTable<T> {
    /// Creates an empty table; the first id handed out is 1.
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            seq_gen: AtomicU64::new(1),
        }
    }

    /// Allocates the next id and records a pending entry for it.
    pub fn register(&self) -> (u64, oneshot::Receiver<T>) {
        let id = self.seq_gen.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        (id, rx)
    }

    /// Settles the entry for `id`.
    ///
    /// Returns `false` if no entry exists for `id`. A receiver that was already
    /// dropped still counts as settled: the entry existed and is now gone.
    pub fn settle(&self, id: u64, value: T) -> bool {
        match self.pending.remove(&id) {
            Some((_, tx)) => {
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }

    /// Removes an entry without settling it (timeouts, cancellation).
    pub fn forget(&self, id: u64) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Settles every outstanding entry with a value built by `make`.
    pub fn settle_all(&self, make: impl Fn() -> T) {
        let keys: Vec<u64> = self.pending.iter().map(|e| *e.key()).collect();
        for key in keys {
            self.settle(key, make());
        }
    }

    pub fn contains(&self, id: u64) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<T> Default for PendingTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
