//! Copy-on-reload cell: readers clone an `Arc` to the current snapshot and keep it for as long as
//! they need; a reload swaps the pointer without touching snapshots already handed out.

use parking_lot::RwLock;
use std::sync::Arc;

/// Shared pointer to the current immutable snapshot of `T`.
pub struct SnapshotCell<T> {
    current: Arc<RwLock<Arc<T>>>,
}

impl<T> Clone for SnapshotCell<T> {
    fn clone(&self) -> Self {
        Self {
            current: Arc::clone(&self.current),
        }
    }
}

impl<T> SnapshotCell<T> {
    pub fn new(initial: T) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(initial))),
        }
    }

    /// Snapshot current at the time of the call. The lock is held only for the `Arc` clone.
    pub fn load(&self) -> Arc<T> {
        Arc::clone(&self.current.read())
    }

    /// Replace the current snapshot; returns the one it replaced.
    pub fn store(&self, next: T) -> Arc<T> {
        let next = Arc::new(next);
        std::mem::replace(&mut *self.current.write(), next)
    }
}
