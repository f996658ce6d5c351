//! Heap relocation exclusion.
//!
//! The optimizing compiler reads (and may allocate on) the heap, so a
//! compile step must not overlap with a compaction that moves objects. The
//! compiler thread holds the relocation lock for exactly one compile step;
//! heap code on the execution thread takes the same lock before moving
//! anything. Neither side nests acquisitions.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// A heap that can exclude object relocation for a scope.
pub trait HeapRelocation: Send + Sync + 'static {
    /// Guard that keeps relocation excluded until dropped.
    type Guard<'a>
    where
        Self: 'a;

    /// Block until no relocation is in progress, then exclude new ones.
    fn relocation_lock(&self) -> Self::Guard<'_>;
}

/// Mutex-backed relocation lock.
///
/// Short-held and non-reentrant: taking it twice on one thread deadlocks.
#[derive(Debug, Default)]
pub struct RelocationLock {
    mutex: Mutex<()>,
}

impl RelocationLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock. Used by the compiler thread and by compaction.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        // The guarded data is `()`, so a poisoned lock carries no torn state.
        self.mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether some thread currently holds the lock.
    #[cfg(test)]
    pub(crate) fn is_locked(&self) -> bool {
        use std::sync::TryLockError;
        matches!(self.mutex.try_lock(), Err(TryLockError::WouldBlock))
    }
}

impl HeapRelocation for RelocationLock {
    type Guard<'a> = MutexGuard<'a, ()>;

    fn relocation_lock(&self) -> Self::Guard<'_> {
        self.lock()
    }
}
