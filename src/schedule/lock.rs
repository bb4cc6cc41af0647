//! Schedule lock shared between the management side and the slot engine.
//!
//! The slot engine holds the lock while it executes a slot. Statistics
//! writers on the management side only ever *try* the lock: if the slot
//! engine holds it, the update is dropped.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

/// Non-blocking mutual exclusion around negotiated cell statistics.
///
/// Cloning yields another handle to the same lock.
#[derive(Debug, Clone, Default)]
pub struct ScheduleLock {
    inner: Arc<Mutex<()>>,
}

/// Guard returned by [`ScheduleLock`]; releases on drop.
#[derive(Debug)]
pub struct ScheduleLockGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl ScheduleLock {
    /// Create a new, unlocked lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire without blocking. Returns `None` if held elsewhere.
    pub fn try_acquire(&self) -> Option<ScheduleLockGuard<'_>> {
        self.inner
            .try_lock()
            .map(|guard| ScheduleLockGuard { _guard: guard })
    }

    /// Acquire, blocking until available.
    ///
    /// For the slot-execution side only.
    pub fn acquire(&self) -> ScheduleLockGuard<'_> {
        ScheduleLockGuard {
            _guard: self.inner.lock(),
        }
    }

    /// Check if the lock is currently held.
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}
