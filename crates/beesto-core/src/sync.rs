//! Lock helpers shared by the state stores.

use std::sync::{Mutex, MutexGuard};

/// Extension trait for `Mutex` that recovers from poisoning.
///
/// Store state is always left consistent between statements, so a panic in another
/// holder does not invalidate it. The original panic is the error worth reporting.
pub trait IgnoreLock<T> {
    /// Locks the mutex, recovering the guard if the lock was poisoned.
    fn lock_ignore_poison(&self) -> MutexGuard<'_, T>;
}

impl<T> IgnoreLock<T> for Mutex<T> {
    fn lock_ignore_poison(&self) -> MutexGuard<'_, T> {
        self.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
