use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock, recovering from poisoning.
///
/// Every critical section in this crate leaves its data consistent before
/// anything that can panic runs, so a poisoned guard is still usable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
