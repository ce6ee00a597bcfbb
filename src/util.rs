use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a bookkeeping mutex, recovering the data if a holder panicked.
///
/// Critical sections guarded this way never await and never leave the
/// data half-updated, so a poisoned lock still holds a consistent value.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// vim: ts=4
