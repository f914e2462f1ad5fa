//! Wiring between the tracker and the graph service. Network calls never run while the tracker
//! is locked: records leave the tracker first and are posted by a background worker.

pub mod coordinator;
pub mod stopwatch;
pub mod ticker;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use coordinator::{Seed, SyncCoordinator, SyncOperation, SyncOutcome, SyncStatus};
pub use stopwatch::Stopwatch;

/// Tracker state stays consistent across a panic in another holder, so poisoning is ignored.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
