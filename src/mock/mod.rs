//! In-memory collaborators
//!
//! Stand-ins for GitHub and the forum with scripted failures and call
//! counters. Tests drive the core through them, and `--dry-run` uses them
//! in place of every collaborator that writes.

mod failure;
mod forum;
mod repos;

pub use failure::{FailureConfig, FailureInjector, Op};
pub use forum::{MockForum, MockPost};
pub use repos::{MockArtifacts, MockSource, StoredRelease};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock, ignoring poisoning from a panicked test thread.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
