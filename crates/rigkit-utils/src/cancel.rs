//! Cooperative cancellation primitive shared across the runner and scheduler.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A cheaply-cloneable, idempotent cancellation flag.
///
/// Cancellation is one-way: once cancelled, a token never becomes uncancelled.
/// Cloning shares the same underlying flag (SPEC_FULL.md §4.7 — the scheduler
/// and the runner's timeout watchdog both observe the same token).
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
