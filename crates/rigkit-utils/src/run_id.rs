//! Time-sortable, globally unique run identifiers (spec.md §3: `runId` is
//! "time-sortable, globally unique").
//!
//! No UUID/ULID dependency is pulled in for this: a nanosecond UTC
//! timestamp already sorts lexicographically in time order, and pairing it
//! with the process id and a per-process atomic counter makes collisions
//! impossible within one host without reaching for a random-bits crate the
//! rest of the workspace doesn't otherwise need.

use std::sync::atomic::{AtomicU64, Ordering};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new run id of the form `{timestamp}-{pid:x}-{seq:x}`, where
/// `timestamp` is `YYYYMMDDTHHMMSS.nnnnnnnnnZ` (UTC, nanosecond precision).
#[must_use]
pub fn generate() -> String {
    let now = chrono::Utc::now();
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!(
        "{}-{:x}-{:x}",
        now.format("%Y%m%dT%H%M%S%.9fZ"),
        std::process::id(),
        seq
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = generate();
        let b = generate();
        assert_ne!(a, b);
    }

    #[test]
    fn generated_ids_sort_in_time_order() {
        let a = generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = generate();
        assert!(a < b, "expected {a} < {b}");
    }
}
