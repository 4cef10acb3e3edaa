//! Structured logging initialization.
//!
//! The scheduler and reporter bus emit `tracing` spans/events for operator
//! visibility; the JSONL `events.jsonl` file (SPEC_FULL.md §4.9/§4.10) remains
//! the durable, machine-readable contract. This module only wires the
//! human-facing side.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global `tracing` subscriber.
///
/// `verbose` selects a structured format with target/file/line info; the
/// default is a compact single-line format. `RUST_LOG` always takes
/// precedence over the `verbose` flag when set.
pub fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "rigkit=debug,info" } else { "rigkit=info,warn" })
    });

    let registry = tracing_subscriber::registry().with(filter);

    if verbose {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .try_init()
            .ok();
    } else {
        registry
            .with(fmt::layer().with_target(false).without_time())
            .try_init()
            .ok();
    }
}
