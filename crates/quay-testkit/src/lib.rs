//! Quay testing infrastructure
//!
//! Shared helpers for ledger tests: a hand-driven clock, deterministic
//! participants and proptest strategies.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
//!
//! # Usage
//!
//! ```rust,no_run
//! use quay_testkit::*;
//!
//! let clock = ManualClock::at_secs(0);
//! let alice = fixtures::publisher(0);
//! clock.advance_secs(2);
//! ```

pub mod fixtures;
pub mod strategies;
pub mod time;

pub use fixtures::*;
pub use time::ManualClock;

/// Install a test-writer tracing subscriber once per process.
///
/// Honors `RUST_LOG`; later calls are no-ops.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
