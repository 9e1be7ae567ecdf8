//! Process-wide tracing setup.
//!
//! The engine crates only emit `tracing` events; whoever embeds them (the
//! external loader, a test harness, a benchmark) installs the subscriber here.

/// JSON logging at `info` unless `RUST_LOG` says otherwise. Only the first
/// call installs a subscriber.
pub fn init() {
    tracing::init();
}

/// Subscriber configuration (filters, formatters).
pub mod tracing;

pub use self::tracing::{LogFormat, init_for_tests, init_with};
