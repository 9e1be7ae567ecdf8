//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Output format of the fmt layer.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event, for log shippers.
    #[default]
    Json,
    /// Single-line human readable output.
    Compact,
}

fn filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// JSON logs at `info`, overridable through `RUST_LOG`.
pub fn init() {
    init_with(LogFormat::Json, "info");
}

/// Install a global subscriber. `RUST_LOG` wins over `default_directive`.
///
/// Returns `false` when a subscriber was already installed.
pub fn init_with(format: LogFormat, default_directive: &str) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(default_directive))
        .with_target(false);
    let installed = match format {
        LogFormat::Json => builder
            .json()
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
            .try_init()
            .is_ok(),
        LogFormat::Compact => builder.compact().try_init().is_ok(),
    };
    if installed {
        ::tracing::debug!(?format, "logging initialized");
    }
    installed
}

/// Compact output captured by the test harness (`cargo test -- --nocapture`).
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter("warn"))
        .with_target(false)
        .with_test_writer()
        .compact()
        .try_init();
}
