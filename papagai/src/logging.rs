//! Diagnostics on stderr via `tracing`.
//!
//! Product output (agent output, purge listings, dry-run commands) goes to
//! stdout and is not affected by the log level.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter for a `-v` count: `warn`, `info` at `-v`, `debug` from `-vv`.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins over `verbosity` when set. Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=papagai::io::workspace=debug papagai do task.md
/// ```
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
