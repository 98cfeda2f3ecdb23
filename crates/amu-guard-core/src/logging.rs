//! Tracing setup for hosts embedding the core library.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging at INFO. `RUST_LOG` overrides the level.
pub fn init() {
    init_with_level("info")
}

/// Initialize logging with a specific default level.
///
/// Installs an env-filtered compact formatter. Calling this twice is a no-op
/// so a host app and the FFI facade can both request it.
pub fn init_with_level(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

/// Initialize logging for testing (captures logs for test output)
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("debug"))
        .try_init();
}
