//! Diagnostics for hosts and relays.
//!
//! Output always goes to stderr: a native host's stdout is the protocol stream.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a global `tracing` subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence over `default_filter`. Returns `false` when a
/// subscriber was already installed.
pub fn init(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}
