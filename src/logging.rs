//! Log setup for function binaries.

use tracing_subscriber::EnvFilter;

/// Install a `tracing` subscriber filtered by `RUST_LOG`, defaulting to
/// `info`. Calling it again is a no-op.
///
/// The host captures stdout, so events are written there without ANSI colour.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .try_init();
}
