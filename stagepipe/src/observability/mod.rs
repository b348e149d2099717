//! Subscriber setup for the `tracing` events the engine emits.
//!
//! The engine only emits through `tracing`; installing a subscriber is up to
//! the host. These helpers cover the common cases. Both honour `RUST_LOG`
//! when it is set and fall back to `default_filter` otherwise.

use tracing_subscriber::EnvFilter;

fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Installs a human-readable fmt subscriber as the global default.
///
/// Returns false if a global subscriber was already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_filter))
        .with_target(true)
        .try_init()
        .is_ok()
}

/// Installs a JSON fmt subscriber as the global default.
///
/// Returns false if a global subscriber was already installed.
pub fn init_json_tracing(default_filter: &str) -> bool {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter(default_filter))
        .with_current_span(true)
        .try_init()
        .is_ok()
}
