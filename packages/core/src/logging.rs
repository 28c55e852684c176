//! Tracing setup for embedding applications and tests

use crate::config::HubConfig;
use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter`
///
/// Returns `false` when a global subscriber was already installed, so it is
/// safe to call more than once.
pub fn init_tracing(default_filter: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .try_init()
        .is_ok()
}

/// [`init_tracing`] with the configured fallback filter
pub fn init_from_config(config: &HubConfig) -> bool {
    init_tracing(&config.log_filter)
}
