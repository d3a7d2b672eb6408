//! Structured logging setup.

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

static INITIALIZED: OnceLock<()> = OnceLock::new();

/// Installs a global `tracing` subscriber filtered by `RUST_LOG`
/// (default `exothread=info`).
///
/// Safe to call repeatedly; only the first call does anything, and an existing
/// global subscriber is left in place.
pub fn init() {
    INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("exothread=info"));
        let result = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();

        if result.is_err() {
            tracing::debug!("global tracing subscriber already set, keeping it");
        }
    });
}
