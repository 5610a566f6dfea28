//! Tracing subscriber setup for embedders.

use tracing_subscriber::EnvFilter;

/// Resolves the log filter: `RUST_LOG` wins, then `debug` when verbose,
/// then `info`.
#[must_use]
pub fn filter(verbose: bool) -> EnvFilter {
    let fallback = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Installs a `fmt` subscriber as the global default.
///
/// Returns `false` if a subscriber was already installed; the existing one
/// is left in place.
pub fn init(verbose: bool) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter(verbose))
        .try_init()
        .is_ok()
}
