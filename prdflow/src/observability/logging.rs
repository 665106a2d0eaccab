//! Log subscriber setup.

use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_LOG_FILTER: &str = "prdflow=info,tower_http=info";

/// Builds the log filter from `RUST_LOG`, falling back to [`DEFAULT_LOG_FILTER`].
#[must_use]
pub fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Installs the global subscriber, human-readable or JSON.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(json: bool) -> Result<(), TryInitError> {
    let builder = tracing_subscriber::fmt().with_env_filter(log_filter());
    if json {
        builder.json().finish().try_init()
    } else {
        builder.finish().try_init()
    }
}
