//! Diagnostic logging setup.
//!
//! Operator console text goes through the host; this is the developer-facing
//! trace log on stderr, filtered by `RUST_LOG`.
//!
//! CHANGELOG:
//! - 10/12/2026 - Initial implementation

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Safe to call more than once.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { Level::INFO } else { Level::WARN };

    let result = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.into()))
        .try_init();

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
