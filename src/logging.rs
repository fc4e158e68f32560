//! Logging configuration for lexigen.
//!
//! Both the server and the one-shot CLI write to stderr; verbosity is
//! controlled with the standard `RUST_LOG` environment filter.

use tracing_subscriber::EnvFilter;

/// Initializes stderr logging.
///
/// Logs are written to stderr for easy debugging and test output capture.
pub fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
