//! Process-level logging setup for binaries and benchmarks.
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! the embedding application.

use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{FreadError, Result};

/// Installs a formatted `tracing` subscriber filtered by `level`.
///
/// `level` accepts any `EnvFilter` directive, e.g. `info` or `freaddb=debug`.
pub fn init_logging(level: &str) -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(level)
                .map_err(|e| FreadError::InvalidArgument(format!("invalid log level: {e}")))?,
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|_| FreadError::InvalidArgument("logging already initialized".into()))
}
