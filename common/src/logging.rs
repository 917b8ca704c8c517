//! Tracing subscriber bootstrap.

use tracing::Level;

use crate::error::{CommonError, Result};

/// Parse a log level name (`trace`, `debug`, `info`, `warn`, `error`).
pub fn parse_level(level: &str) -> Result<Level> {
    level
        .trim()
        .parse::<Level>()
        .map_err(|_| CommonError::configuration_error(format!("unknown log level '{}'", level)))
}

/// Install a global `fmt` subscriber with the given maximum level.
///
/// Calling this more than once is harmless; only the first call installs a
/// subscriber.
pub fn init_logging(level: &str) -> Result<()> {
    let level = parse_level(level)?;
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
    Ok(())
}
