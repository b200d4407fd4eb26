//! Subscriber setup for the command-line tools

use std::str::FromStr;
use tracing::Level;

use crate::errors::{DiffError, DiffResult};

/// Parse a configured level name (`trace` through `error`).
pub fn parse_level(level: &str) -> DiffResult<Level> {
    Level::from_str(level.trim())
        .map_err(|_| DiffError::config(format!("unknown log level '{level}'")))
}

/// Install the fmt subscriber on stderr. A second call is a no-op.
pub fn init_logging(level: &str) -> DiffResult<()> {
    let level = parse_level(level)?;
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    Ok(())
}
