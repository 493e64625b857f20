//! Tracing subscriber setup for player processes

use tracing_subscriber::EnvFilter;

use crate::{PipelineError, Result};

/// Filter used when neither `RUST_LOG` nor the config names one
pub const DEFAULT_FILTER: &str = "ndiplay=info";

/// Parse a filter directive such as `ndiplay=debug,tokio=warn`
pub fn parse_filter(directive: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directive)
        .map_err(|e| PipelineError::config(format!("invalid log filter {:?}: {}", directive, e)))
}

/// Install a global `fmt` subscriber.
///
/// `RUST_LOG` wins over `filter`; `filter` wins over [`DEFAULT_FILTER`].
/// Fails if a global subscriber is already installed.
pub fn init(filter: Option<&str>) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => parse_filter(filter.unwrap_or(DEFAULT_FILTER))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| PipelineError::config(format!("logging already initialized: {}", e)))
}
