//! # Logging
//!
//! Installs the global tracing subscriber.
//!
//! Filtering follows `RUST_LOG` and defaults to `image_reflector_controller=info`.
//! `LOG_FORMAT=json` switches to one JSON object per line.

use crate::config::LogFormat;
use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

pub const DEFAULT_LOG_FILTER: &str = "image_reflector_controller=info";

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install the subscriber, failing if one is already installed
pub fn init_tracing(format: LogFormat, default_filter: &str) -> Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter(default_filter));
    match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .try_init(),
    }
    .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}
