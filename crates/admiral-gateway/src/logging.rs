//! Logging initialization
//!
//! Logs go to stderr, human-readable or one JSON object per line. `RUST_LOG`
//! overrides the configured level.

use std::io;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{GatewayError, GatewayResult};

impl LoggingConfig {
    /// Install the global tracing subscriber
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Logging`] if the level is not a valid filter
    /// directive or a subscriber is already installed.
    pub fn init(&self) -> GatewayResult<()> {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&self.level)
                .map_err(|e| GatewayError::Logging(format!("invalid level '{}': {e}", self.level)))?,
        };
        let subscriber = tracing_subscriber::registry().with(filter);

        match self.format {
            LogFormat::Json => subscriber
                .with(fmt::layer().json().with_writer(io::stderr))
                .try_init()
                .map_err(|e| GatewayError::Logging(e.to_string())),
            LogFormat::Pretty => subscriber
                .with(fmt::layer().with_writer(io::stderr))
                .try_init()
                .map_err(|e| GatewayError::Logging(e.to_string())),
        }
    }
}
