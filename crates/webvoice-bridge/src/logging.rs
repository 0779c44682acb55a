//! Logging setup
//!
//! The bridge only emits `tracing` events; installing a subscriber is left to the host.
//! [`setup_logging`] is a convenience for hosts that do not bring their own.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{BridgeError, BridgeResult, ConfigError};

/// Configuration for the logging system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (`trace`, `debug`, `info`, `warn`, `error`)
    pub level: String,
    /// Whether to enable JSON formatting
    pub json: bool,
    /// Whether to include file and line information
    pub file_info: bool,
    /// Whether to log span activity
    pub log_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_info: false,
            log_spans: false,
        }
    }
}

impl LoggingConfig {
    /// Create a new logging configuration at the given level
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Default::default()
        }
    }

    /// Enable JSON formatting
    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    /// Enable file and line information in logs
    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    /// Enable span logging
    pub fn with_spans(mut self) -> Self {
        self.log_spans = true;
        self
    }

    /// Parse the configured level
    pub fn parse_level(&self) -> Result<Level, ConfigError> {
        Level::from_str(&self.level).map_err(|_| ConfigError::InvalidLogLevel(self.level.clone()))
    }
}

/// Install a global `fmt` subscriber for the given configuration
///
/// `RUST_LOG` directives take precedence over the configured level. Fails if a global
/// subscriber is already installed.
pub fn setup_logging(config: &LoggingConfig) -> BridgeResult<()> {
    let level = config.parse_level()?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

    let span_events = if config.log_spans {
        FmtSpan::ACTIVE
    } else {
        FmtSpan::NONE
    };

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let installed = if config.json {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };

    installed.map_err(|e| BridgeError::logging(e.to_string()))?;
    tracing::info!("webvoice-bridge v{} logging initialized", crate::VERSION);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parsing() {
        assert_eq!(LoggingConfig::new("debug").parse_level().unwrap(), Level::DEBUG);
        assert_eq!(LoggingConfig::new("WARN").parse_level().unwrap(), Level::WARN);
        assert!(LoggingConfig::new("chatty").parse_level().is_err());
    }

    #[test]
    fn builder_flags() {
        let config = LoggingConfig::new("trace").with_json().with_file_info().with_spans();
        assert!(config.json && config.file_info && config.log_spans);
    }
}
