//! Bridge configuration
//!
//! Configuration is plain serde data so it can live in a TOML file next to the host
//! application, or be assembled in code through [`BridgeConfigBuilder`].
//!
//! ```rust
//! use webvoice_bridge::config::BridgeConfig;
//!
//! let config = BridgeConfig::from_toml_str(r#"
//!     app_id = "Acme.Phone"
//!     permission_timeout_ms = 5000
//! "#).unwrap();
//!
//! assert_eq!(config.app_id.as_deref(), Some("Acme.Phone"));
//! assert_eq!(config.caller_name_key, "__TWI_CALLER_NAME");
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::logging::LoggingConfig;

/// Suffix appended to the executable name when no app identity is configured
const DERIVED_APP_ID_SUFFIX: &str = ".App";

/// Runtime configuration for [`crate::VoiceBridge`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Stable application identity used for notification registration
    pub app_id: Option<String>,
    /// Human readable name registered alongside the identity
    pub display_name: String,
    /// Custom parameter that carries the caller's display name
    pub caller_name_key: String,
    /// Caller line shown when the caller name is empty
    pub unknown_caller_label: String,
    /// How long a microphone permission check waits for the script's answer
    pub permission_timeout_ms: u64,
    /// Capacity hint for internal event queues
    pub event_buffer: usize,
    /// Codec preference list handed to the device
    pub codec_preferences: Vec<String>,
    /// Ask the SDK to warn before the page closes during a call
    pub close_protection: bool,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            display_name: "WebVoice".to_string(),
            caller_name_key: "__TWI_CALLER_NAME".to_string(),
            unknown_caller_label: "Unknown Caller".to_string(),
            permission_timeout_ms: 10_000,
            event_buffer: 1000,
            codec_preferences: vec!["opus".to_string(), "pcmu".to_string()],
            close_protection: true,
            logging: LoggingConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Start a builder from the defaults
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::new()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Check that every field holds a usable value
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(app_id) = &self.app_id {
            if app_id.trim().is_empty() {
                return Err(ConfigError::invalid("app_id", "must not be blank when set"));
            }
        }
        if self.caller_name_key.is_empty() {
            return Err(ConfigError::invalid("caller_name_key", "must not be empty"));
        }
        if self.permission_timeout_ms == 0 {
            return Err(ConfigError::invalid("permission_timeout_ms", "must be greater than zero"));
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::invalid("event_buffer", "must be greater than zero"));
        }
        if self.codec_preferences.is_empty() {
            return Err(ConfigError::invalid("codec_preferences", "at least one codec is required"));
        }
        self.logging.parse_level()?;
        Ok(())
    }

    /// Permission check timeout as a [`Duration`]
    pub fn permission_timeout(&self) -> Duration {
        Duration::from_millis(self.permission_timeout_ms)
    }

    /// The configured identity, or one derived from the running executable
    pub fn resolve_app_id(&self) -> String {
        match &self.app_id {
            Some(id) => id.clone(),
            None => derive_app_id(std::env::current_exe().ok().as_deref()),
        }
    }
}

/// Derive `<executable stem>.App`, falling back to `WebVoice.App`
pub fn derive_app_id(executable: Option<&Path>) -> String {
    let stem = executable
        .and_then(|path| path.file_stem())
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or("WebVoice");
    format!("{}{}", stem, DERIVED_APP_ID_SUFFIX)
}

/// Builder for [`BridgeConfig`]
#[derive(Debug, Clone, Default)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application identity
    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.config.app_id = Some(app_id.into());
        self
    }

    /// Set the registered display name
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.config.display_name = name.into();
        self
    }

    /// Set the custom parameter that names the caller
    pub fn caller_name_key(mut self, key: impl Into<String>) -> Self {
        self.config.caller_name_key = key.into();
        self
    }

    /// Set the label used when the caller is anonymous
    pub fn unknown_caller_label(mut self, label: impl Into<String>) -> Self {
        self.config.unknown_caller_label = label.into();
        self
    }

    /// Set the microphone permission timeout
    pub fn permission_timeout(mut self, timeout: Duration) -> Self {
        self.config.permission_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the internal queue capacity hint
    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.config.event_buffer = capacity;
        self
    }

    /// Replace the codec preference list
    pub fn codec_preferences<I, S>(mut self, codecs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.codec_preferences = codecs.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable close protection
    pub fn close_protection(mut self, enable: bool) -> Self {
        self.config.close_protection = enable;
        self
    }

    /// Replace the logging configuration
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.config.logging = logging;
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> Result<BridgeConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
