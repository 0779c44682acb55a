//! Error types for the call-event bridge
//!
//! Nothing in this crate is fatal to the process. Parse failures and OS-integration
//! failures are logged and swallowed at the point they occur; only host command
//! failures ([`CommandError`]) and activation routing failures ([`ActivationError`])
//! ever travel back to a caller.

use thiserror::Error;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Result type for host commands
pub type CommandResult<T> = Result<T, CommandError>;

/// Top-level errors raised while wiring or running the bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The script owner task is gone
    #[error("Script context unavailable: {message}")]
    ScriptUnavailable {
        /// Why the context is gone
        message: String,
    },

    /// Activation routing error
    #[error("Activation error: {0}")]
    Activation(#[from] ActivationError),

    /// Logging could not be installed
    #[error("Logging setup failed: {message}")]
    Logging {
        /// Subscriber diagnostic
        message: String,
    },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal {
        /// Error details
        message: String,
    },
}

impl BridgeError {
    /// Create a script-unavailable error
    pub fn script_unavailable(message: impl Into<String>) -> Self {
        Self::ScriptUnavailable {
            message: message.into(),
        }
    }

    /// Create a logging error
    pub fn logging(message: impl Into<String>) -> Self {
        Self::Logging {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML document could not be parsed
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration file could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        /// Path that was read
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A field holds an unusable value
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Offending field name
        field: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// The log level string is not recognised
    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),
}

impl ConfigError {
    /// Create an invalid-value error
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Failure of a host command, delivered as a `(kind, message)` pair
///
/// The kind strings are part of the host contract and are reproduced verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Argument shape rejected before any script ran (`tokens`, `toggleMute`)
    #[error("Invalid Arguments: {0}")]
    InvalidArguments(String),

    /// Argument values rejected before any script ran (`makeCall`, `missedCall`)
    #[error("INVALID_ARGUMENTS: {0}")]
    InvalidArgumentValues(String),

    /// The script context is not available
    #[error("NOT_READY: {0}")]
    NotReady(String),

    /// Device setup returned `false`
    #[error("Setup Failed: {0}")]
    SetupFailed(String),

    /// Outgoing call could not be placed
    #[error("CALL_FAILED: {0}")]
    CallFailed(String),

    /// Answer script faulted
    #[error("ANSWER_FAILED: {0}")]
    AnswerFailed(String),

    /// Hang-up script faulted
    #[error("HANGUP_FAILED: {0}")]
    HangUpFailed(String),

    /// Mute script returned something other than a boolean or null
    #[error("MUTE_FAILED: {0}")]
    MuteFailed(String),

    /// Unregister script did not return `true`
    #[error("UNREGISTER_FAILED: {0}")]
    UnregisterFailed(String),

    /// The pending command was dropped before it completed
    #[error("CANCELLED: {0}")]
    Cancelled(String),

    /// The host invoked a method this bridge does not know
    #[error("method not implemented: {0}")]
    NotImplemented(String),
}

impl CommandError {
    /// The literal error kind handed to the host
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArguments(_) => "Invalid Arguments",
            Self::InvalidArgumentValues(_) => "INVALID_ARGUMENTS",
            Self::NotReady(_) => "NOT_READY",
            Self::SetupFailed(_) => "Setup Failed",
            Self::CallFailed(_) => "CALL_FAILED",
            Self::AnswerFailed(_) => "ANSWER_FAILED",
            Self::HangUpFailed(_) => "HANGUP_FAILED",
            Self::MuteFailed(_) => "MUTE_FAILED",
            Self::UnregisterFailed(_) => "UNREGISTER_FAILED",
            Self::Cancelled(_) => "CANCELLED",
            Self::NotImplemented(_) => "NOT_IMPLEMENTED",
        }
    }

    /// The diagnostic message handed to the host
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidArguments(m)
            | Self::InvalidArgumentValues(m)
            | Self::NotReady(m)
            | Self::SetupFailed(m)
            | Self::CallFailed(m)
            | Self::AnswerFailed(m)
            | Self::HangUpFailed(m)
            | Self::MuteFailed(m)
            | Self::UnregisterFailed(m)
            | Self::Cancelled(m)
            | Self::NotImplemented(m) => m,
        }
    }

    /// True for errors raised before any script execution was attempted
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArguments(_) | Self::InvalidArgumentValues(_))
    }
}

/// Activation routing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivationError {
    /// The invocation string is malformed or names an unknown action
    #[error("invalid activation argument: {0}")]
    InvalidArgument(String),

    /// No router is registered for this process
    #[error("no activation router registered")]
    NotRegistered,
}

/// OS notification API failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("notifier {operation} failed: {details}")]
pub struct NotifierError {
    /// The failing operation (`show`, `hide`, `initialize`)
    pub operation: &'static str,
    /// OS diagnostic
    pub details: String,
}

impl NotifierError {
    /// Create a notifier error for an operation
    pub fn new(operation: &'static str, details: impl Into<String>) -> Self {
        Self {
            operation,
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_error_kinds_are_host_literals() {
        assert_eq!(CommandError::InvalidArguments("x".into()).kind(), "Invalid Arguments");
        assert_eq!(CommandError::InvalidArgumentValues("x".into()).kind(), "INVALID_ARGUMENTS");
        assert_eq!(CommandError::SetupFailed("false".into()).kind(), "Setup Failed");
        assert_eq!(CommandError::HangUpFailed("boom".into()).message(), "boom");
    }

    #[test]
    fn invalid_argument_classification() {
        assert!(CommandError::InvalidArguments("m".into()).is_invalid_argument());
        assert!(CommandError::InvalidArgumentValues("m".into()).is_invalid_argument());
        assert!(!CommandError::CallFailed("m".into()).is_invalid_argument());
    }
}
