use thiserror::Error;

use crate::types::{Command, ValueKind};

/// Errors that can occur when working with RoboVac devices
///
/// The error is `Clone` so that a single failed status fetch can be handed to
/// every caller that joined it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RobovacError {
    /// Two command specs of one model share a command or a wire code
    #[error(
        "Duplicate command spec for {conflict} in model '{model_id}' ({model_name}): existing {existing}, duplicate {duplicate}"
    )]
    DuplicateSpec {
        /// Model id whose table is inconsistent
        model_id: String,
        /// Model name whose table is inconsistent
        model_name: String,
        /// The conflicting key, e.g. `command 'Running'` or `code 152`
        conflict: String,
        /// Description of the entry that was registered first
        existing: String,
        /// Description of the rejected entry
        duplicate: String,
    },

    /// The configured model id has no command table
    #[error("Unsupported RoboVac model '{model_id}'. Supported models: {}", supported.join(", "))]
    UnsupportedModel {
        /// Requested model id
        model_id: String,
        /// All known model ids
        supported: Vec<String>,
    },

    /// The command is absent from the model's registry
    #[error("Command {command} is not supported by RoboVac model {model_id}")]
    CommandNotSupported {
        /// Requested command
        command: Command,
        /// Model of the device
        model_id: String,
    },

    /// A semantic value has no raw wire token for this model
    #[error("Value '{value}' for command {command} is not supported by RoboVac model {model_id}")]
    ValueNotSupported {
        /// Friendly text of the rejected value
        value: String,
        /// Command the value was meant for
        command: Command,
        /// Model of the device
        model_id: String,
    },

    /// A value of the wrong kind was supplied for a command
    #[error("Invalid value type for command {command}: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Command being written
        command: Command,
        /// Kind declared by the command spec
        expected: ValueKind,
        /// Kind of the supplied value
        actual: String,
    },

    /// Discovery or session setup failed
    ///
    /// Raised by [`crate::Transport`] implementations from `find` or
    /// `connect`.
    #[error("Failed to connect to device: {0}")]
    ConnectionFailed(String),

    /// The session was closed while a request was pending
    ///
    /// Raised by [`crate::Transport`] implementations.
    #[error("Device disconnected")]
    Disconnected,

    /// The transport reported a failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Caller-side deadline expired
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// The device answered with a frame the transport could not decode
    ///
    /// Raised by [`crate::Transport`] implementations. Individual data points
    /// that do not fit the model are never reported this way; decoding logs
    /// them instead.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Other errors
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for RoboVac operations
pub type Result<T> = std::result::Result<T, RobovacError>;

impl RobovacError {
    /// Check if this error indicates a connection issue
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_) | Self::Disconnected | Self::Transport(_)
        )
    }

    /// Check if retrying the same request may succeed
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::ConnectionFailed(_)
                | Self::Disconnected
                | Self::Transport(_)
        )
    }

    /// Check if this error marks the cached device state as invalid
    #[must_use]
    pub const fn invalidates_cache(&self) -> bool {
        self.is_connection_error() || matches!(self, Self::Protocol(_))
    }

    /// Check if this error is fatal for the device configuration
    #[must_use]
    pub const fn is_configuration_error(&self) -> bool {
        matches!(self, Self::DuplicateSpec { .. } | Self::UnsupportedModel { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let connection_error = RobovacError::ConnectionFailed("test".to_string());
        assert!(connection_error.is_connection_error());
        assert!(connection_error.is_recoverable());
        assert!(connection_error.invalidates_cache());

        let timeout_error = RobovacError::Timeout { timeout_ms: 1000 };
        assert!(!timeout_error.is_connection_error());
        assert!(timeout_error.is_recoverable());
        assert!(!timeout_error.invalidates_cache());

        let mismatch = RobovacError::TypeMismatch {
            command: Command::Running,
            expected: ValueKind::Boolean,
            actual: "String".to_string(),
        };
        assert!(!mismatch.is_connection_error());
        assert!(!mismatch.is_recoverable());

        let unsupported = RobovacError::UnsupportedModel {
            model_id: "T9999".to_string(),
            supported: vec!["T0000".to_string()],
        };
        assert!(unsupported.is_configuration_error());
    }

    #[test]
    fn test_error_display() {
        let error = RobovacError::CommandNotSupported {
            command: Command::Running,
            model_id: "T2275".to_string(),
        };
        let error_string = format!("{error}");
        assert!(error_string.contains("Running"));
        assert!(error_string.contains("T2275"));

        let error = RobovacError::UnsupportedModel {
            model_id: "T9999".to_string(),
            supported: vec!["T0000".to_string(), "T2080".to_string()],
        };
        assert!(format!("{error}").contains("T0000, T2080"));
    }

    #[test]
    fn test_type_mismatch_display() {
        let error = RobovacError::TypeMismatch {
            command: Command::BatteryLevel,
            expected: ValueKind::Number,
            actual: "Boolean".to_string(),
        };
        let error_string = error.to_string();
        assert!(error_string.contains("expected Number"));
        assert!(error_string.contains("got Boolean"));
    }
}
