//! Error types for the room view

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type alias using the room view Error
pub type Result<T> = std::result::Result<T, Error>;

/// Why the collaborator ended a session abnormally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectReason {
    /// Numeric code reported by the collaborator, if any
    pub code: Option<u32>,

    /// Human-readable description
    pub message: String,
}

impl DisconnectReason {
    pub fn new(code: Option<u32>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}

/// Errors that can occur while joining and presenting a room
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Credential rejected, network failure, or no usable media during join
    #[error("Connection error: {0}")]
    Connection(String),

    /// Camera or microphone acquisition failed
    #[error("Device error: {0}")]
    Device(String),

    /// The collaborator terminated the session abnormally
    #[error("Disconnected: {0}")]
    Disconnected(DisconnectReason),

    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A command referenced a participant that is not in the room
    #[error("Participant not found: {0}")]
    ParticipantNotFound(String),

    /// Publishing or unpublishing a local track failed
    #[error("Publish error: {0}")]
    Publish(String),

    /// The session has already been torn down
    #[error("Session closed")]
    SessionClosed,

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error ends the join operation
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Disconnected(_))
    }

    /// Check if this error came from media device acquisition
    pub fn is_device_error(&self) -> bool {
        matches!(self, Error::Device(_))
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Connection("token expired".to_string());
        assert_eq!(err.to_string(), "Connection error: token expired");

        let err = Error::Disconnected(DisconnectReason::new(Some(53000), "signaling lost"));
        assert_eq!(err.to_string(), "Disconnected: signaling lost (code 53000)");
    }

    #[test]
    fn test_error_is_fatal() {
        assert!(Error::Connection("x".to_string()).is_fatal());
        assert!(Error::Disconnected(DisconnectReason::new(None, "x")).is_fatal());
        assert!(!Error::Device("x".to_string()).is_fatal());
        assert!(!Error::SessionClosed.is_fatal());
    }

    #[test]
    fn test_error_is_device_error() {
        assert!(Error::Device("camera busy".to_string()).is_device_error());
        assert!(!Error::Publish("x".to_string()).is_device_error());
    }
}
