//! Error types for the Chime session core
//!
//! This module contains every error produced by the core: credential storage
//! failures, transport failures, state machine rejections, roster warnings and
//! the umbrella `ChimeError` that unifies them.

use crate::session::state::StateTransitionError;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Credential storage error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("Credential storage is not available")]
    Unavailable,
    #[error("Credential storage I/O failed: {reason}")]
    Io { reason: String },
    #[error("Credential storage is corrupt: {reason}")]
    Corrupt { reason: String },
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io {
            reason: err.to_string(),
        }
    }
}

/// Transport error types reported by a `ConnectionTransport`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },
    #[error("Authentication rejected: {reason}")]
    Rejected { reason: String },
    #[error("Disconnected: {reason}")]
    Disconnected { reason: String },
    #[error("Transport timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
    #[error("Transport is not available: {reason}")]
    Unavailable { reason: String },
}

/// Raised when a roster receives an entity whose id is already present
///
/// Non-fatal: the roster returns it and callers log it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Duplicate entity ignored: {id}")]
pub struct DuplicateEntityWarning {
    pub id: String,
}

// ----------------------------------------------------------------------------
// Core Error
// ----------------------------------------------------------------------------

/// Core error types for the Chime session lifecycle
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChimeError {
    /// connect() was called without an account or device token
    #[error("Missing credentials: {missing}")]
    MissingCredentials { missing: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("State transition error: {0}")]
    StateTransition(#[from] StateTransitionError),

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    /// Caller supplied an unusable argument
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// Channel communication error (runtime task gone)
    #[error("Channel error: {message}")]
    Channel { message: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl ChimeError {
    /// Create a missing credentials error naming the absent key
    pub fn missing_credentials<T: Into<String>>(missing: T) -> Self {
        ChimeError::MissingCredentials {
            missing: missing.into(),
        }
    }

    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        ChimeError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create an invalid input error with a reason
    pub fn invalid_input<T: Into<String>>(reason: T) -> Self {
        ChimeError::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Create a channel error with a message
    pub fn channel_error<T: Into<String>>(message: T) -> Self {
        ChimeError::Channel {
            message: message.into(),
        }
    }

    /// Create a transport connection failed error
    pub fn connection_failed<R: Into<String>>(reason: R) -> Self {
        ChimeError::Transport(TransportError::ConnectionFailed {
            reason: reason.into(),
        })
    }

    /// Whether this error came from the credential store
    pub fn is_storage(&self) -> bool {
        matches!(self, ChimeError::Storage(_))
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, ChimeError>;
pub type ChimeResult<T> = Result<T>;

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
