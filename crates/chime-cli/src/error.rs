//! Error handling for the Chime CLI

use thiserror::Error;

use crate::config::ConfigError;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Core(#[from] chime_core::ChimeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential storage error: {0}")]
    Storage(#[from] chime_core::StorageError),

    #[error("Replay error: {0}")]
    Replay(String),

    #[error("Session failed: {0}")]
    SessionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
