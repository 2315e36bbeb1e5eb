//! Registry error types

use rollout_types::TargetId;
use thiserror::Error;

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Target not found: {0}")]
    TargetNotFound(TargetId),

    #[error("Target already exists: {0}")]
    TargetAlreadyExists(TargetId),

    #[error("Invalid target id: '{0}'")]
    InvalidTargetId(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
