//! Error types for observability

use thiserror::Error;

/// Observability errors
#[derive(Debug, Error)]
pub enum ObservabilityError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Audit error: {0}")]
    Audit(String),

    #[error("Logging error: {0}")]
    Logging(String),
}

/// Result type for observability operations
pub type Result<T> = std::result::Result<T, ObservabilityError>;
