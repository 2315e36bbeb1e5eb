//! Error types for health probing

use thiserror::Error;

/// Errors building a prober. Probing itself never fails; every result is a
/// [`ProbeOutcome`](crate::ProbeOutcome).
#[derive(Debug, Error)]
pub enum HealthError {
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Result type for health operations
pub type HealthResult<T> = Result<T, HealthError>;
