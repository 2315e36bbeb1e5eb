//! Coordinator error types

use rollout_registry::RegistryError;
use rollout_types::{PlanId, PlanValidationError, TargetId};
use thiserror::Error;

/// Coordinator errors
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Invalid plan: {0}")]
    InvalidPlan(#[from] PlanValidationError),

    #[error("Plan names unknown target: {0}")]
    UnknownTarget(TargetId),

    #[error("Plan names decommissioned target: {0}")]
    DecommissionedTarget(TargetId),

    #[error("Plan not found: {0}")]
    PlanNotFound(PlanId),

    #[error("Plan {0} has already finished")]
    PlanFinished(PlanId),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Plan store error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoordinatorError {
    /// The plan itself is unacceptable, as opposed to an infrastructure fault
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            CoordinatorError::InvalidPlan(_)
                | CoordinatorError::UnknownTarget(_)
                | CoordinatorError::DecommissionedTarget(_)
        )
    }
}

/// Result type for coordinator operations
pub type Result<T> = std::result::Result<T, CoordinatorError>;
