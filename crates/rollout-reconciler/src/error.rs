//! Reconciler error types
//!
//! Only infrastructure faults leave the reconciler as errors. Every
//! collaborator result is classified into a `FailureKind` and handled by the
//! state machine instead.

use rollout_registry::RegistryError;
use rollout_types::{LifecycleState, TargetId};
use thiserror::Error;

/// Reconciler errors
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Unknown target: {0}")]
    UnknownTarget(TargetId),

    #[error("Target is decommissioned: {0}")]
    Decommissioned(TargetId),

    #[error("Target {0} has no prior version to roll back to")]
    NoPriorVersion(TargetId),

    #[error("Target {target} cannot be rolled back from state {state}")]
    NotRollbackable {
        target: TargetId,
        state: LifecycleState,
    },

    #[error("Illegal transition {from} -> {to}")]
    IllegalTransition {
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Record store error: {0}")]
    Records(String),
}

/// Result type for reconciler operations
pub type Result<T> = std::result::Result<T, ReconcileError>;
