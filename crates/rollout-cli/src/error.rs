//! CLI error types

use rollout_coordinator::CoordinatorError;
use rollout_health::HealthError;
use rollout_observability::ObservabilityError;
use rollout_reconciler::ReconcileError;
use rollout_registry::RegistryError;
use thiserror::Error;

/// Exit code for invalid operator input
pub const EXIT_INVALID_INPUT: i32 = 2;

/// CLI error types
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Plan file could not be read, parsed or validated
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Health prober error: {0}")]
    Health(#[from] HealthError),

    #[error(transparent)]
    Observability(#[from] ObservabilityError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Process exit code: 2 for anything the operator can fix by changing
    /// their input, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::InvalidPlan(_) | CliError::InvalidInput(_) | CliError::NotFound(_) => {
                EXIT_INVALID_INPUT
            }
            CliError::Coordinator(e) if e.is_invalid_input() => EXIT_INVALID_INPUT,
            CliError::Coordinator(CoordinatorError::PlanNotFound(_)) => EXIT_INVALID_INPUT,
            CliError::Registry(
                RegistryError::TargetNotFound(_)
                | RegistryError::TargetAlreadyExists(_)
                | RegistryError::InvalidTargetId(_),
            ) => EXIT_INVALID_INPUT,
            CliError::Reconcile(
                ReconcileError::UnknownTarget(_)
                | ReconcileError::Decommissioned(_)
                | ReconcileError::NoPriorVersion(_)
                | ReconcileError::NotRollbackable { .. },
            ) => EXIT_INVALID_INPUT,
            _ => 1,
        }
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
