//! Failure taxonomy
//!
//! Every result coming back from a collaborator (artifact store, install
//! action, health prober, secret store) is mapped to one of these kinds
//! before the reconciler acts on it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classified failure kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Artifact not (yet) published, or the store did not answer in time
    NotFound,
    /// Artifact published but its fingerprint does not match the manifest
    Corrupt,
    /// No response from the target within the timeout
    Unreachable,
    /// Target responded and reported a bad state
    Unhealthy,
    /// Install action reported failure
    InstallFailed,
    /// Per-target attempt budget for the plan is exhausted
    AttemptBudgetExceeded,
    /// Operator cancelled the reconciliation at a state boundary
    Cancelled,
}

impl FailureKind {
    /// Retryable kinds are absorbed by the reconciler's backoff loop.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::NotFound | FailureKind::Unreachable)
    }

    /// Kinds that need an operator to look at the target.
    pub fn requires_escalation(&self) -> bool {
        matches!(
            self,
            FailureKind::Corrupt | FailureKind::AttemptBudgetExceeded
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::NotFound => "not_found",
            FailureKind::Corrupt => "corrupt",
            FailureKind::Unreachable => "unreachable",
            FailureKind::Unhealthy => "unhealthy",
            FailureKind::InstallFailed => "install_failed",
            FailureKind::AttemptBudgetExceeded => "attempt_budget_exceeded",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Last error recorded on a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetError {
    /// Classified kind
    pub kind: FailureKind,

    /// Human readable detail
    pub message: String,

    /// When the error was observed
    pub at: chrono::DateTime<chrono::Utc>,
}

impl TargetError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            at: chrono::Utc::now(),
        }
    }
}

impl fmt::Display for TargetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(FailureKind::NotFound.is_retryable());
        assert!(FailureKind::Unreachable.is_retryable());
        assert!(!FailureKind::Corrupt.is_retryable());
        assert!(!FailureKind::Unhealthy.is_retryable());
        assert!(!FailureKind::AttemptBudgetExceeded.is_retryable());
    }

    #[test]
    fn test_serialized_form() {
        let json = serde_json::to_string(&FailureKind::AttemptBudgetExceeded).unwrap();
        assert_eq!(json, "\"attempt_budget_exceeded\"");
        assert_eq!(FailureKind::InstallFailed.to_string(), "install_failed");
    }
}
