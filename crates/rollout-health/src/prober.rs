//! Health prober contract

use async_trait::async_trait;
use rollout_types::{Credentials, FailureKind, HealthStatus, Target, VerificationStep};
use std::fmt;
use std::time::Duration;

/// Classified result of probing a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Healthy,
    /// Target responded and reported a bad state
    Unhealthy { reason: String },
    /// No response within the timeout
    Unreachable { reason: String },
}

impl ProbeOutcome {
    pub fn unhealthy(reason: impl Into<String>) -> Self {
        ProbeOutcome::Unhealthy {
            reason: reason.into(),
        }
    }

    pub fn unreachable(reason: impl Into<String>) -> Self {
        ProbeOutcome::Unreachable {
            reason: reason.into(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeOutcome::Healthy)
    }

    pub fn status(&self) -> HealthStatus {
        match self {
            ProbeOutcome::Healthy => HealthStatus::Healthy,
            ProbeOutcome::Unhealthy { .. } => HealthStatus::Unhealthy,
            ProbeOutcome::Unreachable { .. } => HealthStatus::Unreachable,
        }
    }

    /// Failure kind, None when healthy
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ProbeOutcome::Healthy => None,
            ProbeOutcome::Unhealthy { .. } => Some(FailureKind::Unhealthy),
            ProbeOutcome::Unreachable { .. } => Some(FailureKind::Unreachable),
        }
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Healthy => f.write_str("healthy"),
            ProbeOutcome::Unhealthy { reason } => write!(f, "unhealthy: {}", reason),
            ProbeOutcome::Unreachable { reason } => write!(f, "unreachable: {}", reason),
        }
    }
}

/// Queries a target to decide whether its running version is healthy
#[async_trait]
pub trait HealthProber: Send + Sync {
    /// Run `steps` against `target`; the whole probe is bounded by `timeout`,
    /// and running out of time is reported as `Unreachable`.
    async fn probe(
        &self,
        target: &Target,
        steps: &[VerificationStep],
        credentials: &Credentials,
        timeout: Duration,
    ) -> ProbeOutcome;
}
