//! Deployment targets and their lifecycle
//!
//! A Target is one on-premise endpoint being converged to a desired
//! version. Records are only ever mutated by the reconciler and are never
//! deleted, only marked decommissioned.

use crate::{FailureKind, TargetError, TargetId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Reconciliation lifecycle state of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// No reconciliation has touched the target yet
    Idle,
    /// Resolving and validating the desired artifact
    Fetching,
    /// Install action dispatched to the target
    Installing,
    /// Waiting for the health prober to confirm the new version
    Verifying,
    /// Desired version installed and verified healthy
    Converged,
    /// Reapplying the last known-good artifact
    RollingBack,
    /// Last known-good artifact reapplied and verified healthy
    RolledBack,
    /// Unrecoverable, needs external intervention
    Failed,
}

impl LifecycleState {
    /// Terminal states end a reconciliation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleState::Converged | LifecycleState::RolledBack | LifecycleState::Failed
        )
    }

    /// A target at rest may start a new reconciliation.
    pub fn is_at_rest(&self) -> bool {
        matches!(self, LifecycleState::Idle) || self.is_terminal()
    }

    /// Legal transitions of the reconciliation state machine.
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;

        if next == Failed {
            return !matches!(self, Failed | Idle);
        }

        match (self, next) {
            (from, Fetching) => from.is_at_rest(),
            (Fetching, Installing) => true,
            // cancellation observed before any install was dispatched
            (Fetching, to) if to.is_at_rest() => true,
            (Installing, Verifying) => true,
            (Installing, RollingBack) => true,
            (Verifying, Converged) => true,
            (Verifying, RollingBack) => true,
            // operator-requested rollback of a settled target
            (Converged, RollingBack) | (Failed, RollingBack) => true,
            (RollingBack, RolledBack) => true,
            _ => false,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Fetching => "fetching",
            LifecycleState::Installing => "installing",
            LifecycleState::Verifying => "verifying",
            LifecycleState::Converged => "converged",
            LifecycleState::RollingBack => "rolling_back",
            LifecycleState::RolledBack => "rolled_back",
            LifecycleState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Result of the last health check against a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
    Unreachable,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unreachable => "unreachable",
        };
        f.write_str(s)
    }
}

/// A deployment target and its last observed state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Stable identity
    pub id: TargetId,

    /// Version last verified healthy on the target
    pub observed_version: Option<semver::Version>,

    /// Version that was observed before the current one converged
    #[serde(default)]
    pub previous_version: Option<semver::Version>,

    /// Current lifecycle state
    pub state: LifecycleState,

    /// Last health-check result
    #[serde(default)]
    pub health: HealthStatus,

    /// Last classified error, cleared on convergence
    #[serde(default)]
    pub last_error: Option<TargetError>,

    /// Failures since the last successful step
    #[serde(default)]
    pub consecutive_failures: u32,

    /// Decommissioned targets are kept but never reconciled
    #[serde(default)]
    pub decommissioned: bool,

    /// Address used by the install action and the health prober
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Free-form labels (client, site, region)
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Last mutation timestamp
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Target {
    /// Create a target that has never been reconciled
    pub fn new(id: impl Into<TargetId>) -> Self {
        Self {
            id: id.into(),
            observed_version: None,
            previous_version: None,
            state: LifecycleState::Idle,
            health: HealthStatus::Unknown,
            last_error: None,
            consecutive_failures: 0,
            decommissioned: false,
            endpoint: None,
            labels: BTreeMap::new(),
            updated_at: chrono::Utc::now(),
        }
    }

    /// Seed a target with a version already running on it
    pub fn with_version(mut self, version: semver::Version) -> Self {
        self.observed_version = Some(version);
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Already running `version`, so nothing to do unless forced.
    pub fn is_converged_on(&self, version: &semver::Version) -> bool {
        self.observed_version.as_ref() == Some(version)
            && matches!(
                self.state,
                LifecycleState::Converged | LifecycleState::Idle | LifecycleState::RolledBack
            )
    }

    /// Kind of the last error, if any
    pub fn last_failure_kind(&self) -> Option<FailureKind> {
        self.last_error.as_ref().map(|e| e.kind)
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now();
    }
}
