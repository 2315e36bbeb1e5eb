//! Rollout status and final report

use crate::{DeploymentPlan, FailureKind, PlanId, TargetId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a rollout stopped dispatching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AbortReason {
    /// Cumulative failure ratio went above the plan's threshold
    FailureThreshold { ratio: f64, threshold: f64 },
    /// Operator requested an abort
    Operator,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::FailureThreshold { ratio, threshold } => write!(
                f,
                "failure ratio {:.2} exceeded threshold {:.2}",
                ratio, threshold
            ),
            AbortReason::Operator => f.write_str("aborted by operator"),
        }
    }
}

/// Status of a rollout plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    Running,
    Succeeded,
    /// Every batch ran but some targets did not converge
    PartiallySucceeded { failed: Vec<TargetId> },
    Aborted { reason: AbortReason },
}

impl PlanStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, PlanStatus::Pending | PlanStatus::Running)
    }

    /// Process exit code for a finished plan
    pub fn exit_code(&self) -> i32 {
        match self {
            PlanStatus::Succeeded => 0,
            _ => 1,
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanStatus::Pending => f.write_str("pending"),
            PlanStatus::Running => f.write_str("running"),
            PlanStatus::Succeeded => f.write_str("succeeded"),
            PlanStatus::PartiallySucceeded { failed } => {
                write!(f, "partially succeeded ({} failed)", failed.len())
            }
            PlanStatus::Aborted { reason } => write!(f, "aborted: {}", reason),
        }
    }
}

/// Per-target result of a rollout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TargetResult {
    Converged,
    /// Already on the desired version, nothing installed
    AlreadyConverged,
    RolledBack,
    Failed { kind: FailureKind },
    Cancelled,
    /// Never dispatched because the plan stopped first
    Untouched,
}

impl TargetResult {
    pub fn is_success(&self) -> bool {
        matches!(self, TargetResult::Converged | TargetResult::AlreadyConverged)
    }

    /// Counts towards the plan's failure ratio
    pub fn is_failure(&self) -> bool {
        matches!(self, TargetResult::RolledBack | TargetResult::Failed { .. })
    }
}

impl fmt::Display for TargetResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetResult::Converged => f.write_str("converged"),
            TargetResult::AlreadyConverged => f.write_str("already converged"),
            TargetResult::RolledBack => f.write_str("rolled back"),
            TargetResult::Failed { kind } => write!(f, "failed ({})", kind),
            TargetResult::Cancelled => f.write_str("cancelled"),
            TargetResult::Untouched => f.write_str("untouched"),
        }
    }
}

/// Outcome of one target within a rollout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetOutcome {
    pub target_id: TargetId,
    #[serde(flatten)]
    pub result: TargetResult,
    /// Batch the target was dispatched in, None when untouched
    #[serde(default)]
    pub batch: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Report of a rollout plan, also used for in-flight status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutReport {
    pub plan_id: PlanId,
    pub desired_version: semver::Version,
    #[serde(flatten)]
    pub status: PlanStatus,
    pub started_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Outcomes in plan order
    pub targets: Vec<TargetOutcome>,
}

impl RolloutReport {
    /// Report for a plan that has not dispatched anything yet
    pub fn new(plan: &DeploymentPlan) -> Self {
        Self {
            plan_id: plan.id(),
            desired_version: plan.desired_version().clone(),
            status: PlanStatus::Pending,
            started_at: chrono::Utc::now(),
            finished_at: None,
            targets: plan
                .targets()
                .iter()
                .map(|id| TargetOutcome {
                    target_id: id.clone(),
                    result: TargetResult::Untouched,
                    batch: None,
                    message: None,
                })
                .collect(),
        }
    }

    /// Replace the outcome of `outcome.target_id`
    pub fn record(&mut self, outcome: TargetOutcome) {
        match self
            .targets
            .iter_mut()
            .find(|t| t.target_id == outcome.target_id)
        {
            Some(slot) => *slot = outcome,
            None => self.targets.push(outcome),
        }
    }

    /// Targets that ran a reconciliation for this plan, or found nothing to do
    pub fn dispatched(&self) -> usize {
        self.count(|r| !matches!(r, TargetResult::Untouched | TargetResult::Cancelled))
    }

    /// Failures over dispatched targets, 0.0 before anything ran
    pub fn failure_ratio(&self) -> f64 {
        match self.dispatched() {
            0 => 0.0,
            dispatched => self.failed() as f64 / dispatched as f64,
        }
    }

    /// Targets that did not end up on the desired version
    pub fn unsuccessful(&self) -> Vec<TargetId> {
        self.targets
            .iter()
            .filter(|t| !t.result.is_success())
            .map(|t| t.target_id.clone())
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&TargetResult) -> bool) -> usize {
        self.targets.iter().filter(|t| pred(&t.result)).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(TargetResult::is_success)
    }

    pub fn failed(&self) -> usize {
        self.count(TargetResult::is_failure)
    }

    pub fn untouched(&self) -> usize {
        self.count(|r| matches!(r, TargetResult::Untouched))
    }

    pub fn outcome_for(&self, target: &TargetId) -> Option<&TargetOutcome> {
        self.targets.iter().find(|t| &t.target_id == target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(PlanStatus::Succeeded.exit_code(), 0);
        assert_eq!(
            PlanStatus::PartiallySucceeded {
                failed: vec![TargetId::new("a")]
            }
            .exit_code(),
            1
        );
        assert_eq!(
            PlanStatus::Aborted {
                reason: AbortReason::Operator
            }
            .exit_code(),
            1
        );
        assert!(!PlanStatus::Running.is_finished());
    }

    #[test]
    fn test_report_counts() {
        let outcome = |id: &str, result| TargetOutcome {
            target_id: TargetId::new(id),
            result,
            batch: Some(0),
            message: None,
        };
        let report = RolloutReport {
            plan_id: PlanId::generate(),
            desired_version: semver::Version::new(1, 0, 0),
            status: PlanStatus::PartiallySucceeded {
                failed: vec![TargetId::new("c"), TargetId::new("d")],
            },
            started_at: chrono::Utc::now(),
            finished_at: None,
            targets: vec![
                outcome("a", TargetResult::Converged),
                outcome("b", TargetResult::AlreadyConverged),
                outcome("c", TargetResult::RolledBack),
                outcome(
                    "d",
                    TargetResult::Failed {
                        kind: FailureKind::Corrupt,
                    },
                ),
                outcome("e", TargetResult::Untouched),
            ],
        };

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 2);
        assert_eq!(report.untouched(), 1);
        assert_eq!(report.dispatched(), 4);
        assert_eq!(report.failure_ratio(), 0.5);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "partially_succeeded");
        assert_eq!(json["targets"][3]["result"], "failed");
        assert_eq!(json["targets"][3]["kind"], "corrupt");
        let back: RolloutReport = serde_json::from_value(json).unwrap();
        assert_eq!(back, report);
    }
}
