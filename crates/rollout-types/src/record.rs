//! Reconciliation records
//!
//! One record is appended per reconciliation attempt that moved a target out
//! of its resting state. Records are never modified after they are written.

use crate::{FailureKind, LifecycleState, PlanId, RecordId, TargetId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One state machine transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub from: LifecycleState,
    pub to: LifecycleState,
    pub at: chrono::DateTime<chrono::Utc>,
    /// Why the transition happened
    pub reason: String,
}

/// How a reconciliation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordOutcome {
    Succeeded,
    Failed { kind: FailureKind },
    RolledBack,
    Cancelled,
}

impl RecordOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RecordOutcome::Succeeded)
    }
}

impl fmt::Display for RecordOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordOutcome::Succeeded => f.write_str("succeeded"),
            RecordOutcome::Failed { kind } => write!(f, "failed ({})", kind),
            RecordOutcome::RolledBack => f.write_str("rolled back"),
            RecordOutcome::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Append-only history entry for one reconciliation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationRecord {
    pub id: RecordId,
    pub target_id: TargetId,
    /// Version the reconciliation was driving towards
    pub artifact_version: semver::Version,
    /// Plan that requested the reconciliation; None for manual rollbacks
    #[serde(default)]
    pub plan_id: Option<PlanId>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
    #[serde(flatten)]
    pub outcome: RecordOutcome,
    pub transitions: Vec<Transition>,
}

impl ReconciliationRecord {
    /// Final state reached, if any transition happened
    pub fn final_state(&self) -> Option<LifecycleState> {
        self.transitions.last().map(|t| t.to)
    }

    /// Number of times the given state was entered
    pub fn entries_into(&self, state: LifecycleState) -> usize {
        self.transitions.iter().filter(|t| t.to == state).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transition(from: LifecycleState, to: LifecycleState) -> Transition {
        Transition {
            from,
            to,
            at: chrono::Utc::now(),
            reason: String::new(),
        }
    }

    #[test]
    fn test_record_serializes_flat_outcome() {
        use LifecycleState::*;
        let now = chrono::Utc::now();
        let record = ReconciliationRecord {
            id: RecordId::generate(),
            target_id: TargetId::new("site-a"),
            artifact_version: semver::Version::new(1, 0, 0),
            plan_id: None,
            started_at: now,
            finished_at: now,
            outcome: RecordOutcome::Failed {
                kind: FailureKind::Corrupt,
            },
            transitions: vec![transition(Idle, Fetching), transition(Fetching, Failed)],
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["outcome"], "failed");
        assert_eq!(value["kind"], "corrupt");

        let back: ReconciliationRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back.final_state(), Some(Failed));
        assert_eq!(back.entries_into(Installing), 0);
        assert!(!back.outcome.is_success());
    }
}
