//! Audit record types

use chrono::{DateTime, Utc};
use rollout_types::{
    LifecycleState, PlanId, PlanStatus, RecordOutcome, Transition, TargetId,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// What happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A target moved between lifecycle states
    Transition {
        from: LifecycleState,
        to: LifecycleState,
        reason: String,
    },

    /// A reconciliation reached its terminal outcome
    Outcome { outcome: RecordOutcome },

    /// A plan started dispatching
    PlanStarted { targets: usize },

    /// A plan finished
    PlanFinished { status: PlanStatus },

    /// A target was taken out of service
    TargetDecommissioned,
}

/// Audit record before it is linked into the chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialAuditRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Component or operator that caused the event
    pub actor: String,
    pub target_id: Option<TargetId>,
    pub artifact_version: Option<semver::Version>,
    pub plan_id: Option<PlanId>,
    #[serde(flatten)]
    pub event: AuditEvent,
}

impl PartialAuditRecord {
    pub fn new(actor: impl Into<String>, event: AuditEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            actor: actor.into(),
            target_id: None,
            artifact_version: None,
            plan_id: None,
            event,
        }
    }

    /// Record of one state machine transition
    pub fn transition(target_id: &TargetId, version: &semver::Version, transition: &Transition) -> Self {
        let mut record = Self::new(
            "reconciler",
            AuditEvent::Transition {
                from: transition.from,
                to: transition.to,
                reason: transition.reason.clone(),
            },
        )
        .target(target_id.clone())
        .version(version.clone());
        record.timestamp = transition.at;
        record
    }

    pub fn target(mut self, target_id: TargetId) -> Self {
        self.target_id = Some(target_id);
        self
    }

    pub fn version(mut self, version: semver::Version) -> Self {
        self.artifact_version = Some(version);
        self
    }

    pub fn plan(mut self, plan_id: Option<PlanId>) -> Self {
        self.plan_id = plan_id;
        self
    }

    fn hash(&self, previous_hash: Option<&str>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(self).unwrap_or_default());
        hasher.update(previous_hash.unwrap_or("").as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Link the record into the chain after `previous_hash`
    pub fn finalize(self, previous_hash: Option<String>) -> AuditRecord {
        let entry_hash = self.hash(previous_hash.as_deref());
        AuditRecord {
            record: self,
            previous_hash,
            entry_hash,
        }
    }
}

/// Chained, immutable audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    #[serde(flatten)]
    pub record: PartialAuditRecord,

    /// Hash of the previous record
    pub previous_hash: Option<String>,

    /// Hash of this record
    pub entry_hash: String,
}

impl AuditRecord {
    /// Recompute this record's hash from its content
    pub fn compute_hash(&self) -> String {
        self.record.hash(self.previous_hash.as_deref())
    }
}
