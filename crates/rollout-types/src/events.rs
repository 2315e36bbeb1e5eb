//! Event types for rollout progress
//!
//! The coordinator publishes one stream of events per process; the CLI and
//! the audit log both consume it.

use crate::{AbortReason, FailureKind, LifecycleState, PlanId, PlanStatus, TargetId, TargetResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all rollout events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutEventEnvelope {
    /// Unique event ID
    pub id: Uuid,

    /// Event timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Event severity
    pub severity: EventSeverity,

    /// Plan the event belongs to, if any
    pub plan_id: Option<PlanId>,

    /// The actual event
    pub event: RolloutEvent,
}

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    Info,
    Warning,
    Error,
}

/// Rollout events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RolloutEvent {
    // ═══════════════════════════════════════════════════════════════════
    // PLAN EVENTS
    // ═══════════════════════════════════════════════════════════════════
    /// Plan accepted and dispatch started
    PlanStarted {
        plan_id: PlanId,
        desired_version: semver::Version,
        targets: usize,
        batches: usize,
    },

    /// Dispatch halted before all batches ran
    PlanAborted { plan_id: PlanId, reason: AbortReason },

    /// Plan finished with a final status
    PlanFinished { plan_id: PlanId, status: PlanStatus },

    // ═══════════════════════════════════════════════════════════════════
    // BATCH EVENTS
    // ═══════════════════════════════════════════════════════════════════
    /// Batch dispatched
    BatchStarted {
        plan_id: PlanId,
        index: usize,
        canary: bool,
        targets: usize,
    },

    /// Every target of the batch reached a terminal state
    BatchCompleted {
        plan_id: PlanId,
        index: usize,
        failures: usize,
        failure_ratio: f64,
    },

    // ═══════════════════════════════════════════════════════════════════
    // TARGET EVENTS
    // ═══════════════════════════════════════════════════════════════════
    /// A target moved through the reconciliation state machine
    TargetTransitioned {
        target_id: TargetId,
        from: LifecycleState,
        to: LifecycleState,
    },

    /// A retryable failure was absorbed and will be retried
    TargetRetrying {
        target_id: TargetId,
        kind: FailureKind,
        attempt: u32,
    },

    /// A target's reconciliation for the plan finished
    TargetFinished {
        plan_id: PlanId,
        target_id: TargetId,
        result: TargetResult,
    },
}

impl RolloutEventEnvelope {
    /// Create a new event envelope
    pub fn new(event: RolloutEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            severity: Self::infer_severity(&event),
            plan_id: event.plan_id(),
            event,
        }
    }

    fn infer_severity(event: &RolloutEvent) -> EventSeverity {
        match event {
            RolloutEvent::PlanAborted { .. } => EventSeverity::Error,
            RolloutEvent::TargetFinished { result, .. } if result.is_failure() => {
                EventSeverity::Warning
            }
            RolloutEvent::TargetRetrying { .. } => EventSeverity::Warning,
            RolloutEvent::PlanFinished { status, .. } if status.exit_code() != 0 => {
                EventSeverity::Warning
            }
            _ => EventSeverity::Info,
        }
    }
}

impl RolloutEvent {
    pub fn plan_id(&self) -> Option<PlanId> {
        match self {
            RolloutEvent::PlanStarted { plan_id, .. }
            | RolloutEvent::PlanAborted { plan_id, .. }
            | RolloutEvent::PlanFinished { plan_id, .. }
            | RolloutEvent::BatchStarted { plan_id, .. }
            | RolloutEvent::BatchCompleted { plan_id, .. }
            | RolloutEvent::TargetFinished { plan_id, .. } => Some(*plan_id),
            RolloutEvent::TargetTransitioned { .. } | RolloutEvent::TargetRetrying { .. } => None,
        }
    }
}
