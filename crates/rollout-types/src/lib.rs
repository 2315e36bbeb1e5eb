//! Rollout Types - Core types for the deployment reconciler
//!
//! Rollout drives a versioned software package onto many independent
//! on-premise targets, one idempotent reconciliation per target, with
//! automatic rollback when a new version fails verification.
//!
//! ## Key Concepts
//!
//! - **Target**: one deployment endpoint and its last observed state
//! - **Artifact**: an immutable, fingerprinted package version
//! - **DeploymentPlan**: desired version, target set and rollout policy
//! - **ReconciliationRecord**: append-only audit of one convergence attempt
//! - **FailureKind**: the closed taxonomy every collaborator result maps to
//! - **Events**: progress stream published by the coordinator

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod artifact;
pub mod events;
pub mod failure;
pub mod ids;
pub mod plan;
pub mod record;
pub mod report;
pub mod secret;
pub mod target;

mod duration_serde;

// Re-export main types
pub use artifact::{Artifact, Fingerprint, FingerprintError, StepCheck, VerificationStep};
pub use events::{EventSeverity, RolloutEvent, RolloutEventEnvelope};
pub use failure::{FailureKind, TargetError};
pub use ids::{PlanId, RecordId, TargetId};
pub use plan::{
    BackoffPolicy, BackoffSpec, Batch, CanarySpec, DeploymentPlan, JitterMode, PlanSpec,
    PlanValidationError, PolicySpec, RolloutPolicy, TimeoutSpec, Timeouts,
};
pub use record::{ReconciliationRecord, RecordOutcome, Transition};
pub use report::{AbortReason, PlanStatus, RolloutReport, TargetOutcome, TargetResult};
pub use secret::Credentials;
pub use target::{HealthStatus, LifecycleState, Target};
