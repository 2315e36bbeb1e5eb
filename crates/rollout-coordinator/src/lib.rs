//! Rollout Coordinator - running deployment plans
//!
//! [`Coordinator::run`] takes a validated [`DeploymentPlan`], dispatches its
//! canary batch and then its fan-out batches through a shared
//! [`Reconciler`], and returns a [`RolloutReport`]:
//!
//! - `Succeeded`: every target converged (or already was)
//! - `PartiallySucceeded`: all batches ran, the listed targets did not converge
//! - `Aborted`: the failure threshold was exceeded or an operator aborted
//!
//! [`PlanStore`] keeps plan progress for `status` queries from other
//! processes and carries abort requests.
//!
//! [`DeploymentPlan`]: rollout_types::DeploymentPlan
//! [`Reconciler`]: rollout_reconciler::Reconciler
//! [`RolloutReport`]: rollout_types::RolloutReport

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod coordinator;
pub mod error;
pub mod plan_store;

pub use coordinator::Coordinator;
pub use error::{CoordinatorError, Result};
pub use plan_store::{watch_abort, FilePlanStore, InMemoryPlanStore, PlanRecord, PlanStore};
