//! Rollout Reconciler - per-target convergence
//!
//! The [`Reconciler`] drives a single target from its observed version to a
//! desired one through `Fetching`, `Installing` and `Verifying`, rolling back
//! to the last known-good version when the new one is unhealthy.
//!
//! Collaborators are injected as traits:
//!
//! - [`Installer`]: the opaque install action (see [`CommandInstaller`])
//! - [`SecretStore`]: time-limited credential leases
//! - [`RecordStore`]: append-only reconciliation history
//!
//! Registry, artifact resolver, health prober and audit sink come from the
//! sibling `rollout-*` crates.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod backoff;
pub mod error;
pub mod installer;
pub mod reconciler;
pub mod records;
pub mod request;
pub mod secrets;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use error::{ReconcileError, Result};
pub use installer::{CommandInstaller, InstallOutcome, Installer};
pub use reconciler::Reconciler;
pub use records::{FileRecordStore, InMemoryRecordStore, RecordStore};
pub use request::{ReconcileOutcome, ReconcileRequest};
pub use secrets::{EnvSecretStore, Lease, SecretError, SecretStore, StaticSecretStore};

#[cfg(any(test, feature = "test-utils"))]
pub use testing::{InstallBehaviour, ScriptedInstaller};
