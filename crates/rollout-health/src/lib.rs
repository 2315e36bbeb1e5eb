//! # Rollout Health - Health probing for deployment targets
//!
//! A probe answers one question about a target after an install: is the
//! running version healthy?
//!
//! - **Healthy**: every verification step passed
//! - **Unhealthy**: the target answered and reported a bad state; the
//!   reconciler rolls back immediately
//! - **Unreachable**: no answer within the caller's timeout; the reconciler
//!   retries with backoff
//!
//! [`StepProber`] runs the ordered verification steps from the artifact
//! manifest (`http_get` and `command`). With the `test-utils` feature,
//! [`ScriptedProber`] replays a fixed sequence of outcomes.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod error;
pub mod prober;
pub mod step;

#[cfg(any(test, feature = "test-utils"))]
pub mod scripted;

pub use error::{HealthError, HealthResult};
pub use prober::{HealthProber, ProbeOutcome};
pub use step::StepProber;

#[cfg(any(test, feature = "test-utils"))]
pub use scripted::ScriptedProber;
