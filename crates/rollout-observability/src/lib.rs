//! Rollout Observability
//!
//! Provides the audit trail and logging setup for rollout components.
//!
//! ## Features
//!
//! - **Audit**: append-only, hash-chained records of every state transition
//!   and terminal outcome
//! - **Logging**: `tracing-subscriber` initialisation with env filter and
//!   optional JSON output

pub mod audit;
pub mod error;
pub mod logging;

pub use audit::{
    AuditEvent, AuditRecord, AuditSink, ChainVerification, FileAuditSink, IntegrityVerifier,
    MemoryAuditSink, PartialAuditRecord,
};
pub use error::{ObservabilityError, Result};
pub use logging::{init_logging, LogFormat, LoggingConfig};
