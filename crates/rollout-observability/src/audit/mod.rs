//! Audit logging with integrity chain
//!
//! Every record carries the SHA-256 hash of its predecessor, so any edit or
//! deletion inside a stored log is detectable with [`IntegrityVerifier`].

mod entry;
mod integrity;
mod sink;

pub use entry::{AuditEvent, AuditRecord, PartialAuditRecord};
pub use integrity::{ChainVerification, IntegrityChain, IntegrityVerifier};
pub use sink::{AuditSink, FileAuditSink, MemoryAuditSink};
