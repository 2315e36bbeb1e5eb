//! Integrity verification for audit chains

use super::entry::AuditRecord;

/// Tracks the head of an audit chain
#[derive(Debug, Default)]
pub struct IntegrityChain {
    last_hash: Option<String>,
    entry_count: u64,
}

impl IntegrityChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume a chain loaded from storage
    pub fn from_state(last_hash: Option<String>, entry_count: u64) -> Self {
        Self {
            last_hash,
            entry_count,
        }
    }

    pub fn previous_hash(&self) -> Option<String> {
        self.last_hash.clone()
    }

    pub fn update(&mut self, record: &AuditRecord) {
        self.last_hash = Some(record.entry_hash.clone());
        self.entry_count += 1;
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }
}

/// Result of verifying a sequence of records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerification {
    pub valid: bool,
    pub total_entries: usize,
    pub verified_entries: usize,
    pub first_invalid_index: Option<usize>,
    pub error_message: Option<String>,
}

/// Verifies the integrity of audit records
pub struct IntegrityVerifier;

impl IntegrityVerifier {
    pub fn verify_record(record: &AuditRecord) -> bool {
        record.compute_hash() == record.entry_hash
    }

    /// Check every record's hash and its link to the predecessor
    pub fn verify_chain(records: &[AuditRecord]) -> ChainVerification {
        let mut result = ChainVerification {
            valid: true,
            total_entries: records.len(),
            verified_entries: 0,
            first_invalid_index: None,
            error_message: None,
        };

        for (i, record) in records.iter().enumerate() {
            let problem = if !Self::verify_record(record) {
                Some(format!("record {} has invalid hash", record.record.id))
            } else if i > 0 && record.previous_hash.as_ref() != Some(&records[i - 1].entry_hash) {
                Some(format!(
                    "record {} has broken chain link (expected prev: {}, got: {:?})",
                    record.record.id,
                    records[i - 1].entry_hash,
                    record.previous_hash
                ))
            } else {
                None
            };

            if let Some(message) = problem {
                result.valid = false;
                result.first_invalid_index = Some(i);
                result.error_message = Some(message);
                return result;
            }
            result.verified_entries = i + 1;
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::entry::{AuditEvent, PartialAuditRecord};
    use rollout_types::LifecycleState;

    fn chain(n: usize) -> Vec<AuditRecord> {
        let mut head = IntegrityChain::new();
        (0..n)
            .map(|i| {
                let record = PartialAuditRecord::new(
                    "test",
                    AuditEvent::Transition {
                        from: LifecycleState::Idle,
                        to: LifecycleState::Fetching,
                        reason: format!("step {}", i),
                    },
                )
                .finalize(head.previous_hash());
                head.update(&record);
                record
            })
            .collect()
    }

    #[test]
    fn test_valid_chain() {
        let records = chain(4);
        let result = IntegrityVerifier::verify_chain(&records);
        assert!(result.valid);
        assert_eq!(result.verified_entries, 4);
    }

    #[test]
    fn test_edited_record_detected() {
        let mut records = chain(3);
        records[1].record.actor = "intruder".into();
        let result = IntegrityVerifier::verify_chain(&records);
        assert!(!result.valid);
        assert_eq!(result.first_invalid_index, Some(1));
    }

    #[test]
    fn test_deleted_record_detected() {
        let mut records = chain(3);
        records.remove(1);
        let result = IntegrityVerifier::verify_chain(&records);
        assert!(!result.valid);
        assert_eq!(result.first_invalid_index, Some(1));
    }
}
