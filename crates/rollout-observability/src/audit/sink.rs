//! Audit sinks for storing audit records

use super::entry::{AuditRecord, PartialAuditRecord};
use super::integrity::IntegrityChain;
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

/// Append-only destination for audit records
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Link `partial` into the chain and store it
    async fn write(&self, partial: PartialAuditRecord) -> Result<AuditRecord>;

    /// Number of records in the chain
    async fn entry_count(&self) -> Result<u64>;
}

/// In-memory audit sink
pub struct MemoryAuditSink {
    records: RwLock<Vec<AuditRecord>>,
    chain: RwLock<IntegrityChain>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            chain: RwLock::new(IntegrityChain::new()),
        }
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().clone()
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn write(&self, partial: PartialAuditRecord) -> Result<AuditRecord> {
        let mut chain = self.chain.write();
        let record = partial.finalize(chain.previous_hash());
        chain.update(&record);
        self.records.write().push(record.clone());
        Ok(record)
    }

    async fn entry_count(&self) -> Result<u64> {
        Ok(self.chain.read().entry_count())
    }
}

/// JSON-lines audit sink; each record is flushed to disk before `write`
/// returns
pub struct FileAuditSink {
    path: PathBuf,
    // serializes chain linking and the append so file order matches chain order
    chain: Mutex<IntegrityChain>,
}

impl FileAuditSink {
    /// Open an audit log, resuming the chain if the file already exists
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let chain = if tokio::fs::try_exists(&path).await? {
            let records = read_records(&path).await?;
            IntegrityChain::from_state(
                records.last().map(|r| r.entry_hash.clone()),
                records.len() as u64,
            )
        } else {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            IntegrityChain::new()
        };

        Ok(Self {
            path,
            chain: Mutex::new(chain),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read_all(&self) -> Result<Vec<AuditRecord>> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(Vec::new());
        }
        read_records(&self.path).await
    }
}

async fn read_records(path: &Path) -> Result<Vec<AuditRecord>> {
    let file = File::open(path).await?;
    let mut lines = BufReader::new(file).lines();
    let mut records = Vec::new();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }

    Ok(records)
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn write(&self, partial: PartialAuditRecord) -> Result<AuditRecord> {
        let mut chain = self.chain.lock().await;
        let record = partial.finalize(chain.previous_hash());
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.sync_data().await?;

        chain.update(&record);
        Ok(record)
    }

    async fn entry_count(&self) -> Result<u64> {
        Ok(self.chain.lock().await.entry_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::entry::AuditEvent;
    use crate::audit::integrity::IntegrityVerifier;
    use rollout_types::{FailureKind, RecordOutcome, TargetId};

    fn outcome() -> PartialAuditRecord {
        PartialAuditRecord::new(
            "reconciler",
            AuditEvent::Outcome {
                outcome: RecordOutcome::Failed {
                    kind: FailureKind::Corrupt,
                },
            },
        )
        .target(TargetId::new("site-a"))
        .version(semver::Version::new(1, 0, 0))
    }

    #[tokio::test]
    async fn test_memory_sink_links_records() {
        let sink = MemoryAuditSink::new();
        let first = sink.write(outcome()).await.unwrap();
        let second = sink.write(outcome()).await.unwrap();

        assert_eq!(sink.entry_count().await.unwrap(), 2);
        assert_eq!(second.previous_hash, Some(first.entry_hash));
        assert!(IntegrityVerifier::verify_chain(&sink.records()).valid);
    }

    #[tokio::test]
    async fn test_file_sink_resumes_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit").join("audit.jsonl");

        {
            let sink = FileAuditSink::open(&path).await.unwrap();
            sink.write(outcome()).await.unwrap();
            sink.write(outcome()).await.unwrap();
        }

        let sink = FileAuditSink::open(&path).await.unwrap();
        assert_eq!(sink.entry_count().await.unwrap(), 2);
        sink.write(outcome()).await.unwrap();

        let records = sink.read_all().await.unwrap();
        assert_eq!(records.len(), 3);
        let result = IntegrityVerifier::verify_chain(&records);
        assert!(result.valid, "{:?}", result.error_message);
    }
}
