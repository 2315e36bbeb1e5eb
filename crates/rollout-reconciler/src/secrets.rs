//! Secret store collaborator
//!
//! Credentials are leased per reconciliation: acquired before the first
//! install, re-acquired when the lease runs out, released when the
//! reconciliation ends. Nothing is cached beyond that.

use async_trait::async_trait;
use parking_lot::Mutex;
use rollout_types::{Credentials, TargetId};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

/// Secret store errors
#[derive(Debug, Clone, Error)]
pub enum SecretError {
    #[error("Secret store unavailable: {0}")]
    Unavailable(String),

    #[error("No credentials for target {0}")]
    NoCredentials(TargetId),
}

/// Time-limited grant of credentials for one target
#[derive(Debug)]
pub struct Lease {
    id: Uuid,
    target_id: TargetId,
    credentials: Credentials,
    expires_at: Instant,
}

impl Lease {
    pub fn new(target_id: TargetId, credentials: Credentials, ttl: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_id,
            credentials,
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn target_id(&self) -> &TargetId {
        &self.target_id
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Supplies credentials under lease semantics
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn acquire(&self, target: &TargetId, ttl: Duration) -> Result<Lease, SecretError>;

    async fn release(&self, lease: Lease);
}

/// Bookkeeping of outstanding leases, shared by the stores below
#[derive(Default)]
struct LeaseBook {
    active: Mutex<HashSet<Uuid>>,
}

impl LeaseBook {
    fn grant(&self, lease: &Lease) {
        self.active.lock().insert(lease.id);
    }

    fn revoke(&self, lease: &Lease) {
        self.active.lock().remove(&lease.id);
    }

    fn outstanding(&self) -> usize {
        self.active.lock().len()
    }
}

/// Reads one shared secret from an environment variable at every acquire
pub struct EnvSecretStore {
    variable: String,
    username: Option<String>,
    book: LeaseBook,
}

impl EnvSecretStore {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            username: None,
            book: LeaseBook::default(),
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn outstanding(&self) -> usize {
        self.book.outstanding()
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn acquire(&self, target: &TargetId, ttl: Duration) -> Result<Lease, SecretError> {
        let secret = std::env::var(&self.variable).map_err(|_| {
            SecretError::Unavailable(format!("environment variable {} is not set", self.variable))
        })?;
        let mut credentials = Credentials::new(secret);
        if let Some(username) = &self.username {
            credentials = credentials.with_username(username.clone());
        }
        let lease = Lease::new(target.clone(), credentials, ttl);
        self.book.grant(&lease);
        Ok(lease)
    }

    async fn release(&self, lease: Lease) {
        self.book.revoke(&lease);
    }
}

/// Hands out fixed credentials; also used when targets need no secret
pub struct StaticSecretStore {
    credentials: Credentials,
    book: LeaseBook,
    acquired: Mutex<u64>,
}

impl StaticSecretStore {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            book: LeaseBook::default(),
            acquired: Mutex::new(0),
        }
    }

    pub fn anonymous() -> Self {
        Self::new(Credentials::anonymous())
    }

    /// Leases acquired and not yet released
    pub fn outstanding(&self) -> usize {
        self.book.outstanding()
    }

    /// Leases acquired in total
    pub fn acquired(&self) -> u64 {
        *self.acquired.lock()
    }
}

#[async_trait]
impl SecretStore for StaticSecretStore {
    async fn acquire(&self, target: &TargetId, ttl: Duration) -> Result<Lease, SecretError> {
        let lease = Lease::new(target.clone(), self.credentials.clone(), ttl);
        self.book.grant(&lease);
        *self.acquired.lock() += 1;
        Ok(lease)
    }

    async fn release(&self, lease: Lease) {
        self.book.revoke(&lease);
    }
}
