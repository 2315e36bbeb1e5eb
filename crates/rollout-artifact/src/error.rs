//! Artifact error types

use rollout_types::{FailureKind, Fingerprint};
use semver::Version;
use thiserror::Error;

/// Errors reported by an [`ArtifactStore`](crate::ArtifactStore)
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No artifact published for version {0}")]
    NotPublished(Version),

    #[error("Artifact store unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed manifest: {0}")]
    MalformedManifest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Classified resolution outcome
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Not yet published, or the store did not answer in time (retryable)
    #[error("Artifact {version} not found: {reason}")]
    NotFound { version: Version, reason: String },

    /// Published but damaged (terminal for this artifact)
    #[error("Artifact {version} is corrupt: expected {expected}, got {actual}")]
    Corrupt {
        version: Version,
        expected: String,
        actual: String,
    },
}

impl ResolveError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ResolveError::NotFound { .. } => FailureKind::NotFound,
            ResolveError::Corrupt { .. } => FailureKind::Corrupt,
        }
    }

    pub(crate) fn not_found(version: &Version, reason: impl ToString) -> Self {
        ResolveError::NotFound {
            version: version.clone(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn corrupt(version: &Version, expected: impl ToString, actual: &Fingerprint) -> Self {
        ResolveError::Corrupt {
            version: version.clone(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}
