//! Artifact store collaborator
//!
//! The store is read-only from the reconciler's point of view: a published
//! manifest per version, and a byte stream per package locator.

use crate::error::StoreError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use rollout_types::{Fingerprint, VerificationStep};
use semver::Version;
use serde::{Deserialize, Serialize};

/// Package bytes, streamed in chunks
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Manifest published next to a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactManifest {
    /// Release version the manifest describes
    pub version: Version,

    /// Expected fingerprint of the package bytes
    pub fingerprint: Fingerprint,

    /// Package locator understood by the store
    pub package: String,

    /// Ordered post-install verification steps
    #[serde(default)]
    pub verification: Vec<VerificationStep>,
}

/// Read-only artifact store
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Manifest for `version`; `NotPublished` when it does not exist yet
    async fn manifest(&self, version: &Version) -> Result<ArtifactManifest, StoreError>;

    /// Open a byte stream over the package at `locator`
    async fn fetch(&self, locator: &str) -> Result<ByteStream, StoreError>;
}
