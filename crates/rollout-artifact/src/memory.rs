//! In-memory artifact store

use crate::digest::fingerprint_bytes;
use crate::error::StoreError;
use crate::store::{ArtifactManifest, ArtifactStore, ByteStream};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::StreamExt;
use rollout_types::{Fingerprint, VerificationStep};
use semver::Version;
use std::sync::atomic::{AtomicU64, Ordering};

/// Artifact store backed by maps; packages are served in small chunks
pub struct InMemoryArtifactStore {
    manifests: DashMap<Version, ArtifactManifest>,
    packages: DashMap<String, Bytes>,
    chunk_size: usize,
    fetches: AtomicU64,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self {
            manifests: DashMap::new(),
            packages: DashMap::new(),
            chunk_size: 4096,
            fetches: AtomicU64::new(0),
        }
    }

    /// Publish a package under its correct fingerprint
    pub fn publish(&self, version: Version, bytes: impl Into<Bytes>, steps: Vec<VerificationStep>) {
        let bytes = bytes.into();
        let fingerprint = fingerprint_bytes(&bytes);
        self.publish_with_fingerprint(version, bytes, fingerprint, steps);
    }

    /// Publish a package with an arbitrary manifest fingerprint
    pub fn publish_with_fingerprint(
        &self,
        version: Version,
        bytes: impl Into<Bytes>,
        fingerprint: Fingerprint,
        steps: Vec<VerificationStep>,
    ) {
        let locator = format!("memory://{}/package", version);
        self.packages.insert(locator.clone(), bytes.into());
        self.manifests.insert(
            version.clone(),
            ArtifactManifest {
                version,
                fingerprint,
                package: locator,
                verification: steps,
            },
        );
    }

    /// Number of package streams opened
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn manifest(&self, version: &Version) -> Result<ArtifactManifest, StoreError> {
        self.manifests
            .get(version)
            .map(|m| m.clone())
            .ok_or_else(|| StoreError::NotPublished(version.clone()))
    }

    async fn fetch(&self, locator: &str) -> Result<ByteStream, StoreError> {
        let bytes = self
            .packages
            .get(locator)
            .map(|b| b.clone())
            .ok_or_else(|| StoreError::Unavailable(format!("no package at {}", locator)))?;
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let chunks: Vec<std::io::Result<Bytes>> = (0..bytes.len())
            .step_by(self.chunk_size)
            .map(|start| {
                let end = (start + self.chunk_size).min(bytes.len());
                Ok(bytes.slice(start..end))
            })
            .collect();

        Ok(futures::stream::iter(chunks).boxed())
    }
}
