//! Artifact resolver
//!
//! Resolution reads the manifest, streams the package through SHA-256 and
//! compares the result with the manifest fingerprint. Verified artifacts are
//! cached by version, so a plan fanning out to many targets hashes each
//! package once. Forced reinstalls go through [`ArtifactResolver::refresh`],
//! which fetches and hashes again.

use crate::digest::StreamingDigest;
use crate::error::{ResolveError, StoreError};
use crate::store::ArtifactStore;
use dashmap::DashMap;
use futures::StreamExt;
use rollout_types::Artifact;
use semver::Version;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument};

/// Resolves versions to validated artifacts
pub struct ArtifactResolver {
    store: Arc<dyn ArtifactStore>,
    verified: DashMap<Version, Artifact>,
}

impl ArtifactResolver {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            store,
            verified: DashMap::new(),
        }
    }

    /// Resolve and validate `version`, giving up after `timeout`.
    ///
    /// A timeout is reported as `NotFound`. `Corrupt` is never retried here.
    #[instrument(skip_all, fields(version = %version))]
    pub async fn resolve(&self, version: &Version, timeout: Duration) -> Result<Artifact, ResolveError> {
        if let Some(artifact) = self.verified.get(version) {
            return Ok(artifact.clone());
        }

        let artifact = match tokio::time::timeout(timeout, self.resolve_uncached(version)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ResolveError::not_found(
                    version,
                    format!("artifact store did not answer within {:?}", timeout),
                ))
            }
        };

        self.verified.insert(version.clone(), artifact.clone());
        Ok(artifact)
    }

    /// Resolve `version` ignoring any cached verification
    #[instrument(skip_all, fields(version = %version))]
    pub async fn refresh(&self, version: &Version, timeout: Duration) -> Result<Artifact, ResolveError> {
        if self.verified.remove(version).is_some() {
            debug!("Dropped cached verification");
        }
        self.resolve(version, timeout).await
    }

    async fn resolve_uncached(&self, version: &Version) -> Result<Artifact, ResolveError> {
        let manifest = self.store.manifest(version).await.map_err(|e| match e {
            StoreError::MalformedManifest(reason) => ResolveError::Corrupt {
                version: version.clone(),
                expected: "well-formed manifest".into(),
                actual: reason,
            },
            other => ResolveError::not_found(version, other),
        })?;

        if &manifest.version != version {
            return Err(ResolveError::Corrupt {
                version: version.clone(),
                expected: format!("manifest for {}", version),
                actual: format!("manifest for {}", manifest.version),
            });
        }

        let mut stream = self
            .store
            .fetch(&manifest.package)
            .await
            .map_err(|e| ResolveError::not_found(version, e))?;

        let mut digest = StreamingDigest::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ResolveError::not_found(version, e))?;
            digest.update(&chunk);
        }
        let size = digest.len();
        let actual = digest.finish();

        if actual != manifest.fingerprint {
            error!(
                expected = %manifest.fingerprint,
                actual = %actual,
                "Artifact fingerprint mismatch"
            );
            return Err(ResolveError::corrupt(version, &manifest.fingerprint, &actual));
        }

        debug!(bytes = size, fingerprint = %actual, "Artifact verified");

        Ok(Artifact {
            version: manifest.version,
            fingerprint: manifest.fingerprint,
            locator: manifest.package,
            manifest: manifest.verification,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::fingerprint_bytes;
    use crate::memory::InMemoryArtifactStore;
    use rollout_types::{FailureKind, VerificationStep};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_resolves_valid_artifact() {
        let store = Arc::new(InMemoryArtifactStore::new());
        let payload = vec![7u8; 10_000];
        store.publish(
            Version::new(1, 0, 0),
            payload.clone(),
            vec![VerificationStep::http_get("api", "/health")],
        );

        let resolver = ArtifactResolver::new(store.clone());
        let artifact = resolver.resolve(&Version::new(1, 0, 0), TIMEOUT).await.unwrap();

        assert_eq!(artifact.fingerprint, fingerprint_bytes(&payload));
        assert_eq!(artifact.manifest.len(), 1);
    }

    #[tokio::test]
    async fn test_verified_artifacts_are_cached() {
        let store = Arc::new(InMemoryArtifactStore::new());
        store.publish(Version::new(1, 0, 0), "pkg", vec![]);

        let resolver = ArtifactResolver::new(store.clone());
        resolver.resolve(&Version::new(1, 0, 0), TIMEOUT).await.unwrap();
        resolver.resolve(&Version::new(1, 0, 0), TIMEOUT).await.unwrap();

        assert_eq!(store.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_refresh_rehashes_the_package() {
        let store = Arc::new(InMemoryArtifactStore::new());
        store.publish(Version::new(1, 0, 0), "pkg", vec![]);
        let resolver = ArtifactResolver::new(store.clone());
        resolver.resolve(&Version::new(1, 0, 0), TIMEOUT).await.unwrap();

        // package damaged in the store after the first verification
        store.publish_with_fingerprint(
            Version::new(1, 0, 0),
            "damaged",
            fingerprint_bytes(b"pkg"),
            vec![],
        );
        assert!(resolver.resolve(&Version::new(1, 0, 0), TIMEOUT).await.is_ok());
        assert_eq!(store.fetch_count(), 1);

        let err = resolver.refresh(&Version::new(1, 0, 0), TIMEOUT).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Corrupt);
        assert_eq!(store.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_is_not_found() {
        let resolver = ArtifactResolver::new(Arc::new(InMemoryArtifactStore::new()));
        let err = resolver.resolve(&Version::new(2, 0, 0), TIMEOUT).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::NotFound);
    }

    #[tokio::test]
    async fn test_mismatch_is_corrupt_and_not_cached() {
        let store = Arc::new(InMemoryArtifactStore::new());
        store.publish_with_fingerprint(
            Version::new(1, 0, 0),
            "tampered",
            fingerprint_bytes(b"original"),
            vec![],
        );

        let resolver = ArtifactResolver::new(store.clone());
        for _ in 0..2 {
            let err = resolver.resolve(&Version::new(1, 0, 0), TIMEOUT).await.unwrap_err();
            assert!(matches!(err, ResolveError::Corrupt { .. }));
            assert_eq!(err.kind(), FailureKind::Corrupt);
        }
        assert_eq!(store.fetch_count(), 2);
    }
}
