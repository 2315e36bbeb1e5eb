//! Filesystem artifact store
//!
//! Layout:
//!
//! ```text
//! <root>/<version>/manifest.json
//! <root>/<version>/<package file named by the manifest>
//! ```

use crate::error::StoreError;
use crate::store::{ArtifactManifest, ArtifactStore, ByteStream};
use async_trait::async_trait;
use futures::StreamExt;
use semver::Version;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio_util::io::ReaderStream;

pub const MANIFEST_FILE: &str = "manifest.json";

/// Artifact store rooted at a local (or mounted) directory
pub struct DirectoryArtifactStore {
    root: PathBuf,
}

impl DirectoryArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(components.next(), Some(Component::Normal(_))) && components.next().is_none()
}

#[async_trait]
impl ArtifactStore for DirectoryArtifactStore {
    async fn manifest(&self, version: &Version) -> Result<ArtifactManifest, StoreError> {
        let dir = self.root.join(version.to_string());
        let contents = match tokio::fs::read(dir.join(MANIFEST_FILE)).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotPublished(version.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        let mut manifest: ArtifactManifest = serde_json::from_slice(&contents)
            .map_err(|e| StoreError::MalformedManifest(e.to_string()))?;

        if !is_plain_file_name(&manifest.package) {
            return Err(StoreError::MalformedManifest(format!(
                "package must be a file name inside the version directory: {}",
                manifest.package
            )));
        }
        manifest.package = dir.join(&manifest.package).to_string_lossy().into_owned();
        Ok(manifest)
    }

    async fn fetch(&self, locator: &str) -> Result<ByteStream, StoreError> {
        let file = tokio::fs::File::open(locator).await?;
        Ok(ReaderStream::new(file).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reads_manifest_and_streams_package() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("1.2.0");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("app.tar.gz"), b"package-bytes").unwrap();
        std::fs::write(
            dir.join(MANIFEST_FILE),
            r#"{
                "version": "1.2.0",
                "fingerprint": "sha256:9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08",
                "package": "app.tar.gz",
                "verification": [{ "name": "api", "kind": "http_get", "path": "/health" }]
            }"#,
        )
        .unwrap();

        let store = DirectoryArtifactStore::new(root.path());
        let manifest = store.manifest(&Version::new(1, 2, 0)).await.unwrap();
        assert!(manifest.package.ends_with("app.tar.gz"));
        assert_eq!(manifest.verification.len(), 1);

        let chunks: Vec<_> = store
            .fetch(&manifest.package)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(chunks.concat(), b"package-bytes".to_vec());
    }

    #[tokio::test]
    async fn test_missing_version_is_not_published() {
        let root = TempDir::new().unwrap();
        let store = DirectoryArtifactStore::new(root.path());
        assert!(matches!(
            store.manifest(&Version::new(9, 9, 9)).await,
            Err(StoreError::NotPublished(_))
        ));
    }

    #[tokio::test]
    async fn test_package_path_cannot_escape() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("1.0.0");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(MANIFEST_FILE),
            r#"{
                "version": "1.0.0",
                "fingerprint": "sha256:9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08",
                "package": "../../etc/passwd"
            }"#,
        )
        .unwrap();

        let store = DirectoryArtifactStore::new(root.path());
        assert!(matches!(
            store.manifest(&Version::new(1, 0, 0)).await,
            Err(StoreError::MalformedManifest(_))
        ));
    }
}
