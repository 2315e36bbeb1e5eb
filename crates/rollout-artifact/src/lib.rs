//! Rollout Artifact - locating and validating release packages
//!
//! - [`ArtifactStore`]: read-only collaborator that serves a published
//!   manifest and the package bytes as a stream
//! - [`ArtifactResolver`]: hashes the streamed bytes and checks them against
//!   the manifest fingerprint before handing out an [`Artifact`]
//!
//! A missing manifest is `NotFound` (not yet published, retryable); a
//! fingerprint mismatch is `Corrupt` (published but damaged, never retried).
//!
//! [`Artifact`]: rollout_types::Artifact

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod digest;
pub mod directory;
pub mod error;
pub mod memory;
pub mod resolver;
pub mod store;

pub use digest::{fingerprint_bytes, StreamingDigest};
pub use directory::DirectoryArtifactStore;
pub use error::{ResolveError, StoreError};
pub use memory::InMemoryArtifactStore;
pub use resolver::ArtifactResolver;
pub use store::{ArtifactManifest, ArtifactStore, ByteStream};
