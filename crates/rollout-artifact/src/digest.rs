//! SHA-256 content fingerprints

use rollout_types::Fingerprint;
use sha2::{Digest, Sha256};

/// Incremental hasher fed chunk by chunk from a byte stream
#[derive(Default)]
pub struct StreamingDigest {
    hasher: Sha256,
    bytes: u64,
}

impl StreamingDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.bytes += chunk.len() as u64;
    }

    /// Bytes hashed so far
    pub fn len(&self) -> u64 {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes == 0
    }

    pub fn finish(self) -> Fingerprint {
        Fingerprint::from_sha256(self.hasher.finalize().into())
    }
}

/// Fingerprint of an in-memory buffer
pub fn fingerprint_bytes(bytes: &[u8]) -> Fingerprint {
    Fingerprint::from_sha256(Sha256::digest(bytes).into())
}
