//! Artifact types
//!
//! An Artifact is created once per release and never mutated. It is
//! referenced by many targets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A validated, immutable package version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Release version
    pub version: semver::Version,

    /// Content digest of the package bytes
    pub fingerprint: Fingerprint,

    /// Where the artifact store keeps the package
    pub locator: String,

    /// Ordered post-install verification steps
    #[serde(default)]
    pub manifest: Vec<VerificationStep>,
}

/// Content fingerprint, rendered as `sha256:<hex>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint {
    digest: String,
}

/// Fingerprint parse errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FingerprintError {
    #[error("unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("malformed sha256 digest: {0}")]
    Malformed(String),
}

impl Fingerprint {
    pub const ALGORITHM: &'static str = "sha256";

    /// Build from a lowercase or uppercase hex SHA-256 digest
    pub fn sha256_hex(hex: impl AsRef<str>) -> Result<Self, FingerprintError> {
        let hex = hex.as_ref();
        if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(FingerprintError::Malformed(hex.to_string()));
        }
        Ok(Self {
            digest: hex.to_ascii_lowercase(),
        })
    }

    /// Build from raw SHA-256 output
    pub fn from_sha256(digest: [u8; 32]) -> Self {
        Self {
            digest: hex::encode(digest),
        }
    }

    /// Hex digest without the algorithm prefix
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", Self::ALGORITHM, self.digest)
    }
}

impl FromStr for Fingerprint {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((algorithm, digest)) if algorithm == Self::ALGORITHM => Self::sha256_hex(digest),
            Some((algorithm, _)) => Err(FingerprintError::UnsupportedAlgorithm(
                algorithm.to_string(),
            )),
            None => Self::sha256_hex(s),
        }
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = FingerprintError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.to_string()
    }
}

/// One post-install verification step from the artifact manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationStep {
    /// Step name for logs and audit
    pub name: String,

    /// What to check
    #[serde(flatten)]
    pub check: StepCheck,
}

/// Check performed by a verification step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepCheck {
    /// GET `<endpoint><path>` and expect a status code
    HttpGet {
        path: String,
        #[serde(default = "default_expect_status")]
        expect_status: u16,
    },

    /// Run a local command; exit status 0 means healthy
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

fn default_expect_status() -> u16 {
    200
}

impl VerificationStep {
    pub fn http_get(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            check: StepCheck::HttpGet {
                path: path.into(),
                expect_status: default_expect_status(),
            },
        }
    }

    pub fn command(name: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            check: StepCheck::Command {
                program: program.into(),
                args,
            },
        }
    }
}
