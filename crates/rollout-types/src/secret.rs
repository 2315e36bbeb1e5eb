//! Credentials handed to install actions and health probes
//!
//! Credentials come from a time-limited lease and are never serialized or
//! printed.

use std::fmt;

/// Secret material scoped to one reconciliation
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: Option<String>,
    secret: String,
}

impl Credentials {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            username: None,
            secret: secret.into(),
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Credentials that carry nothing, for targets that need no secret
    pub fn anonymous() -> Self {
        Self::new(String::new())
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn is_anonymous(&self) -> bool {
        self.secret.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}
