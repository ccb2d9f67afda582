//! Authentication boundary.
//!
//! Credential checking is pluggable; the default authenticator accepts
//! everyone.

use std::collections::HashMap;
use thiserror::Error;

/// Credentials sent by a v1 client in a CREDENTIALS frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    entries: HashMap<String, String>,
}

impl Credentials {
    pub fn new(entries: HashMap<String, String>) -> Self {
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn username(&self) -> Option<&str> {
        self.get("username")
    }

    pub fn password(&self) -> Option<&str> {
        self.get("password")
    }
}

/// Authentication failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing credential: {0}")]
    Missing(&'static str),

    #[error("bad credentials for user {0}")]
    Rejected(String),
}

/// Validates client credentials.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, credentials: &Credentials) -> Result<(), AuthError>;
}

/// Accepts any credentials.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAllAuthenticator;

impl Authenticator for AllowAllAuthenticator {
    fn authenticate(&self, _credentials: &Credentials) -> Result<(), AuthError> {
        Ok(())
    }
}
