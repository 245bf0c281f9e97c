//! External key management
//!
//! Resolves the current API key and JWT signing secret from a prioritized
//! chain of backing sources, caches them with a TTL, and supports rotation
//! without restarting the service.
//!
//! # Sources (highest priority first)
//!
//! - **File**: one value per file, trimmed (`API_KEY_FILE`, `SIGNING_SECRET_FILE`)
//! - **Environment**: re-read on every reload (`API_KEY`, `JWT_SECRET`)
//! - **Static**: captured once at startup (`API_KEY_FALLBACK`, `JWT_SECRET_FALLBACK`)
//!
//! # Caching
//!
//! Reads are served from an in-memory snapshot. Once the TTL elapses the next
//! read reloads synchronously from the primary source. A failed reload keeps
//! serving the last value that loaded successfully and logs a warning.
//! After [`KeyProvider::invalidate`] the next reload walks the whole chain
//! again, so removing a key file brings a lower-priority source back.

mod provider;
mod rotation;
mod source;

pub use provider::*;
pub use rotation::*;
pub use source::*;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// Which piece of key material a value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    /// Static API key accepted in `X-API-Key`
    ApiKey,

    /// HMAC secret used to sign and verify access tokens
    SigningSecret,
}

impl KeyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyKind::ApiKey => "api_key",
            KeyKind::SigningSecret => "signing_secret",
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable secret captured from a key source.
///
/// Cloning is cheap and every clone refers to the same bytes, so a validation
/// that holds one never observes a later rotation.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(Arc<str>);

impl SecretValue {
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Constant-time comparison against a caller-supplied candidate
    pub fn matches(&self, candidate: &str) -> bool {
        constant_time_eq(self.as_bytes(), candidate.as_bytes())
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretValue(<redacted, {} bytes>)", self.0.len())
    }
}

impl From<&str> for SecretValue {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SecretValue {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Compare two byte strings without short-circuiting on the first mismatch.
///
/// Lengths are not secret; only the content comparison is constant time.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

/// Key source errors
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("no key source configured for {0}")]
    NotConfigured(KeyKind),

    #[error("failed to read key file {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("key file {0} is empty")]
    EmptyFile(String),

    #[error("environment variable {0} is not set")]
    EnvUnset(String),

    #[error("environment variable {0} is empty")]
    EnvEmpty(String),
}

/// Source of the current key material.
///
/// Implementations must hand out values captured atomically: a caller gets
/// either the complete old value or the complete new one.
pub trait KeyProvider: Send + Sync {
    /// Current value for `kind`, reloading from the backing source when the
    /// cache has expired or was invalidated.
    fn current(&self, kind: KeyKind) -> Result<SecretValue, KeyError>;

    /// Reload `kind` from its backing source now, reporting failure.
    ///
    /// A key with no configured source is not an error here.
    fn refresh_kind(&self, kind: KeyKind) -> Result<(), KeyError>;

    /// Reload every configured key from its backing source now.
    fn refresh(&self) -> Result<(), KeyError> {
        let api_key = self.refresh_kind(KeyKind::ApiKey);
        let signing_secret = self.refresh_kind(KeyKind::SigningSecret);
        api_key.and(signing_secret)
    }

    /// Mark cached values stale so the next read reloads.
    fn invalidate(&self, kind: KeyKind);

    /// Load state for each key, for health and admin reporting
    fn status(&self) -> Vec<KeyStatus> {
        Vec::new()
    }

    fn current_api_key(&self) -> Result<SecretValue, KeyError> {
        self.current(KeyKind::ApiKey)
    }

    fn current_signing_secret(&self) -> Result<SecretValue, KeyError> {
        self.current(KeyKind::SigningSecret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = SecretValue::from("super-secret-value");
        let rendered = format!("{:?}", secret);
        assert!(!rendered.contains("super-secret-value"));
        assert!(rendered.contains("18 bytes"));
    }

    #[test]
    fn test_secret_matches() {
        let secret = SecretValue::from("abc123");
        assert!(secret.matches("abc123"));
        assert!(!secret.matches("abc124"));
        assert!(!secret.matches("abc1234"));
        assert!(!secret.matches(""));
    }

    #[test]
    fn test_constant_time_eq_lengths() {
        assert!(constant_time_eq(b"", b""));
        assert!(!constant_time_eq(b"a", b""));
        assert!(!constant_time_eq(b"short", b"longer"));
    }
}
