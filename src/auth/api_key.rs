//! API key authentication
//!
//! A single service-wide key, compared in constant time. In external mode
//! the key comes from the key provider and can rotate at runtime; in static
//! mode it is fixed at startup.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use super::{AuthError, AuthIdentity, AuthMethod};
use crate::keys::{KeyProvider, SecretValue};

/// API key prefix
pub const API_KEY_PREFIX: &str = "ek_";

/// Where the expected key comes from
#[derive(Clone)]
pub enum ApiKeyMode {
    /// Current key from the key provider (rotatable)
    External(Arc<dyn KeyProvider>),

    /// One value fixed at startup
    Static(SecretValue),
}

impl fmt::Debug for ApiKeyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiKeyMode::External(_) => f.write_str("External"),
            ApiKeyMode::Static(_) => f.write_str("Static"),
        }
    }
}

/// `API_KEY_MODE` setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeyModeSetting {
    External,
    Static,
}

impl FromStr for ApiKeyModeSetting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "external" => Ok(Self::External),
            "static" => Ok(Self::Static),
            other => Err(format!("unknown API key mode: {other}")),
        }
    }
}

/// API key validator
pub struct ApiKeyValidator {
    mode: ApiKeyMode,

    /// Scopes granted to callers presenting the key
    scopes: Vec<String>,
}

impl ApiKeyValidator {
    pub fn new(mode: ApiKeyMode, scopes: Vec<String>) -> Self {
        Self { mode, scopes }
    }

    pub fn mode(&self) -> &ApiKeyMode {
        &self.mode
    }

    /// Generate a new random API key
    pub fn generate_key() -> String {
        use rand::Rng;
        let mut rng = rand::thread_rng();

        let random_bytes: [u8; 32] = rng.gen();
        let random_part = base64::Engine::encode(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD,
            random_bytes,
        );

        format!("{}{}", API_KEY_PREFIX, random_part)
    }

    /// Short, non-reversible identifier for a key, safe to log
    pub fn fingerprint(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hex::encode(&hasher.finalize()[..6])
    }

    /// Check a candidate against the expected key
    pub fn validate_api_key(&self, candidate: &str) -> Result<bool, AuthError> {
        let expected = match &self.mode {
            ApiKeyMode::External(provider) => provider.current_api_key()?,
            ApiKeyMode::Static(value) => value.clone(),
        };
        Ok(expected.matches(candidate))
    }

    /// Validate a candidate key and build the caller's identity
    pub fn authenticate(&self, candidate: &str) -> Result<AuthIdentity, AuthError> {
        if !self.validate_api_key(candidate)? {
            return Err(AuthError::InvalidApiKey);
        }

        Ok(AuthIdentity {
            method: AuthMethod::ApiKey,
            subject: format!("api-key:{}", Self::fingerprint(candidate)),
            scopes: self.scopes.clone(),
        })
    }
}
