//! Authentication for the expense API
//!
//! Callers authenticate with one of two credential types:
//!
//! - **Bearer tokens**: HS256 JWTs issued through the OAuth2
//!   client-credentials grant at `POST /oauth/token`
//! - **API keys**: a single rotating key sent in `X-API-Key`
//!
//! # Strategies
//!
//! `AUTH_STRATEGY` selects one request-time handler:
//! - `api_key`: `X-API-Key` only
//! - `token`: `Authorization: Bearer` only
//! - `hybrid` (default): token first, API key as fallback
//!
//! # Failure reporting
//!
//! Callers only ever see a generic authentication failure. The precise
//! reason (unknown client, wrong secret, expired token, bad signature, ...)
//! is carried in [`AuthError`] for logging.

mod api_key;
mod clients;
mod jwt;
mod middleware;

pub use api_key::*;
pub use clients::*;
pub use jwt::*;
pub use middleware::*;

use std::fmt;

use serde::Serialize;

use crate::keys::KeyError;

/// Read access to expenses
pub const SCOPE_READ: &str = "api.read";

/// Create/delete expenses
pub const SCOPE_WRITE: &str = "api.write";

/// Operational endpoints (key reload, key status)
pub const SCOPE_ADMIN: &str = "api.admin";

/// How a request proved its identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuthMethod {
    #[serde(rename = "token")]
    Token,

    #[serde(rename = "api-key")]
    ApiKey,
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Token => f.write_str("token"),
            AuthMethod::ApiKey => f.write_str("api-key"),
        }
    }
}

/// Identity attached to an authenticated request
#[derive(Debug, Clone, Serialize)]
pub struct AuthIdentity {
    /// Which credential type succeeded
    pub method: AuthMethod,

    /// Client ID for tokens, key fingerprint for API keys
    pub subject: String,

    /// Granted scopes
    pub scopes: Vec<String>,
}

impl AuthIdentity {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    pub fn can_read(&self) -> bool {
        self.has_scope(SCOPE_READ)
    }

    pub fn can_write(&self) -> bool {
        self.has_scope(SCOPE_WRITE)
    }

    pub fn is_admin(&self) -> bool {
        self.has_scope(SCOPE_ADMIN)
    }
}

/// Split a space-separated scope string, dropping duplicates but keeping order
pub fn parse_scopes(scope: &str) -> Vec<String> {
    let mut scopes: Vec<String> = Vec::new();
    for s in scope.split_whitespace() {
        if !scopes.iter().any(|existing| existing == s) {
            scopes.push(s.to_string());
        }
    }
    scopes
}

/// Why a token request was refused (logged, never returned)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueRejection {
    UnsupportedGrantType,
    UnknownClient,
    InactiveClient,
    SecretMismatch,
    NoGrantableScope,
    SigningFailed,
}

impl fmt::Display for IssueRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            IssueRejection::UnsupportedGrantType => "unsupported grant type",
            IssueRejection::UnknownClient => "unknown client",
            IssueRejection::InactiveClient => "inactive client",
            IssueRejection::SecretMismatch => "client secret mismatch",
            IssueRejection::NoGrantableScope => "no grantable scope",
            IssueRejection::SigningFailed => "token signing failed",
        };
        f.write_str(reason)
    }
}

/// Why a presented token was refused (logged, never returned)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    Expired,
    BadSignature,
    NotYetValid,
    WrongAudience,
    WrongIssuer,
    Malformed,
}

impl fmt::Display for TokenRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            TokenRejection::Expired => "expired signature",
            TokenRejection::BadSignature => "bad signature",
            TokenRejection::NotYetValid => "not yet valid",
            TokenRejection::WrongAudience => "wrong audience",
            TokenRejection::WrongIssuer => "wrong issuer",
            TokenRejection::Malformed => "malformed token",
        };
        f.write_str(reason)
    }
}

/// Authentication error
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,

    #[error("malformed credential: {0}")]
    MalformedCredential(&'static str),

    #[error("token request rejected: {0}")]
    ClientRejected(IssueRejection),

    #[error("token rejected: {0}")]
    TokenRejected(TokenRejection),

    #[error("invalid API key")]
    InvalidApiKey,

    #[error("key material unavailable: {0}")]
    KeyUnavailable(#[from] KeyError),

    #[error("insufficient scope: {0} required")]
    InsufficientScope(&'static str),
}

impl AuthError {
    /// True for failures that must be reported with the generic message
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            AuthError::ClientRejected(_)
                | AuthError::TokenRejected(_)
                | AuthError::InvalidApiKey
                | AuthError::KeyUnavailable(_)
        )
    }
}
