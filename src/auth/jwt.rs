//! Client-credentials token issuance and validation
//!
//! Tokens are HS256 JWTs signed with the key provider's current signing
//! secret. Nothing is stored server-side; validity is reconstructed from the
//! signature and the embedded claims.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    parse_scopes, AuthError, AuthIdentity, AuthMethod, Client, ClientDirectory, IssueRejection,
    TokenRejection, SCOPE_ADMIN, SCOPE_READ, SCOPE_WRITE,
};
use crate::keys::{KeyProvider, SecretValue};

/// The only grant type accepted by the token endpoint
pub const GRANT_TYPE_CLIENT_CREDENTIALS: &str = "client_credentials";

pub const TOKEN_TYPE_BEARER: &str = "Bearer";

/// Longest access-token lifetime accepted from configuration (24h)
pub const MAX_TOKEN_TTL_MINUTES: i64 = 24 * 60;

/// Token issuance settings
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub issuer: String,
    pub audience: String,
    /// Access token lifetime
    pub ttl: Duration,
    /// Scope names that may ever be granted
    pub valid_scopes: BTreeSet<String>,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: "expense-api".to_string(),
            audience: "expense-api-clients".to_string(),
            ttl: Duration::minutes(60),
            valid_scopes: [SCOPE_READ, SCOPE_WRITE, SCOPE_ADMIN]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl TokenConfig {
    /// Load token settings from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let issuer = std::env::var("JWT_ISSUER").unwrap_or(defaults.issuer);
        let audience = std::env::var("JWT_AUDIENCE").unwrap_or(defaults.audience);

        let ttl = std::env::var("TOKEN_TTL_MINUTES")
            .ok()
            .and_then(|v| parse_ttl_minutes(&v))
            .unwrap_or(defaults.ttl);

        let valid_scopes = std::env::var("VALID_SCOPES")
            .ok()
            .map(|v| parse_scopes(&v).into_iter().collect::<BTreeSet<_>>())
            .filter(|scopes| !scopes.is_empty())
            .unwrap_or(defaults.valid_scopes);

        Self {
            issuer,
            audience,
            ttl,
            valid_scopes,
        }
    }

    /// Build the claims for a token issued to `client_id` at `now`
    pub fn claims_for(&self, client_id: &str, scope: &str, now: DateTime<Utc>) -> TokenClaims {
        TokenClaims {
            sub: client_id.to_string(),
            client_id: client_id.to_string(),
            scope: scope.to_string(),
            aud: self.audience.clone(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        }
    }
}

/// Parse a positive token lifetime in minutes, capped at 24 hours
fn parse_ttl_minutes(raw: &str) -> Option<Duration> {
    let mut minutes = raw.trim().parse::<i64>().ok().filter(|m| *m > 0)?;
    if minutes > MAX_TOKEN_TTL_MINUTES {
        warn!(requested_minutes = minutes, "TOKEN_TTL_MINUTES above 24h, capping");
        minutes = MAX_TOKEN_TTL_MINUTES;
    }
    Some(Duration::minutes(minutes))
}

/// Body of `POST /oauth/token`
#[derive(Clone, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub client_id: String,
    pub client_secret: String,
    /// Space-separated requested scopes
    #[serde(default)]
    pub scope: String,
}

impl fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRequest")
            .field("grant_type", &self.grant_type)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scope", &self.scope)
            .finish()
    }
}

/// Successful token response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    pub access_token: String,
    pub token_type: String,
    /// Lifetime in seconds
    pub expires_in: i64,
    /// Granted scopes, space-separated
    pub scope: String,
    /// Unix timestamp
    pub issued_at: i64,
}

/// Claims embedded in every access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (client_id)
    pub sub: String,

    pub client_id: String,

    /// Granted scopes, space-separated
    pub scope: String,

    pub aud: String,

    pub iss: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Not before (Unix timestamp)
    pub nbf: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Token ID
    pub jti: String,
}

impl TokenClaims {
    pub fn scopes(&self) -> Vec<String> {
        parse_scopes(&self.scope)
    }

    pub fn into_identity(self) -> AuthIdentity {
        AuthIdentity {
            method: AuthMethod::Token,
            scopes: parse_scopes(&self.scope),
            subject: self.client_id,
        }
    }
}

/// Sign claims with an HMAC-SHA-256 secret
pub fn sign_claims(
    claims: &TokenClaims,
    secret: &SecretValue,
) -> Result<String, jsonwebtoken::errors::Error> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Issues and validates access tokens
pub struct TokenService {
    clients: Arc<dyn ClientDirectory>,
    keys: Arc<dyn KeyProvider>,
    config: TokenConfig,
}

impl TokenService {
    pub fn new(
        clients: Arc<dyn ClientDirectory>,
        keys: Arc<dyn KeyProvider>,
        config: TokenConfig,
    ) -> Self {
        Self {
            clients,
            keys,
            config,
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Issue a token for a client-credentials request
    pub fn issue(&self, request: &TokenRequest) -> Result<IssuedToken, AuthError> {
        self.issue_at(request, Utc::now())
    }

    /// Issue a token as if the current time were `now`
    pub fn issue_at(
        &self,
        request: &TokenRequest,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, AuthError> {
        let reject = |reason: IssueRejection| {
            warn!(
                client_id = %request.client_id,
                grant_type = %request.grant_type,
                reason = %reason,
                "token request rejected"
            );
            AuthError::ClientRejected(reason)
        };

        if request.grant_type != GRANT_TYPE_CLIENT_CREDENTIALS {
            return Err(reject(IssueRejection::UnsupportedGrantType));
        }

        let client = self
            .clients
            .lookup(&request.client_id)
            .ok_or_else(|| reject(IssueRejection::UnknownClient))?;

        if !client.active {
            return Err(reject(IssueRejection::InactiveClient));
        }

        if !client.verify_secret(&request.client_secret) {
            return Err(reject(IssueRejection::SecretMismatch));
        }

        let scopes = self.grantable_scopes(&client, &request.scope);
        if scopes.is_empty() {
            return Err(reject(IssueRejection::NoGrantableScope));
        }
        let scope = scopes.join(" ");

        let secret = self.keys.current_signing_secret()?;
        let claims = self.config.claims_for(&client.client_id, &scope, now);

        let access_token = sign_claims(&claims, &secret).map_err(|e| {
            error!(client_id = %client.client_id, error = %e, "failed to sign access token");
            AuthError::ClientRejected(IssueRejection::SigningFailed)
        })?;

        info!(client_id = %client.client_id, scope = %scope, jti = %claims.jti, "access token issued");

        Ok(IssuedToken {
            access_token,
            token_type: TOKEN_TYPE_BEARER.to_string(),
            expires_in: self.config.ttl.num_seconds(),
            scope,
            issued_at: claims.iat,
        })
    }

    /// Requested scopes the client holds and the service recognizes, in
    /// request order
    pub fn grantable_scopes(&self, client: &Client, requested: &str) -> Vec<String> {
        parse_scopes(requested)
            .into_iter()
            .filter(|s| client.allows_scope(s) && self.config.valid_scopes.contains(s))
            .collect()
    }

    /// Validate a token against the current signing secret.
    ///
    /// Audience, issuer, not-before and expiry are all checked with no clock
    /// skew allowance.
    pub fn validate(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let secret = self.keys.current_signing_secret()?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);
        validation.set_required_spec_claims(&["exp", "nbf", "iat", "iss", "aud", "sub"]);

        let token_data = decode::<TokenClaims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map_err(|e| AuthError::TokenRejected(classify(e.kind())))?;

        let claims = token_data.claims;
        if claims.sub != claims.client_id {
            return Err(AuthError::TokenRejected(TokenRejection::Malformed));
        }

        Ok(claims)
    }
}

fn classify(kind: &ErrorKind) -> TokenRejection {
    match kind {
        ErrorKind::ExpiredSignature => TokenRejection::Expired,
        ErrorKind::InvalidSignature => TokenRejection::BadSignature,
        ErrorKind::ImmatureSignature => TokenRejection::NotYetValid,
        ErrorKind::InvalidAudience => TokenRejection::WrongAudience,
        ErrorKind::InvalidIssuer => TokenRejection::WrongIssuer,
        _ => TokenRejection::Malformed,
    }
}
