//! Authentication middleware for Axum
//!
//! Runs exactly one credential strategy per request, before any protected
//! handler, and attaches the resulting identity to the request extensions.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{header::AUTHORIZATION, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use super::{ApiKeyValidator, AuthError, AuthIdentity, TokenService};
use crate::api::ApiError;

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Path prefixes that never reach a credential handler
pub const DEFAULT_BYPASS_PREFIXES: &[&str] = &["/health", "/ready", "/docs", "/oauth/token"];

/// Which credential handler guards the API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStrategy {
    /// `X-API-Key` only
    ApiKey,
    /// `Authorization: Bearer` only
    Token,
    /// Bearer token first, API key as fallback
    Hybrid,
}

impl FromStr for AuthStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "api_key" | "apikey" => Ok(Self::ApiKey),
            "token" | "jwt" => Ok(Self::Token),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!("unknown auth strategy: {other}")),
        }
    }
}

impl fmt::Display for AuthStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthStrategy::ApiKey => f.write_str("api_key"),
            AuthStrategy::Token => f.write_str("token"),
            AuthStrategy::Hybrid => f.write_str("hybrid"),
        }
    }
}

/// Credentials found on a request.
///
/// `None` means the header was absent; `Some(Err(_))` means it was present
/// but unusable.
struct PresentedCredentials<'a> {
    bearer: Option<Result<&'a str, &'static str>>,
    api_key: Option<Result<&'a str, &'static str>>,
}

impl<'a> PresentedCredentials<'a> {
    fn from_headers(headers: &'a HeaderMap) -> Self {
        let bearer = headers.get(AUTHORIZATION).map(|value| -> Result<&'a str, &'static str> {
            let value = value
                .to_str()
                .map_err(|_| "authorization header is not valid UTF-8")?;
            let (scheme, token) = value
                .split_once(' ')
                .ok_or("authorization header is not a bearer credential")?;
            if !scheme.eq_ignore_ascii_case("bearer") {
                return Err("authorization header is not a bearer credential");
            }
            let token = token.trim();
            if token.is_empty() {
                return Err("bearer token is empty");
            }
            Ok(token)
        });

        let api_key = headers.get(API_KEY_HEADER).map(|value| -> Result<&'a str, &'static str> {
            let value = value
                .to_str()
                .map_err(|_| "API key header is not valid UTF-8")?
                .trim();
            if value.is_empty() {
                return Err("API key header is empty");
            }
            Ok(value)
        });

        Self { bearer, api_key }
    }
}

/// Combined authenticator dispatching to one strategy
pub struct Authenticator {
    strategy: AuthStrategy,
    tokens: Arc<TokenService>,
    api_keys: Arc<ApiKeyValidator>,
}

impl Authenticator {
    pub fn new(
        strategy: AuthStrategy,
        tokens: Arc<TokenService>,
        api_keys: Arc<ApiKeyValidator>,
    ) -> Self {
        Self {
            strategy,
            tokens,
            api_keys,
        }
    }

    pub fn strategy(&self) -> AuthStrategy {
        self.strategy
    }

    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.tokens
    }

    pub fn api_keys(&self) -> &Arc<ApiKeyValidator> {
        &self.api_keys
    }

    /// Authenticate a request from its headers
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<AuthIdentity, AuthError> {
        let presented = PresentedCredentials::from_headers(headers);
        match self.strategy {
            AuthStrategy::ApiKey => self.authenticate_api_key(presented.api_key),
            AuthStrategy::Token => self.authenticate_token(presented.bearer),
            AuthStrategy::Hybrid => self.authenticate_hybrid(presented),
        }
    }

    fn authenticate_token(
        &self,
        bearer: Option<Result<&str, &'static str>>,
    ) -> Result<AuthIdentity, AuthError> {
        let token = bearer
            .ok_or(AuthError::MissingCredential)?
            .map_err(AuthError::MalformedCredential)?;
        self.tokens.validate(token).map(|c| c.into_identity())
    }

    fn authenticate_api_key(
        &self,
        api_key: Option<Result<&str, &'static str>>,
    ) -> Result<AuthIdentity, AuthError> {
        let key = api_key
            .ok_or(AuthError::MissingCredential)?
            .map_err(AuthError::MalformedCredential)?;
        self.api_keys.authenticate(key)
    }

    /// Token path first; any failure there falls through to the API key.
    fn authenticate_hybrid(
        &self,
        presented: PresentedCredentials<'_>,
    ) -> Result<AuthIdentity, AuthError> {
        if presented.bearer.is_none() && presented.api_key.is_none() {
            return Err(AuthError::MissingCredential);
        }

        let token_error = match presented.bearer {
            Some(bearer) => match self.authenticate_token(Some(bearer)) {
                Ok(identity) => return Ok(identity),
                Err(e) => {
                    debug!(error = %e, "token path failed, trying API key");
                    Some(e)
                }
            },
            None => None,
        };

        match (presented.api_key, token_error) {
            (Some(api_key), _) => self.authenticate_api_key(Some(api_key)),
            (None, Some(e)) => Err(e),
            (None, None) => Err(AuthError::MissingCredential),
        }
    }

    /// `WWW-Authenticate` challenge for this strategy
    pub fn challenge(&self) -> &'static str {
        match self.strategy {
            AuthStrategy::ApiKey => "ApiKey header=\"X-API-Key\"",
            AuthStrategy::Token | AuthStrategy::Hybrid => "Bearer realm=\"expense-api\"",
        }
    }
}

/// Identity extension for authenticated requests
#[derive(Clone)]
pub struct AuthIdentityExt(pub AuthIdentity);

/// Authentication middleware configuration/state.
#[derive(Clone)]
pub struct AuthMiddlewareState {
    pub authenticator: Arc<Authenticator>,
    /// Requests whose path starts with one of these skip authentication
    pub bypass_prefixes: Arc<[String]>,
}

impl AuthMiddlewareState {
    pub fn new(authenticator: Arc<Authenticator>) -> Self {
        Self {
            authenticator,
            bypass_prefixes: DEFAULT_BYPASS_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }

    pub fn is_bypassed(&self, path: &str) -> bool {
        is_bypassed(path, &self.bypass_prefixes)
    }
}

/// Prefix match on the request path, regardless of method
pub fn is_bypassed(path: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<AuthMiddlewareState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if state.is_bypassed(request.uri().path()) {
        return next.run(request).await;
    }

    match state.authenticator.authenticate(request.headers()) {
        Ok(identity) => {
            debug!(
                method = %identity.method,
                subject = %identity.subject,
                path = %request.uri().path(),
                "request authenticated"
            );
            request.extensions_mut().insert(AuthIdentityExt(identity));
            next.run(request).await
        }
        Err(e) => {
            let remote = request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            warn!(
                strategy = %state.authenticator.strategy(),
                method = %request.method(),
                path = %request.uri().path(),
                remote = %remote,
                reason = %e,
                "authentication failed"
            );
            auth_error_response(&state.authenticator, e)
        }
    }
}

/// Convert auth error to HTTP response
fn auth_error_response(authenticator: &Authenticator, error: AuthError) -> Response {
    let api_error = ApiError::from(error);
    let status = api_error.status();
    let mut response = api_error.into_response();
    if status == axum::http::StatusCode::UNAUTHORIZED {
        response.headers_mut().insert(
            axum::http::header::WWW_AUTHENTICATE,
            HeaderValue::from_static(authenticator.challenge()),
        );
    }
    response
}
