//! HTTP server bootstrap.
//!
//! This module wires together:
//! - configuration
//! - the key provider and authenticators
//! - the expense store
//! - the Axum router

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use crate::auth::{
    parse_scopes, ApiKeyMode, ApiKeyModeSetting, ApiKeyValidator, AuthMiddlewareState,
    AuthStrategy, Authenticator, ClientDirectory, ClientRegistry, TokenConfig, TokenService,
};
use crate::infra::{shutdown_signal, ExpenseStore, InMemoryExpenseStore};
use crate::keys::{ExternalKeyProvider, KeyKind, KeyProvider};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server listen address.
    pub listen_addr: SocketAddr,
    pub strategy: AuthStrategy,
    pub api_key_mode: ApiKeyModeSetting,
    pub token: TokenConfig,
    /// Scopes granted to callers authenticated by API key.
    pub api_key_scopes: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let token = TokenConfig::default();
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            strategy: AuthStrategy::Hybrid,
            api_key_mode: ApiKeyModeSetting::External,
            api_key_scopes: token.valid_scopes.iter().cloned().collect(),
            token,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let listen_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .with_context(|| format!("invalid listen address {host}:{port}"))?;

        let strategy = match std::env::var("AUTH_STRATEGY") {
            Ok(v) => v.parse().map_err(|e: String| anyhow::anyhow!(e))?,
            Err(_) => AuthStrategy::Hybrid,
        };

        let api_key_mode = match std::env::var("API_KEY_MODE") {
            Ok(v) => v.parse().map_err(|e: String| anyhow::anyhow!(e))?,
            Err(_) => ApiKeyModeSetting::External,
        };

        let token = TokenConfig::from_env();

        let api_key_scopes = match std::env::var("API_KEY_SCOPES") {
            Ok(v) => {
                let scopes: Vec<String> = parse_scopes(&v)
                    .into_iter()
                    .filter(|s| token.valid_scopes.contains(s))
                    .collect();
                if scopes.is_empty() {
                    anyhow::bail!("API_KEY_SCOPES contains no valid scope: {v:?}");
                }
                scopes
            }
            Err(_) => token.valid_scopes.iter().cloned().collect(),
        };

        Ok(Self {
            listen_addr,
            strategy,
            api_key_mode,
            token,
            api_key_scopes,
        })
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<TokenService>,
    pub keys: Arc<dyn KeyProvider>,
    pub authenticator: Arc<Authenticator>,
    pub expenses: Arc<dyn ExpenseStore>,
    /// Keys the active strategy cannot work without
    pub required_keys: Arc<[KeyKind]>,
}

/// Key material each strategy depends on
pub fn required_keys(strategy: AuthStrategy) -> Vec<KeyKind> {
    match strategy {
        AuthStrategy::Token => vec![KeyKind::SigningSecret],
        AuthStrategy::ApiKey => vec![KeyKind::ApiKey],
        AuthStrategy::Hybrid => vec![KeyKind::ApiKey, KeyKind::SigningSecret],
    }
}

/// Fail unless every required key can be served.
pub fn check_required_keys(keys: &dyn KeyProvider, required: &[KeyKind]) -> anyhow::Result<()> {
    for kind in required {
        if let Err(e) = keys.current(*kind) {
            anyhow::bail!("{kind} is required by the configured auth strategy: {e}");
        }
    }
    Ok(())
}

/// Assemble services from configuration and a key provider.
pub fn build_state(
    config: &Config,
    keys: Arc<dyn KeyProvider>,
    clients: Arc<dyn ClientDirectory>,
) -> anyhow::Result<AppState> {
    let tokens = Arc::new(TokenService::new(
        clients,
        keys.clone(),
        config.token.clone(),
    ));

    let mode = match config.api_key_mode {
        ApiKeyModeSetting::External => ApiKeyMode::External(keys.clone()),
        ApiKeyModeSetting::Static => {
            let value = keys
                .current_api_key()
                .context("static API key mode needs an API key at startup")?;
            ApiKeyMode::Static(value)
        }
    };
    let api_keys = Arc::new(ApiKeyValidator::new(mode, config.api_key_scopes.clone()));

    let authenticator = Arc::new(Authenticator::new(
        config.strategy,
        tokens.clone(),
        api_keys,
    ));

    Ok(AppState {
        tokens,
        keys,
        authenticator,
        expenses: Arc::new(InMemoryExpenseStore::new()),
        required_keys: required_keys(config.strategy).into(),
    })
}

/// Start the HTTP server.
pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting expense-auth v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!(
        strategy = %config.strategy,
        api_key_mode = ?config.api_key_mode,
        issuer = %config.token.issuer,
        audience = %config.token.audience,
        token_ttl_minutes = config.token.ttl.num_minutes(),
        "Auth configuration loaded"
    );

    let provider = Arc::new(ExternalKeyProvider::from_env());
    let required = required_keys(config.strategy);
    for kind in &required {
        if let Err(e) = provider.refresh_kind(*kind) {
            warn!(kind = %kind, error = %e, "primary key source unavailable at startup");
        }
    }
    check_required_keys(provider.as_ref(), &required)?;

    let clients = Arc::new(ClientRegistry::with_defaults());
    info!(clients = clients.len(), "Client registry loaded");

    let state = build_state(&config, provider, clients)?;

    let mut app = build_router(state);
    if let Some(cors_layer) = cors_layer_from_env()? {
        app = app.layer(cors_layer);
    }

    info!("Starting HTTP server on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;

    info!("expense-auth is ready to accept connections");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Build the full application router.
///
/// Authentication wraps every route; the bypass list lets health, docs, and
/// the token endpoint through.
pub fn build_router(state: AppState) -> Router {
    let auth_state = AuthMiddlewareState::new(state.authenticator.clone());

    Router::new()
        .merge(crate::api::public_router())
        .nest("/api", crate::api::router())
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            crate::auth::auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer_from_env() -> anyhow::Result<Option<CorsLayer>> {
    let origins = match std::env::var("CORS_ALLOW_ORIGINS") {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };

    let origins = origins.trim();
    if origins.is_empty() {
        return Ok(None);
    }

    let allow_origin = if origins == "*" {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = origins
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<HeaderValue>()
                    .map_err(|e| anyhow::anyhow!("Invalid CORS origin {s:?}: {e}"))
            })
            .collect::<anyhow::Result<_>>()?;
        AllowOrigin::list(origins)
    };

    Ok(Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers([
                axum::http::header::AUTHORIZATION,
                axum::http::header::CONTENT_TYPE,
                axum::http::header::HeaderName::from_static("x-api-key"),
            ]),
    ))
}
