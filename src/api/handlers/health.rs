//! Health, readiness, and documentation handlers
//!
//! All three are on the bypass list and answer without credentials.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::keys::{KeyKind, KeyStatus};
use crate::server::AppState;

/// Response for the basic health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `healthy` when the process answers
    pub status: &'static str,
    /// Service name
    pub service: &'static str,
    /// Service version
    pub version: &'static str,
    /// Timestamp of health check
    pub timestamp: String,
}

/// Readiness report
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub strategy: String,
    /// Key material the active strategy needs but cannot load
    pub missing: Vec<KeyKind>,
    pub keys: Vec<KeyStatus>,
}

/// `GET /health`
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "expense-auth",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `GET /ready`
///
/// Ready once every key the active strategy depends on can be served.
pub async fn readiness_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let missing: Vec<KeyKind> = state
        .required_keys
        .iter()
        .copied()
        .filter(|kind| state.keys.current(*kind).is_err())
        .collect();

    let (status_code, status) = if missing.is_empty() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not_ready")
    };

    (
        status_code,
        Json(ReadinessResponse {
            status,
            strategy: state.authenticator.strategy().to_string(),
            missing,
            keys: state.keys.status(),
        }),
    )
}

/// One documented route
#[derive(Debug, Clone, Serialize)]
pub struct RouteDoc {
    pub method: &'static str,
    pub path: &'static str,
    /// Required scope, or `None` for unauthenticated routes
    pub scope: Option<&'static str>,
    pub description: &'static str,
}

pub const ROUTES: &[RouteDoc] = &[
    RouteDoc {
        method: "GET",
        path: "/health",
        scope: None,
        description: "Liveness probe",
    },
    RouteDoc {
        method: "GET",
        path: "/ready",
        scope: None,
        description: "Readiness probe, reports key material status",
    },
    RouteDoc {
        method: "GET",
        path: "/docs",
        scope: None,
        description: "This listing",
    },
    RouteDoc {
        method: "POST",
        path: "/oauth/token",
        scope: None,
        description: "Client-credentials token issuance",
    },
    RouteDoc {
        method: "GET",
        path: "/api/v1/me",
        scope: None,
        description: "Identity of the authenticated caller",
    },
    RouteDoc {
        method: "GET",
        path: "/api/v1/expenses",
        scope: Some("api.read"),
        description: "List expenses",
    },
    RouteDoc {
        method: "POST",
        path: "/api/v1/expenses",
        scope: Some("api.write"),
        description: "Create an expense",
    },
    RouteDoc {
        method: "GET",
        path: "/api/v1/expenses/:id",
        scope: Some("api.read"),
        description: "Fetch one expense",
    },
    RouteDoc {
        method: "DELETE",
        path: "/api/v1/expenses/:id",
        scope: Some("api.write"),
        description: "Delete an expense",
    },
    RouteDoc {
        method: "GET",
        path: "/api/v1/admin/keys",
        scope: Some("api.admin"),
        description: "Key cache status",
    },
    RouteDoc {
        method: "POST",
        path: "/api/v1/admin/keys/reload",
        scope: Some("api.admin"),
        description: "Reload key material from its sources",
    },
];

/// `GET /docs`
pub async fn api_docs(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "expense-auth",
        "version": env!("CARGO_PKG_VERSION"),
        "authentication": {
            "strategy": state.authenticator.strategy().to_string(),
            "token_endpoint": "/oauth/token",
            "api_key_header": "X-API-Key",
        },
        "routes": ROUTES,
    }))
}
