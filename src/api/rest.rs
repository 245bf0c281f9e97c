//! REST API routes.

use axum::extract::Extension;
use axum::routing::{get, post};
use axum::{Json, Router};

use super::handlers::{admin, expenses, health, token};
use crate::auth::{AuthIdentity, AuthIdentityExt};
use crate::server::AppState;

/// Build the `/api` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/me", get(me))
        // Expenses
        .route(
            "/v1/expenses",
            get(expenses::list_expenses).post(expenses::create_expense),
        )
        .route(
            "/v1/expenses/:id",
            get(expenses::get_expense).delete(expenses::delete_expense),
        )
        // Key administration
        .route("/v1/admin/keys", get(admin::key_status))
        .route("/v1/admin/keys/reload", post(admin::reload_keys))
}

/// Routes that skip authentication through the bypass list.
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/docs", get(health::api_docs))
        .route("/oauth/token", post(token::issue_token))
}

/// `GET /api/v1/me`
async fn me(Extension(AuthIdentityExt(identity)): Extension<AuthIdentityExt>) -> Json<AuthIdentity> {
    Json(identity)
}
