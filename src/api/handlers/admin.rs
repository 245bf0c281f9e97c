//! Key administration handlers

use axum::extract::{Extension, State};
use axum::Json;
use serde::Deserialize;
use tracing::{error, info};

use crate::api::auth_helpers::ensure_admin;
use crate::api::error::{ApiError, ErrorCode};
use crate::auth::AuthIdentityExt;
use crate::keys::KeyKind;
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ReloadKeysRequest {
    /// Reload only this key; both when absent
    #[serde(default)]
    pub kind: Option<KeyKind>,
}

/// `GET /api/v1/admin/keys`
pub async fn key_status(
    State(state): State<AppState>,
    Extension(AuthIdentityExt(identity)): Extension<AuthIdentityExt>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_admin(&identity)?;
    Ok(Json(serde_json::json!({ "keys": state.keys.status() })))
}

/// `POST /api/v1/admin/keys/reload`
///
/// Drops the cached values and reloads them from their sources immediately.
/// Used by the rotation tooling after it replaces a key file.
pub async fn reload_keys(
    State(state): State<AppState>,
    Extension(AuthIdentityExt(identity)): Extension<AuthIdentityExt>,
    body: Option<Json<ReloadKeysRequest>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_admin(&identity)?;

    let request = body.map(|Json(r)| r).unwrap_or_default();
    let kinds = match request.kind {
        Some(kind) => vec![kind],
        None => vec![KeyKind::ApiKey, KeyKind::SigningSecret],
    };

    for kind in &kinds {
        state.keys.invalidate(*kind);
        if let Err(e) = state.keys.refresh_kind(*kind) {
            error!(kind = %kind, error = %e, requested_by = %identity.subject, "key reload failed");
            return Err(ApiError::new(
                ErrorCode::ServiceUnavailable,
                format!("Reload of {} failed", kind),
            ));
        }
    }

    info!(kinds = ?kinds, requested_by = %identity.subject, "keys reloaded");

    Ok(Json(serde_json::json!({
        "reloaded": kinds,
        "keys": state.keys.status(),
    })))
}
