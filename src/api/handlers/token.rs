//! OAuth2 token endpoint

use std::net::SocketAddr;

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::warn;

use crate::api::error::invalid_body;
use crate::api::ApiError;
use crate::auth::TokenRequest;
use crate::server::AppState;

/// `POST /oauth/token` (client-credentials grant)
pub async fn issue_token(
    State(state): State<AppState>,
    remote: Option<ConnectInfo<SocketAddr>>,
    payload: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let remote = remote
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let Json(request) = payload.map_err(|e| {
        warn!(remote = %remote, error = %e, "unparseable token request");
        invalid_body("Invalid token request")
    })?;

    let issued = state.tokens.issue(&request).map_err(|e| {
        warn!(client_id = %request.client_id, remote = %remote, "token issuance refused");
        ApiError::from(e)
    })?;

    let mut response = Json(issued).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok(response)
}
