//! REST API integration tests.
//!
//! Drive the full router in-process: bypass list, token endpoint, every auth
//! strategy, scope checks, and the protected expense routes.

mod common;

use axum::http::{header, Method, StatusCode};
use chrono::{Duration, Utc};
use serde_json::json;

use expense_auth::auth::{sign_claims, AuthStrategy, TokenConfig};
use expense_auth::keys::{InMemoryKeyProvider, KeyKind, SecretValue};

use common::*;

// ============================================================================
// Bypass list
// ============================================================================

#[tokio::test]
async fn test_health_needs_no_credentials() {
    let app = test_app(AuthStrategy::Hybrid);

    let response = send(&app.router, get("/health")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "healthy");
}

#[tokio::test]
async fn test_bypass_ignores_bad_credentials() {
    let app = test_app(AuthStrategy::Token);

    let response = send(
        &app.router,
        get_with("/health", &[("authorization", "Bearer garbage")]),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_docs_lists_routes() {
    let app = test_app(AuthStrategy::Hybrid);

    let response = send(&app.router, get("/docs")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["authentication"]["strategy"], "hybrid");
    assert!(response.body["routes"].as_array().unwrap().len() >= 5);
}

#[tokio::test]
async fn test_ready_reports_missing_keys() {
    let app = test_app(AuthStrategy::Hybrid);
    let response = send(&app.router, get("/ready")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ready");

    let app = test_app_with_keys(
        AuthStrategy::Hybrid,
        InMemoryKeyProvider::new(None, Some(SecretValue::from(SIGNING_SECRET))),
    );
    let response = send(&app.router, get("/ready")).await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.body["missing"], json!(["api_key"]));
}

// ============================================================================
// Token endpoint
// ============================================================================

#[tokio::test]
async fn test_issue_token_and_use_it() {
    let app = test_app(AuthStrategy::Token);

    let response = send(
        &app.router,
        token_request(DEMO_CLIENT.0, DEMO_CLIENT.1, "api.read api.write"),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers[header::CACHE_CONTROL], "no-store");
    assert_eq!(response.body["token_type"], "Bearer");
    assert_eq!(response.body["expires_in"], 3600);
    assert_eq!(response.body["scope"], "api.read api.write");

    let token = response.body["access_token"].as_str().unwrap();
    let me = send(
        &app.router,
        get_with("/api/v1/me", &[("authorization", bearer(token).as_str())]),
    )
    .await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["method"], "token");
    assert_eq!(me.body["subject"], "demo-client");
    assert_eq!(me.body["scopes"], json!(["api.read", "api.write"]));
}

#[tokio::test]
async fn test_token_scope_is_narrowed_to_client_grants() {
    let app = test_app(AuthStrategy::Token);

    let response = send(
        &app.router,
        token_request(TEST_CLIENT.0, TEST_CLIENT.1, "api.read api.write"),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["scope"], "api.read");
}

#[tokio::test]
async fn test_token_failures_are_indistinguishable() {
    let app = test_app(AuthStrategy::Token);

    let unknown = send(&app.router, token_request("ghost", "whatever", "api.read")).await;
    let wrong_secret = send(&app.router, token_request(DEMO_CLIENT.0, "wrong", "api.read")).await;
    let no_scope = send(&app.router, token_request(TEST_CLIENT.0, TEST_CLIENT.1, "api.admin")).await;

    for response in [&unknown, &wrong_secret, &no_scope] {
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.error_code(), Some("INVALID_CREDENTIALS"));
    }
    assert_eq!(unknown.body, wrong_secret.body);
    assert_eq!(unknown.body, no_scope.body);
}

#[tokio::test]
async fn test_unsupported_grant_type() {
    let app = test_app(AuthStrategy::Token);

    let response = send(
        &app.router,
        request_with(
            Method::POST,
            "/oauth/token",
            &[],
            Some(json!({
                "grant_type": "password",
                "client_id": DEMO_CLIENT.0,
                "client_secret": DEMO_CLIENT.1,
                "scope": "api.read",
            })),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.error_code(), Some("INVALID_CREDENTIALS"));
}

#[tokio::test]
async fn test_malformed_token_request() {
    let app = test_app(AuthStrategy::Token);

    let response = send(
        &app.router,
        request_with(
            Method::POST,
            "/oauth/token",
            &[],
            Some(json!({ "client_id": DEMO_CLIENT.0 })),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.error_code(), Some("INVALID_REQUEST_BODY"));
}

// ============================================================================
// Strategies
// ============================================================================

#[tokio::test]
async fn test_missing_credentials() {
    let app = test_app(AuthStrategy::Hybrid);

    let response = send(&app.router, get("/api/v1/me")).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.error_code(), Some("MISSING_CREDENTIAL"));
}

#[tokio::test]
async fn test_api_key_strategy() {
    let app = test_app(AuthStrategy::ApiKey);

    let ok = send(&app.router, get_with("/api/v1/me", &[("x-api-key", API_KEY)])).await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.body["method"], "api-key");

    let wrong = send(
        &app.router,
        get_with("/api/v1/me", &[("x-api-key", "ek_wrong")]),
    )
    .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.error_code(), Some("INVALID_CREDENTIALS"));
    assert_eq!(
        wrong.headers[header::WWW_AUTHENTICATE],
        "ApiKey header=\"X-API-Key\""
    );
}

#[tokio::test]
async fn test_token_strategy_ignores_api_key() {
    let app = test_app(AuthStrategy::Token);

    let response = send(&app.router, get_with("/api/v1/me", &[("x-api-key", API_KEY)])).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.error_code(), Some("MISSING_CREDENTIAL"));
}

#[tokio::test]
async fn test_hybrid_falls_back_to_api_key() {
    let app = test_app(AuthStrategy::Hybrid);

    let response = send(
        &app.router,
        get_with(
            "/api/v1/me",
            &[("authorization", "Bearer not-a-token"), ("x-api-key", API_KEY)],
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["method"], "api-key");
}

#[tokio::test]
async fn test_hybrid_prefers_token() {
    let app = test_app(AuthStrategy::Hybrid);
    let token = issue_token(&app.router, DEMO_CLIENT, "api.read").await;

    let response = send(
        &app.router,
        get_with(
            "/api/v1/me",
            &[("authorization", bearer(&token).as_str()), ("x-api-key", "ek_wrong")],
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["method"], "token");
    assert_eq!(response.body["subject"], "demo-client");
}

#[tokio::test]
async fn test_hybrid_both_invalid() {
    let app = test_app(AuthStrategy::Hybrid);

    let response = send(
        &app.router,
        get_with(
            "/api/v1/me",
            &[("authorization", "Bearer not-a-token"), ("x-api-key", "ek_wrong")],
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.error_code(), Some("INVALID_CREDENTIALS"));
    assert_eq!(
        response.headers[header::WWW_AUTHENTICATE],
        "Bearer realm=\"expense-api\""
    );
}

#[tokio::test]
async fn test_expired_and_forged_tokens_look_the_same() {
    let app = test_app(AuthStrategy::Token);
    let config = TokenConfig::default();

    let mut expired = config.claims_for("demo-client", "api.read", Utc::now() - Duration::hours(2));
    expired.exp = (Utc::now() - Duration::hours(1)).timestamp();
    let expired = sign_claims(&expired, &SecretValue::from(SIGNING_SECRET)).unwrap();

    let forged = config.claims_for("demo-client", "api.read api.admin", Utc::now());
    let forged = sign_claims(&forged, &SecretValue::from("attacker-secret")).unwrap();

    let a = send(
        &app.router,
        get_with("/api/v1/me", &[("authorization", bearer(&expired).as_str())]),
    )
    .await;
    let b = send(
        &app.router,
        get_with("/api/v1/me", &[("authorization", bearer(&forged).as_str())]),
    )
    .await;

    assert_eq!(a.status, StatusCode::UNAUTHORIZED);
    assert_eq!(b.status, StatusCode::UNAUTHORIZED);
    assert_eq!(a.body, b.body);
}

#[tokio::test]
async fn test_malformed_authorization_header() {
    let app = test_app(AuthStrategy::Token);

    let response = send(
        &app.router,
        get_with("/api/v1/me", &[("authorization", "Basic ZGVtbzpkZW1v")]),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.error_code(), Some("MALFORMED_CREDENTIAL"));
}

// ============================================================================
// Key rotation at request time
// ============================================================================

#[tokio::test]
async fn test_rotated_api_key_takes_effect() {
    let app = test_app(AuthStrategy::ApiKey);

    app.keys.set(KeyKind::ApiKey, "ek_rotated");

    let old = send(&app.router, get_with("/api/v1/me", &[("x-api-key", API_KEY)])).await;
    assert_eq!(old.status, StatusCode::UNAUTHORIZED);

    let new = send(
        &app.router,
        get_with("/api/v1/me", &[("x-api-key", "ek_rotated")]),
    )
    .await;
    assert_eq!(new.status, StatusCode::OK);
}

#[tokio::test]
async fn test_rotated_signing_secret_rejects_old_tokens() {
    let app = test_app(AuthStrategy::Token);
    let token = issue_token(&app.router, DEMO_CLIENT, "api.read").await;

    app.keys.set(KeyKind::SigningSecret, "next-signing-secret");

    let response = send(
        &app.router,
        get_with("/api/v1/me", &[("authorization", bearer(&token).as_str())]),
    )
    .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let fresh = issue_token(&app.router, DEMO_CLIENT, "api.read").await;
    let response = send(
        &app.router,
        get_with("/api/v1/me", &[("authorization", bearer(&fresh).as_str())]),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
}

// ============================================================================
// Protected routes
// ============================================================================

#[tokio::test]
async fn test_expense_lifecycle_with_api_key() {
    let app = test_app(AuthStrategy::Hybrid);
    let auth = [("x-api-key", API_KEY)];

    let created = send(
        &app.router,
        request_with(Method::POST, "/api/v1/expenses", &auth, Some(new_expense_body())),
    )
    .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["currency"], "EUR");
    let id = created.body["id"].as_str().unwrap().to_string();

    let fetched = send(&app.router, get_with(&format!("/api/v1/expenses/{id}"), &auth)).await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.body["description"], "Conference hotel");

    let listed = send(&app.router, get_with("/api/v1/expenses", &auth)).await;
    assert_eq!(listed.body["count"], 1);

    let deleted = send(
        &app.router,
        request_with(Method::DELETE, &format!("/api/v1/expenses/{id}"), &auth, None),
    )
    .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);

    let gone = send(&app.router, get_with(&format!("/api/v1/expenses/{id}"), &auth)).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
    assert_eq!(gone.error_code(), Some("RESOURCE_NOT_FOUND"));
}

#[tokio::test]
async fn test_read_only_token_cannot_write() {
    let app = test_app(AuthStrategy::Hybrid);
    let token = issue_token(&app.router, TEST_CLIENT, "api.read api.write").await;
    let auth = bearer(&token);

    let listed = send(
        &app.router,
        get_with("/api/v1/expenses", &[("authorization", auth.as_str())]),
    )
    .await;
    assert_eq!(listed.status, StatusCode::OK);

    let created = send(
        &app.router,
        request_with(
            Method::POST,
            "/api/v1/expenses",
            &[("authorization", auth.as_str())],
            Some(new_expense_body()),
        ),
    )
    .await;
    assert_eq!(created.status, StatusCode::FORBIDDEN);
    assert_eq!(created.error_code(), Some("INSUFFICIENT_SCOPE"));
}

#[tokio::test]
async fn test_invalid_expense_rejected() {
    let app = test_app(AuthStrategy::ApiKey);

    let response = send(
        &app.router,
        request_with(
            Method::POST,
            "/api/v1/expenses",
            &[("x-api-key", API_KEY)],
            Some(json!({ "description": "Taxi", "amount_cents": -1 })),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.error_code(), Some("INVALID_FIELD_VALUE"));
    assert_eq!(response.body["error"]["details"]["field"], "amount_cents");
}

#[tokio::test]
async fn test_admin_reload_requires_admin_scope() {
    let app = test_app(AuthStrategy::Hybrid);

    let token = issue_token(&app.router, DEMO_CLIENT, "api.read api.write").await;
    let denied = send(
        &app.router,
        request_with(
            Method::POST,
            "/api/v1/admin/keys/reload",
            &[("authorization", bearer(&token).as_str())],
            None,
        ),
    )
    .await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);

    let allowed = send(
        &app.router,
        request_with(
            Method::POST,
            "/api/v1/admin/keys/reload",
            &[("x-api-key", API_KEY)],
            Some(json!({ "kind": "api_key" })),
        ),
    )
    .await;
    assert_eq!(allowed.status, StatusCode::OK);
    assert_eq!(allowed.body["reloaded"], json!(["api_key"]));
}
