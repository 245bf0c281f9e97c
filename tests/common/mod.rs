//! Common test utilities and fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;

use expense_auth::auth::{AuthStrategy, ClientRegistry};
use expense_auth::keys::{InMemoryKeyProvider, KeyProvider, SecretValue};
use expense_auth::server::{build_router, build_state, AppState, Config};

pub const API_KEY: &str = "ek_integration_test_key";
pub const SIGNING_SECRET: &str = "integration-test-signing-secret";

pub const DEMO_CLIENT: (&str, &str) = ("demo-client", "demo-secret-12345");
pub const TEST_CLIENT: (&str, &str) = ("test-client", "test-secret-67890");

/// Router plus handles on its key material
pub struct TestApp {
    pub router: Router,
    pub keys: Arc<InMemoryKeyProvider>,
    pub state: AppState,
}

/// Build an app with both keys loaded
pub fn test_app(strategy: AuthStrategy) -> TestApp {
    test_app_with_keys(
        strategy,
        InMemoryKeyProvider::new(
            Some(SecretValue::from(API_KEY)),
            Some(SecretValue::from(SIGNING_SECRET)),
        ),
    )
}

pub fn test_app_with_keys(strategy: AuthStrategy, keys: InMemoryKeyProvider) -> TestApp {
    let keys = Arc::new(keys);
    let config = Config {
        strategy,
        ..Config::default()
    };
    let state = build_state(
        &config,
        keys.clone() as Arc<dyn KeyProvider>,
        Arc::new(ClientRegistry::with_defaults()),
    )
    .unwrap();

    TestApp {
        router: build_router(state.clone()),
        keys,
        state,
    }
}

/// Response pieces the tests look at
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

impl TestResponse {
    pub fn error_code(&self) -> Option<&str> {
        self.body["error"]["code"].as_str()
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };

    TestResponse {
        status,
        headers,
        body,
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn get_with(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
    request_with(Method::GET, uri, headers, None)
}

pub fn request_with(
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub fn token_request(client_id: &str, client_secret: &str, scope: &str) -> Request<Body> {
    request_with(
        Method::POST,
        "/oauth/token",
        &[],
        Some(json!({
            "grant_type": "client_credentials",
            "client_id": client_id,
            "client_secret": client_secret,
            "scope": scope,
        })),
    )
}

/// Issue a token through the HTTP endpoint
pub async fn issue_token(router: &Router, client: (&str, &str), scope: &str) -> String {
    let response = send(router, token_request(client.0, client.1, scope)).await;
    assert_eq!(response.status, StatusCode::OK, "token request failed: {}", response.body);
    response.body["access_token"].as_str().unwrap().to_string()
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

pub fn new_expense_body() -> serde_json::Value {
    json!({
        "description": "Conference hotel",
        "amount_cents": 45000,
        "currency": "eur",
        "category": "travel",
    })
}
