//! Shared helpers for driving the full router in-process.
#![allow(dead_code)]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Request, StatusCode, header};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use admission_gateway::config::{AppConfig, HashingConfig};
use admission_gateway::{AppState, CredentialStore, InMemoryCredentialStore, build_router};

pub const SECRET: &str = "integration-test-secret-0123456789abcdef";

/// Development config with a fixed secret and cheap hashing.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.jwt_secret = Some(SECRET.to_string());
    config.auth.hashing = HashingConfig {
        memory_kib: 8,
        iterations: 1,
        parallelism: 1,
    };
    config
}

pub fn app_with(config: &AppConfig) -> (Router, Arc<AppState>) {
    let store: Arc<dyn CredentialStore> = Arc::new(InMemoryCredentialStore::new());
    let state = Arc::new(AppState::from_config(config, store).unwrap());
    (build_router(state.clone()), state)
}

pub fn app() -> (Router, Arc<AppState>) {
    app_with(&test_config())
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub async fn send(app: &Router, request: Request<Body>) -> TestResponse {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    TestResponse {
        status,
        headers,
        body,
    }
}

pub fn json_request(method: &str, uri: &str, body: &Value, token: Option<&str>) -> Request<Body> {
    raw_json_request(method, uri, body.to_string(), token)
}

pub fn raw_json_request(
    method: &str,
    uri: &str,
    body: String,
    token: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body)).unwrap()
}

pub fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn registration(name: &str, username: &str, email: &str, password: &str) -> Value {
    serde_json::json!({
        "name": name,
        "username": username,
        "email": email,
        "password": password,
    })
}

pub fn credentials(email: &str, password: &str) -> Value {
    serde_json::json!({ "email": email, "password": password })
}
