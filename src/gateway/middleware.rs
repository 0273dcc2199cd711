//! Admission pipeline layers.
//!
//! Applied outermost first: throttle, rate limit, sanitize. Bearer token
//! verification runs after these as a route layer on protected routes.

use axum::{
    body::{Body, to_bytes},
    extract::{ConnectInfo, State},
    http::{HeaderName, HeaderValue, Request, Uri, header},
    middleware::Next,
    response::Response,
};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;

use super::state::AppState;
use crate::admission::{RouteClass, client_identity};
use crate::error::GatewayError;
use crate::logging::SECURITY_TARGET;
use crate::sanitize::sanitize_query;

const RATELIMIT_LIMIT: &str = "ratelimit-limit";
const RATELIMIT_REMAINING: &str = "ratelimit-remaining";
const RATELIMIT_RESET: &str = "ratelimit-reset";

fn request_client(state: &AppState, request: &Request<Body>) -> String {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    client_identity(request.headers(), peer, state.trust_forwarded_for)
}

/// Hold requests from clients past the soft threshold.
pub async fn throttle_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = request_client(&state, &request);
    if let Some(delay) = state.throttle.observe(&client) {
        tracing::debug!(client = %client, delay_ms = delay.as_millis() as u64, "Throttling client");
        tokio::time::sleep(delay).await;
    }
    next.run(request).await
}

/// Reject requests over the hard limit for their route class.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, GatewayError> {
    let client = request_client(&state, &request);
    let class = RouteClass::for_path(request.uri().path());

    let admitted = state.rate_limits.admit(&client, class).inspect_err(|e| {
        tracing::warn!(
            target: SECURITY_TARGET,
            client = %client,
            route_class = %class,
            limit = e.limit,
            retry_after_secs = e.retry_after_secs(),
            "Rate limit exceeded"
        );
    })?;

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        HeaderName::from_static(RATELIMIT_LIMIT),
        HeaderValue::from(admitted.limit),
    );
    headers.insert(
        HeaderName::from_static(RATELIMIT_REMAINING),
        HeaderValue::from(admitted.remaining),
    );
    headers.insert(
        HeaderName::from_static(RATELIMIT_RESET),
        HeaderValue::from(admitted.reset_after_secs()),
    );
    Ok(response)
}

/// Strip injection patterns from query values and JSON bodies before any
/// handler sees them.
pub async fn sanitize_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, GatewayError> {
    let (mut parts, body) = request.into_parts();

    if let Some(cleaned) = parts.uri.query().and_then(sanitize_query) {
        tracing::warn!(
            target: SECURITY_TARGET,
            path = %parts.uri.path(),
            "Stripped injection patterns from query string"
        );
        parts.uri = with_query(&parts.uri, &cleaned)?;
    }

    if !is_json(&parts.headers) {
        return Ok(next.run(Request::from_parts(parts, body)).await);
    }

    let declared_len = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared_len.is_some_and(|len| len > state.max_body_bytes) {
        return Err(GatewayError::PayloadTooLarge);
    }

    let bytes = to_bytes(body, state.max_body_bytes).await.map_err(|e| {
        tracing::debug!(error = %e, "Failed to buffer request body");
        GatewayError::PayloadTooLarge
    })?;

    // Unparseable bodies go through untouched; the handler's extractor
    // reports them.
    let Ok(mut value) = serde_json::from_slice::<Value>(&bytes) else {
        return Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await);
    };

    let report = state.sanitizer.sanitize(&mut value)?;
    if report.modified == 0 {
        return Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await);
    }

    tracing::warn!(
        target: SECURITY_TARGET,
        path = %parts.uri.path(),
        fields = report.modified,
        "Stripped injection patterns from request body"
    );
    let cleaned = serde_json::to_vec(&value).map_err(anyhow::Error::from)?;
    parts
        .headers
        .insert(header::CONTENT_LENGTH, HeaderValue::from(cleaned.len()));
    Ok(next.run(Request::from_parts(parts, Body::from(cleaned))).await)
}

fn is_json(headers: &axum::http::HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| {
            let mime = mime.trim().to_ascii_lowercase();
            mime == "application/json" || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

fn with_query(uri: &Uri, query: &str) -> Result<Uri, GatewayError> {
    let mut parts = uri.clone().into_parts();
    let path_and_query = format!("{}?{}", uri.path(), query);
    parts.path_and_query = Some(
        path_and_query
            .parse()
            .map_err(|_| GatewayError::validation("Malformed query string"))?,
    );
    Uri::from_parts(parts).map_err(|_| GatewayError::validation("Malformed query string"))
}
