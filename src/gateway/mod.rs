//! HTTP gateway: routing and the admission pipeline.
//!
//! Every routed request passes, in order, through the throttle, the rate
//! limiter and the sanitizer. Protected routes then verify the bearer token.

pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod state;

use anyhow::{Context, Result};
use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post, put},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::admission::{POLICY_VERSION, spawn_sweeper};
use crate::config::AppConfig;
use crate::identity::open_store;
use crate::logging::SECURITY_TARGET;
use crate::user_auth;
use state::AppState;

/// Build the full application router.
///
/// Layers wrap outside-in in reverse of `.layer` order, so the last one
/// added (throttle) sees requests first.
pub fn build_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/auth/me", get(user_auth::handlers::me))
        .route(
            "/auth/change-password",
            put(user_auth::handlers::change_password),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            user_auth::middleware::jwt_auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/auth/register", post(user_auth::handlers::register))
        .route("/auth/login", post(user_auth::handlers::login))
        .merge(protected)
        .layer(from_fn_with_state(
            state.clone(),
            middleware::sanitize_middleware,
        ))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit_middleware,
        ))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::throttle_middleware,
        ))
        .with_state(state)
        // Docs are stateless and sit outside the admission pipeline
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
}

/// Run the gateway until the process is stopped.
pub async fn run_server(config: &AppConfig, port: u16) -> Result<()> {
    let store = open_store(&config.identity).await?;
    let state = Arc::new(AppState::from_config(config, store)?);

    if state.issuer.using_fallback_key() {
        tracing::warn!(
            target: SECURITY_TARGET,
            "Gateway is signing tokens with the development fallback key"
        );
    }

    let _sweeper = spawn_sweeper(
        state.rate_limits.clone(),
        state.throttle.clone(),
        Duration::from_secs(config.admission.sweep_interval_secs),
    );

    let app = build_router(state);

    let addr = format!("{}:{}", config.gateway.host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}; is the port already in use?"))?;

    tracing::info!(
        addr = %addr,
        mode = %config.mode,
        policy_version = POLICY_VERSION,
        "Gateway listening"
    );
    tracing::info!("API docs: http://{}/docs", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;
    Ok(())
}
