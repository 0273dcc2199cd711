use axum::{Extension, Json, extract::State, http::StatusCode};
use std::sync::Arc;

use super::models::{
    AuthResponse, ChangePasswordRequest, LoginRequest, MessageResponse, RegisterRequest,
    UserEnvelope,
};
use crate::error::{ErrorResponse, GatewayError};
use crate::gateway::extract::ApiJson;
use crate::gateway::state::AppState;
use crate::session::Claims;

/// Register a new user
///
/// POST /auth/register
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 400, description = "Invalid input, weak password or identity already exists", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), GatewayError> {
    let resp = state.passwords.register(req).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

/// Login
///
/// POST /auth/login
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Missing fields", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<AuthResponse>, GatewayError> {
    Ok(Json(state.passwords.authenticate(req).await?))
}

/// Current user
///
/// GET /auth/me
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Authenticated user", body = UserEnvelope),
        (status = 401, description = "Missing, invalid or expired token", body = ErrorResponse),
        (status = 404, description = "User no longer exists", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UserEnvelope>, GatewayError> {
    let user = state.passwords.current_user(claims.sub).await?;
    Ok(Json(UserEnvelope { user }))
}

/// Change password
///
/// PUT /auth/change-password
#[utoipa::path(
    put,
    path = "/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Missing fields or weak password", body = ErrorResponse),
        (status = 401, description = "Wrong current password or bad token", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, GatewayError> {
    state.passwords.change_password(claims.sub, req).await?;
    Ok(Json(MessageResponse {
        message: "Password updated successfully".to_string(),
    }))
}
