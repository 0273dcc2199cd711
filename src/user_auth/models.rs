//! Request and response bodies for the auth routes.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::identity::PublicUser;

/// User registration request.
///
/// Missing fields deserialize to empty strings so they are reported as
/// validation errors rather than JSON errors. Any `role` field sent by the
/// client is ignored.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100, message = "is required"))]
    #[schema(example = "Alice")]
    pub name: String,
    #[validate(length(min = 1, max = 64, message = "is required"))]
    #[schema(example = "alice")]
    pub username: String,
    #[validate(email(message = "must be a valid email address"))]
    #[schema(example = "alice@example.com")]
    pub email: String,
    #[validate(length(min = 1, message = "is required"))]
    #[schema(example = "Password1!")]
    pub password: String,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "is required"))]
    #[schema(example = "alice@example.com")]
    pub email: String,
    #[validate(length(min = 1, message = "is required"))]
    #[schema(example = "Password1!")]
    pub password: String,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "is required"))]
    pub current_password: String,
    #[validate(length(min = 1, message = "is required"))]
    pub new_password: String,
}

/// Returned by register and login.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub user: PublicUser,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserEnvelope {
    pub user: PublicUser,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Password updated successfully")]
    pub message: String,
}
