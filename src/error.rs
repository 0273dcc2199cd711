//! Gateway error types.
//!
//! Every failure that reaches the HTTP boundary is converted into a
//! [`GatewayError`] and rendered as a `{code, error, message}` JSON envelope.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::admission::RateLimitExceeded;
use crate::identity::StoreError;
use crate::sanitize::SanitizeError;
use crate::session::{SigningKeyError, TokenError};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    Validation(String),

    #[error("email or username already registered")]
    DuplicateIdentity,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("{0}")]
    WeakPassword(String),

    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid token")]
    TokenInvalid,

    #[error("token expired")]
    TokenExpired,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("insufficient permissions")]
    Forbidden,

    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),

    #[error("request body too large")]
    PayloadTooLarge,

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Stable numeric id.
    pub fn code(&self) -> i32 {
        match self {
            Self::Validation(_) => 1001,
            Self::DuplicateIdentity => 1002,
            Self::WeakPassword(_) => 1003,
            Self::InvalidCredentials => 2001,
            Self::MissingToken => 2002,
            Self::TokenInvalid => 2003,
            Self::TokenExpired => 2004,
            Self::Forbidden => 2005,
            Self::NotFound(_) => 3001,
            Self::RateLimited(_) => 4001,
            Self::PayloadTooLarge => 4002,
            Self::Internal(_) => 5001,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::DuplicateIdentity => "DUPLICATE_IDENTITY",
            Self::WeakPassword(_) => "WEAK_PASSWORD",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::MissingToken => "MISSING_TOKEN",
            Self::TokenInvalid => "TOKEN_INVALID",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::RateLimited(_) => "RATE_LIMIT_EXCEEDED",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::DuplicateIdentity | Self::WeakPassword(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::InvalidCredentials
            | Self::MissingToken
            | Self::TokenInvalid
            | Self::TokenExpired => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "Internal server error".to_string(),
            Self::RateLimited(_) => "Too many requests, please try again later".to_string(),
            other => other.to_string(),
        }
    }
}

/// JSON body for every error response.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub code: i32,
    pub error: String,
    pub message: String,
    /// Seconds until the rate-limit window resets (429 only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        if let Self::Internal(ref err) = self {
            tracing::error!(error = ?err, "Internal gateway error");
        }

        let retry_after = match &self {
            Self::RateLimited(exceeded) => Some(exceeded.retry_after_secs()),
            _ => None,
        };
        let body = ErrorResponse {
            code: self.code(),
            error: self.name().to_string(),
            message: self.public_message(),
            retry_after,
        };

        let mut response = (self.http_status(), Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateIdentity => Self::DuplicateIdentity,
            StoreError::NotFound => Self::NotFound("user"),
            StoreError::Unavailable(e) => Self::Internal(e.context("credential store unavailable")),
        }
    }
}

impl From<TokenError> for GatewayError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid => Self::TokenInvalid,
            TokenError::Expired => Self::TokenExpired,
        }
    }
}

impl From<SigningKeyError> for GatewayError {
    fn from(err: SigningKeyError) -> Self {
        Self::Internal(anyhow::Error::new(err))
    }
}

impl From<SanitizeError> for GatewayError {
    fn from(err: SanitizeError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<validator::ValidationErrors> for GatewayError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let reason = errs
                    .iter()
                    .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| "is invalid".to_string());
                format!("{field} {reason}")
            })
            .collect();
        fields.sort();
        Self::Validation(fields.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::RouteClass;
    use std::time::Duration;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_http_status() {
        assert_eq!(
            GatewayError::validation("x").http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::DuplicateIdentity.http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::TokenExpired.http_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::PayloadTooLarge.http_status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn test_token_errors_stay_distinct() {
        let invalid: GatewayError = TokenError::Invalid.into();
        let expired: GatewayError = TokenError::Expired.into();
        assert_eq!(invalid.name(), "TOKEN_INVALID");
        assert_eq!(expired.name(), "TOKEN_EXPIRED");
        assert_ne!(invalid.code(), expired.code());
    }

    #[tokio::test]
    async fn test_rate_limited_envelope() {
        let err = GatewayError::from(RateLimitExceeded {
            route_class: RouteClass::Auth,
            limit: 5,
            retry_after: Duration::from_millis(42_300),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "43");

        let body = body_json(response).await;
        assert_eq!(body["error"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(body["retryAfter"], 43);
        assert_eq!(body["code"], 4001);
    }

    #[tokio::test]
    async fn test_internal_detail_not_echoed() {
        let err = GatewayError::from(StoreError::Unavailable(anyhow::anyhow!(
            "disk /var/secret full"
        )));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["message"], "Internal server error");
        assert!(body.get("retryAfter").is_none());
        assert!(!body.to_string().contains("secret"));
    }
}
