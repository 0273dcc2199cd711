//! JSON extractor that reports malformed bodies in the gateway envelope.

use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
};
use serde::de::DeserializeOwned;

use crate::error::GatewayError;

/// Like [`Json`], but a rejection becomes a `VALIDATION_ERROR` response
/// instead of axum's plain-text body.
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e: JsonRejection| GatewayError::validation(format!("Invalid JSON: {}", e.body_text())))?;
        Ok(Self(value))
    }
}
