use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::error::GatewayError;
use crate::gateway::state::AppState;
use crate::logging::SECURITY_TARGET;
use crate::session::TokenError;

const BEARER_SCHEME: &str = "bearer";

/// Token from an `Authorization` value. The scheme name is matched
/// case-insensitively.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim_start().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case(BEARER_SCHEME) && !token.is_empty()).then_some(token)
}

/// Verify the bearer token and expose its [`crate::session::Claims`] to
/// the handler as a request extension.
pub async fn jwt_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, GatewayError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(GatewayError::MissingToken)?;

    let token = bearer_token(auth_header).ok_or(GatewayError::MissingToken)?;

    match state.issuer.verify(token) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            Ok(next.run(request).await)
        }
        Err(e) => {
            match e {
                TokenError::Expired => {
                    tracing::info!(target: SECURITY_TARGET, "Rejected expired token")
                }
                TokenError::Invalid => {
                    tracing::warn!(target: SECURITY_TARGET, "Rejected invalid token")
                }
            }
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_scheme_any_case() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(bearer_token("bearer abc"), Some("abc"));
        assert_eq!(bearer_token("BEARER  abc "), Some("abc"));
    }

    #[test]
    fn test_other_schemes_rejected() {
        assert_eq!(bearer_token("Basic dXNlcjpwYXNz"), None);
        assert_eq!(bearer_token("Bearer"), None);
        assert_eq!(bearer_token("Bearer   "), None);
        assert_eq!(bearer_token("abc.def.ghi"), None);
    }
}
