//! Client identity used as the rate-limit key.

use axum::http::HeaderMap;
use std::net::SocketAddr;

pub const UNKNOWN_CLIENT: &str = "unknown";

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Resolve the key for a request: the first `X-Forwarded-For` hop when the
/// proxy is trusted, else the peer IP, else [`UNKNOWN_CLIENT`].
pub fn client_identity(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get(X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(hop) = forwarded {
            return hop.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> Option<SocketAddr> {
        Some("10.0.0.7:51000".parse().unwrap())
    }

    #[test]
    fn test_peer_ip_without_port() {
        assert_eq!(client_identity(&HeaderMap::new(), peer(), false), "10.0.0.7");
    }

    #[test]
    fn test_forwarded_for_ignored_unless_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        assert_eq!(client_identity(&headers, peer(), false), "10.0.0.7");
        assert_eq!(client_identity(&headers, peer(), true), "203.0.113.9");
    }

    #[test]
    fn test_empty_forwarded_for_falls_back() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static(" "));
        assert_eq!(client_identity(&headers, peer(), true), "10.0.0.7");
        assert_eq!(client_identity(&headers, None, true), UNKNOWN_CLIENT);
    }
}
