//! Bearer token issuance and verification.
//!
//! Tokens are HS256 JWTs carrying subject, email and role. Verification is
//! purely computational; no store lookup happens here.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{AuthConfig, RuntimeMode};
use crate::identity::{IdentityRecord, Role};
use crate::logging::SECURITY_TARGET;

/// Key used only outside production when no secret is configured.
const DEV_FALLBACK_SECRET: &str = "development-only-signing-key-do-not-deploy";

/// Shortest secret accepted in production.
pub const MIN_PRODUCTION_SECRET_LEN: usize = 32;

/// Upper bound on configured token lifetime (one year).
const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// JWT claims.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    /// Subject (identity id)
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expires at (unix seconds)
    pub exp: i64,
}

impl Claims {
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.iat, 0)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    /// Malformed, forged, or signed with another key.
    #[error("token is invalid")]
    Invalid,

    /// Signature checks out but `exp` has passed.
    #[error("token has expired")]
    Expired,
}

#[derive(Debug, thiserror::Error)]
pub enum SigningKeyError {
    #[error("JWT_SECRET must be set in production")]
    Missing,

    #[error("JWT_SECRET must be at least 32 bytes in production")]
    TooShort,

    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

pub struct SessionIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
    using_fallback: bool,
}

impl SessionIssuer {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
            using_fallback: false,
        }
    }

    /// Resolve the signing key for the given posture.
    ///
    /// Production refuses to start without a strong secret; development
    /// falls back to a fixed key and says so loudly.
    pub fn from_config(auth: &AuthConfig, mode: RuntimeMode) -> Result<Self, SigningKeyError> {
        let ttl = Duration::seconds(auth.token_ttl_secs.min(MAX_TTL_SECS) as i64);

        match (auth.jwt_secret.as_deref(), mode) {
            (Some(secret), RuntimeMode::Production) if secret.len() < MIN_PRODUCTION_SECRET_LEN => {
                Err(SigningKeyError::TooShort)
            }
            (Some(secret), _) => Ok(Self::new(secret.as_bytes(), ttl)),
            (None, RuntimeMode::Production) => Err(SigningKeyError::Missing),
            (None, RuntimeMode::Development) => {
                tracing::warn!(
                    target: SECURITY_TARGET,
                    "JWT_SECRET not set; using the built-in development signing key. \
                     Tokens are forgeable by anyone with the source."
                );
                let mut issuer = Self::new(DEV_FALLBACK_SECRET.as_bytes(), ttl);
                issuer.using_fallback = true;
                Ok(issuer)
            }
        }
    }

    pub fn using_fallback_key(&self) -> bool {
        self.using_fallback
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, record: &IdentityRecord) -> Result<String, SigningKeyError> {
        self.issue_at(record, Utc::now())
    }

    pub fn issue_at(
        &self,
        record: &IdentityRecord,
        issued_at: DateTime<Utc>,
    ) -> Result<String, SigningKeyError> {
        let claims = Claims {
            sub: record.id,
            email: record.email.clone(),
            role: record.role,
            iat: issued_at.timestamp(),
            exp: (issued_at + self.ttl).timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Valid only while `now < exp`; the decoder alone still accepts the
    /// second where they are equal.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })?;
        if claims.exp <= now.timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}
