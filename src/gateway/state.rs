use anyhow::{Context, Result};
use std::sync::Arc;

use crate::admission::{AdmissionPolicy, AdmissionThrottle, RateLimitCounter};
use crate::config::{AppConfig, RuntimeMode};
use crate::identity::CredentialStore;
use crate::sanitize::PayloadSanitizer;
use crate::session::SessionIssuer;
use crate::user_auth::PasswordLifecycleManager;

/// Shared application state
pub struct AppState {
    pub mode: RuntimeMode,
    pub store: Arc<dyn CredentialStore>,
    pub issuer: Arc<SessionIssuer>,
    pub passwords: Arc<PasswordLifecycleManager>,
    pub rate_limits: Arc<RateLimitCounter>,
    pub throttle: Arc<AdmissionThrottle>,
    pub sanitizer: PayloadSanitizer,
    pub max_body_bytes: usize,
    pub trust_forwarded_for: bool,
}

impl AppState {
    /// Wire every component from configuration. Fails if the signing key
    /// does not satisfy the runtime mode.
    pub fn from_config(config: &AppConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let issuer = Arc::new(
            SessionIssuer::from_config(&config.auth, config.mode)
                .context("Invalid signing key configuration")?,
        );
        let passwords = Arc::new(PasswordLifecycleManager::new(
            Arc::clone(&store),
            Arc::clone(&issuer),
            &config.auth,
        )?);

        let policy = AdmissionPolicy::from_config(config.mode, &config.admission);
        let throttle = Arc::new(AdmissionThrottle::new(policy.throttle));

        Ok(Self {
            mode: config.mode,
            store,
            issuer,
            passwords,
            rate_limits: Arc::new(RateLimitCounter::new(policy)),
            throttle,
            sanitizer: PayloadSanitizer::from_config(&config.sanitizer),
            max_body_bytes: config.sanitizer.max_body_bytes,
            trust_forwarded_for: config.gateway.trust_forwarded_for,
        })
    }
}
