//! Admission Gateway - request admission and identity verification
//!
//! # Modules
//!
//! - [`config`] - YAML configuration and runtime mode
//! - [`identity`] - Identity records and the pluggable credential store
//! - [`session`] - Bearer token issuance and verification
//! - [`user_auth`] - Password lifecycle and the `/auth/*` routes
//! - [`admission`] - Rate limiting and throttling
//! - [`sanitize`] - Payload sanitization
//! - [`gateway`] - Router, admission pipeline and server
//! - [`error`] - Error envelope shared by every route

pub mod admission;
pub mod config;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod logging;
pub mod sanitize;
pub mod session;
pub mod user_auth;

// Convenient re-exports at crate root
pub use admission::{AdmissionPolicy, AdmissionThrottle, RateLimitCounter, RouteClass};
pub use config::{AppConfig, RuntimeMode};
pub use error::GatewayError;
pub use gateway::{build_router, run_server, state::AppState};
pub use identity::{CredentialStore, IdentityRecord, InMemoryCredentialStore, PublicUser, Role};
pub use sanitize::PayloadSanitizer;
pub use session::{Claims, SessionIssuer, TokenError};
pub use user_auth::PasswordLifecycleManager;
