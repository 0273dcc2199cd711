//! Password lifecycle and the `/auth/*` routes.

pub mod handlers;
pub mod hashing;
pub mod middleware;
pub mod models;
pub mod service;

pub use hashing::CredentialHasher;
pub use models::{
    AuthResponse, ChangePasswordRequest, LoginRequest, MessageResponse, RegisterRequest,
    UserEnvelope,
};
pub use service::PasswordLifecycleManager;
