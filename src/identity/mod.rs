//! Identity records and the credential store.
//!
//! ## Components
//! - `models`: `IdentityRecord`, `PublicUser`, `Role`
//! - `store`: `CredentialStore` trait and the in-memory implementation
//! - `file_store`: JSON snapshot persistence

pub mod file_store;
pub mod models;
pub mod store;

use std::sync::Arc;

pub use file_store::FileCredentialStore;
pub use models::{IdentityRecord, PublicUser, Role, normalize_email};
pub use store::{CredentialStore, InMemoryCredentialStore, StoreError};

use crate::config::{IdentityConfig, StoreBackend};

/// Build the store selected by configuration.
pub async fn open_store(config: &IdentityConfig) -> anyhow::Result<Arc<dyn CredentialStore>> {
    let store: Arc<dyn CredentialStore> = match config.backend {
        StoreBackend::Memory => Arc::new(InMemoryCredentialStore::new()),
        StoreBackend::File => Arc::new(FileCredentialStore::open(&config.data_file).await?),
    };
    tracing::info!(backend = ?config.backend, "Credential store ready");
    Ok(store)
}
