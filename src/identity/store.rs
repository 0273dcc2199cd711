//! Credential store interface and the in-memory implementation.
//!
//! Uniqueness of email and username is enforced per key through dashmap
//! entry locks, so two concurrent `put`s for the same email can never
//! both succeed.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use super::models::{IdentityRecord, Role};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email or username already registered")]
    DuplicateIdentity,

    #[error("identity not found")]
    NotFound,

    #[error("credential store unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
}

/// Backing store for identity records.
///
/// Emails passed in are expected to be normalized already
/// (see [`super::normalize_email`]).
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a new record. Fails with `DuplicateIdentity` if the email or
    /// the username (case-insensitive) is taken.
    async fn put(&self, record: IdentityRecord) -> Result<(), StoreError>;

    async fn get(&self, email: &str) -> Result<IdentityRecord, StoreError>;

    async fn get_by_id(&self, id: Uuid) -> Result<IdentityRecord, StoreError>;

    async fn exists(&self, email: &str) -> Result<bool, StoreError>;

    async fn update_password_hash(&self, id: Uuid, password_hash: String)
    -> Result<(), StoreError>;

    async fn set_role(&self, id: Uuid, role: Role) -> Result<(), StoreError>;

    async fn health(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Process-local store.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    /// email -> record
    records: DashMap<String, IdentityRecord>,
    /// lowercased username -> id
    usernames: DashMap<String, Uuid>,
    /// id -> email
    ids: DashMap<Uuid, String>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Clone of every record, for snapshotting.
    pub fn snapshot(&self) -> Vec<IdentityRecord> {
        self.records.iter().map(|r| r.value().clone()).collect()
    }

    pub(crate) fn insert(&self, record: IdentityRecord) -> Result<(), StoreError> {
        let username_key = record.username.to_lowercase();
        let id = record.id;

        // Reserve the username first. Guards are dropped before touching the
        // email map so two shard locks are never held at once.
        match self.usernames.entry(username_key.clone()) {
            Entry::Occupied(_) => return Err(StoreError::DuplicateIdentity),
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }

        let email = record.email.clone();
        match self.records.entry(email.clone()) {
            Entry::Occupied(_) => {
                self.usernames.remove_if(&username_key, |_, owner| *owner == id);
                return Err(StoreError::DuplicateIdentity);
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
        }

        self.ids.insert(id, email);
        Ok(())
    }

    /// Drop a record and release its username and email.
    pub(crate) fn remove(&self, id: Uuid) -> Option<IdentityRecord> {
        let (_, email) = self.ids.remove(&id)?;
        let (_, record) = self.records.remove_if(&email, |_, r| r.id == id)?;
        self.usernames
            .remove_if(&record.username.to_lowercase(), |_, owner| *owner == id);
        Some(record)
    }

    pub(crate) fn find(&self, email: &str) -> Result<IdentityRecord, StoreError> {
        self.records
            .get(email)
            .map(|r| r.value().clone())
            .ok_or(StoreError::NotFound)
    }

    pub(crate) fn find_by_id(&self, id: Uuid) -> Result<IdentityRecord, StoreError> {
        let email = self.email_for(id)?;
        self.find(&email)
    }

    pub(crate) fn modify<F>(&self, id: Uuid, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut IdentityRecord),
    {
        let email = self.email_for(id)?;
        let mut record = self.records.get_mut(&email).ok_or(StoreError::NotFound)?;
        f(record.value_mut());
        Ok(())
    }

    fn email_for(&self, id: Uuid) -> Result<String, StoreError> {
        self.ids
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn put(&self, record: IdentityRecord) -> Result<(), StoreError> {
        self.insert(record)
    }

    async fn get(&self, email: &str) -> Result<IdentityRecord, StoreError> {
        self.find(email)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<IdentityRecord, StoreError> {
        self.find_by_id(id)
    }

    async fn exists(&self, email: &str) -> Result<bool, StoreError> {
        Ok(self.records.contains_key(email))
    }

    async fn update_password_hash(
        &self,
        id: Uuid,
        password_hash: String,
    ) -> Result<(), StoreError> {
        self.modify(id, |record| record.password_hash = password_hash)
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<(), StoreError> {
        self.modify(id, |record| record.role = role)
    }
}
