//! JSON-snapshot persistence on top of the in-memory store.
//!
//! Every successful mutation rewrites the snapshot file (write to a temp
//! file, then rename). A mutation whose snapshot write fails is undone in
//! memory before the error is returned. Snapshot writes are serialized by a writer-only
//! mutex; record locks are released before any file I/O starts.

use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::models::{IdentityRecord, Role};
use super::store::{CredentialStore, InMemoryCredentialStore, StoreError};

pub struct FileCredentialStore {
    inner: InMemoryCredentialStore,
    path: PathBuf,
    writer: Mutex<()>,
}

impl FileCredentialStore {
    /// Open the snapshot at `path`, loading existing records if present.
    pub async fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let inner = InMemoryCredentialStore::new();

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let records: Vec<IdentityRecord> = serde_json::from_slice(&bytes)
                    .with_context(|| format!("Corrupt identity snapshot: {}", path.display()))?;
                let count = records.len();
                for record in records {
                    inner
                        .insert(record)
                        .map_err(|e| anyhow::anyhow!("Invalid identity snapshot: {}", e))?;
                }
                tracing::info!(path = %path.display(), count, "Loaded identity snapshot");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
                tracing::info!(path = %path.display(), "Starting with empty identity snapshot");
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read identity snapshot: {}", path.display()));
            }
        }

        Ok(Self {
            inner,
            path,
            writer: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let _guard = self.writer.lock().await;
        // Snapshot under the writer lock so a later writer always sees every
        // earlier mutation.
        let mut records = self.inner.snapshot();
        records.sort_by_key(|r| r.created_at);
        let bytes = serde_json::to_vec_pretty(&records)
            .map_err(|e| StoreError::Unavailable(e.into()))?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| StoreError::Unavailable(e.into()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::Unavailable(e.into()))?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn put(&self, record: IdentityRecord) -> Result<(), StoreError> {
        let id = record.id;
        self.inner.insert(record)?;
        if let Err(e) = self.persist().await {
            self.inner.remove(id);
            return Err(e);
        }
        Ok(())
    }

    async fn get(&self, email: &str) -> Result<IdentityRecord, StoreError> {
        self.inner.find(email)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<IdentityRecord, StoreError> {
        self.inner.find_by_id(id)
    }

    async fn exists(&self, email: &str) -> Result<bool, StoreError> {
        self.inner.exists(email).await
    }

    async fn update_password_hash(
        &self,
        id: Uuid,
        password_hash: String,
    ) -> Result<(), StoreError> {
        let mut previous = String::new();
        self.inner.modify(id, |record| {
            previous = std::mem::replace(&mut record.password_hash, password_hash.clone());
        })?;
        if let Err(e) = self.persist().await {
            // Leave a concurrent writer's value alone
            let _ = self.inner.modify(id, |record| {
                if record.password_hash == password_hash {
                    record.password_hash = previous;
                }
            });
            return Err(e);
        }
        Ok(())
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<(), StoreError> {
        let mut previous = role;
        self.inner.modify(id, |record| {
            previous = std::mem::replace(&mut record.role, role);
        })?;
        if let Err(e) = self.persist().await {
            let _ = self.inner.modify(id, |record| {
                if record.role == role {
                    record.role = previous;
                }
            });
            return Err(e);
        }
        Ok(())
    }

    async fn health(&self) -> Result<(), StoreError> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        tokio::fs::metadata(dir)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Unavailable(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("identity-store-{}", Uuid::new_v4()))
            .join("identities.json")
    }

    fn record(username: &str, email: &str) -> IdentityRecord {
        IdentityRecord::new(
            username.to_string(),
            username.to_string(),
            email.to_string(),
            "$argon2id$stub".to_string(),
        )
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let path = temp_path();
        let id = {
            let store = FileCredentialStore::open(&path).await.unwrap();
            let alice = record("alice", "alice@example.com");
            let id = alice.id;
            store.put(alice).await.unwrap();
            store.set_role(id, Role::Admin).await.unwrap();
            id
        };

        let reopened = FileCredentialStore::open(&path).await.unwrap();
        let stored = reopened.get_by_id(id).await.unwrap();
        assert_eq!(stored.email, "alice@example.com");
        assert_eq!(stored.role, Role::Admin);

        // Uniqueness index is rebuilt on load
        assert!(matches!(
            reopened.put(record("alice", "new@example.com")).await,
            Err(StoreError::DuplicateIdentity)
        ));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_does_not_touch_file() {
        let path = temp_path();
        let store = FileCredentialStore::open(&path).await.unwrap();
        store.put(record("alice", "alice@example.com")).await.unwrap();
        let before = std::fs::read(&path).unwrap();

        assert!(store.put(record("bob", "alice@example.com")).await.is_err());
        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert!(store.health().await.is_ok());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_trace() {
        let path = temp_path();
        let store = FileCredentialStore::open(&path).await.unwrap();
        let alice = record("alice", "alice@example.com");
        let id = alice.id;
        store.put(alice).await.unwrap();

        // Snapshot directory gone: every write fails
        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();

        let bob = record("bob", "bob@example.com");
        assert!(matches!(store.put(bob).await, Err(StoreError::Unavailable(_))));
        assert!(matches!(
            store.get("bob@example.com").await,
            Err(StoreError::NotFound)
        ));

        assert!(store
            .update_password_hash(id, "$argon2id$new".to_string())
            .await
            .is_err());
        assert!(store.set_role(id, Role::Owner).await.is_err());
        let stored = store.get_by_id(id).await.unwrap();
        assert_eq!(stored.password_hash, "$argon2id$stub");
        assert_eq!(stored.role, Role::User);

        // Once the directory is back the same identity registers cleanly
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        store.put(record("bob", "bob@example.com")).await.unwrap();

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_fails_open() {
        let path = temp_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"not json").unwrap();

        assert!(FileCredentialStore::open(&path).await.is_err());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
