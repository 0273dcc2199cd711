//! Password lifecycle: registration, login, password change and role
//! promotion.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;
use validator::Validate;

use super::hashing::CredentialHasher;
use super::models::{AuthResponse, ChangePasswordRequest, LoginRequest, RegisterRequest};
use crate::config::AuthConfig;
use crate::error::GatewayError;
use crate::identity::{CredentialStore, IdentityRecord, PublicUser, Role, StoreError, normalize_email};
use crate::logging::SECURITY_TARGET;
use crate::session::SessionIssuer;

pub struct PasswordLifecycleManager {
    store: Arc<dyn CredentialStore>,
    issuer: Arc<SessionIssuer>,
    hasher: CredentialHasher,
    min_password_length: usize,
    /// Verified against when the email is unknown so both failure paths cost
    /// one hash verification.
    dummy_hash: OnceCell<String>,
}

impl PasswordLifecycleManager {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        issuer: Arc<SessionIssuer>,
        auth: &AuthConfig,
    ) -> Result<Self> {
        Ok(Self {
            store,
            issuer,
            hasher: CredentialHasher::new(&auth.hashing)?,
            min_password_length: auth.min_password_length,
            dummy_hash: OnceCell::new(),
        })
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Create an identity with role `user` and issue its first token.
    pub async fn register(&self, req: RegisterRequest) -> Result<AuthResponse, GatewayError> {
        req.validate()?;
        self.check_strength(&req.password)?;

        let email = normalize_email(&req.email);
        let password_hash = self.hasher.hash(req.password).await?;
        let record = IdentityRecord::new(
            req.name.trim().to_string(),
            req.username.trim().to_string(),
            email,
            password_hash,
        );

        self.store.put(record.clone()).await.inspect_err(|e| {
            if matches!(e, StoreError::DuplicateIdentity) {
                tracing::info!(username = %record.username, "Registration for existing identity");
            }
        })?;

        let token = self.issuer.issue(&record)?;
        tracing::info!(user_id = %record.id, "User registered");
        Ok(AuthResponse {
            user: record.to_public(),
            token,
        })
    }

    /// Verify credentials and issue a token. Unknown email and wrong
    /// password are indistinguishable to the caller.
    pub async fn authenticate(&self, req: LoginRequest) -> Result<AuthResponse, GatewayError> {
        req.validate()?;
        let email = normalize_email(&req.email);

        let record = match self.store.get(&email).await {
            Ok(record) => record,
            Err(StoreError::NotFound) => {
                let dummy = self.dummy_hash().await?;
                let _ = self.hasher.verify(req.password, dummy).await;
                tracing::warn!(target: SECURITY_TARGET, "Login failed: unknown email");
                return Err(GatewayError::InvalidCredentials);
            }
            Err(e) => return Err(e.into()),
        };

        if !self
            .hasher
            .verify(req.password, record.password_hash.clone())
            .await?
        {
            tracing::warn!(target: SECURITY_TARGET, user_id = %record.id, "Login failed: wrong password");
            return Err(GatewayError::InvalidCredentials);
        }

        let token = self.issuer.issue(&record)?;
        tracing::info!(user_id = %record.id, "User logged in");
        Ok(AuthResponse {
            user: record.to_public(),
            token,
        })
    }

    /// Replace the password of `subject`. Previously issued tokens stay
    /// valid until they expire.
    pub async fn change_password(
        &self,
        subject: Uuid,
        req: ChangePasswordRequest,
    ) -> Result<(), GatewayError> {
        req.validate()?;
        let record = self.store.get_by_id(subject).await?;

        if !self
            .hasher
            .verify(req.current_password.clone(), record.password_hash.clone())
            .await?
        {
            tracing::warn!(
                target: SECURITY_TARGET,
                user_id = %subject,
                "Password change rejected: wrong current password"
            );
            return Err(GatewayError::InvalidCredentials);
        }

        self.check_strength(&req.new_password)?;
        if req.new_password == req.current_password {
            return Err(GatewayError::WeakPassword(
                "new password must differ from the current password".to_string(),
            ));
        }

        let password_hash = self.hasher.hash(req.new_password).await?;
        self.store
            .update_password_hash(subject, password_hash)
            .await?;
        tracing::info!(user_id = %subject, "Password changed");
        Ok(())
    }

    /// Fresh view of the identity behind a token.
    pub async fn current_user(&self, subject: Uuid) -> Result<PublicUser, GatewayError> {
        let record = self.store.get_by_id(subject).await?;
        Ok(record.to_public())
    }

    /// Change `target`'s role. Only an owner may do this.
    pub async fn promote(
        &self,
        actor: Uuid,
        target: Uuid,
        role: Role,
    ) -> Result<PublicUser, GatewayError> {
        let actor_record = self.store.get_by_id(actor).await?;
        if actor_record.role != Role::Owner {
            tracing::warn!(target: SECURITY_TARGET, actor = %actor, target_id = %target, "Promotion denied");
            return Err(GatewayError::Forbidden);
        }

        self.store.set_role(target, role).await?;
        tracing::info!(actor = %actor, target_id = %target, role = %role, "Role changed");
        self.current_user(target).await
    }

    fn check_strength(&self, password: &str) -> Result<(), GatewayError> {
        if password.chars().count() < self.min_password_length {
            return Err(GatewayError::WeakPassword(format!(
                "password must be at least {} characters",
                self.min_password_length
            )));
        }
        Ok(())
    }

    async fn dummy_hash(&self) -> Result<String, GatewayError> {
        let hash = self
            .dummy_hash
            .get_or_try_init(|| self.hasher.hash(Uuid::new_v4().to_string()))
            .await?;
        Ok(hash.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HashingConfig;
    use crate::identity::InMemoryCredentialStore;
    use chrono::Duration;

    fn manager() -> PasswordLifecycleManager {
        let auth = AuthConfig {
            hashing: HashingConfig {
                memory_kib: 8,
                iterations: 1,
                parallelism: 1,
            },
            ..AuthConfig::default()
        };
        let issuer = SessionIssuer::new(b"service-test-secret-service-test", Duration::days(7));
        PasswordLifecycleManager::new(
            Arc::new(InMemoryCredentialStore::new()),
            Arc::new(issuer),
            &auth,
        )
        .unwrap()
    }

    fn register_req(email: &str, username: &str) -> RegisterRequest {
        RegisterRequest {
            name: "Alice".into(),
            username: username.into(),
            email: email.into(),
            password: "Password1!".into(),
        }
    }

    fn login_req(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn test_register_stores_hash_not_plaintext() {
        let mgr = manager();
        let resp = mgr
            .register(register_req("Alice@Example.com", "alice"))
            .await
            .unwrap();
        assert_eq!(resp.user.email, "alice@example.com");
        assert_eq!(resp.user.role, Role::User);
        assert!(!resp.token.is_empty());

        let stored = mgr.store.get("alice@example.com").await.unwrap();
        assert_ne!(stored.password_hash, "Password1!");
        let json = serde_json::to_string(&resp.user).unwrap();
        assert!(!json.contains(&stored.password_hash));
    }

    #[tokio::test]
    async fn test_register_validation_and_duplicates() {
        let mgr = manager();
        let mut req = register_req("a@example.com", "a");
        req.name = String::new();
        assert!(matches!(
            mgr.register(req).await,
            Err(GatewayError::Validation(_))
        ));

        let mut req = register_req("a@example.com", "a");
        req.password = "short".into();
        assert!(matches!(
            mgr.register(req).await,
            Err(GatewayError::WeakPassword(_))
        ));

        mgr.register(register_req("a@example.com", "a")).await.unwrap();
        assert!(matches!(
            mgr.register(register_req("A@Example.com", "other")).await,
            Err(GatewayError::DuplicateIdentity)
        ));
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let mgr = manager();
        mgr.register(register_req("a@example.com", "a")).await.unwrap();

        let unknown = mgr
            .authenticate(login_req("nobody@example.com", "Password1!"))
            .await
            .unwrap_err();
        let wrong = mgr
            .authenticate(login_req("a@example.com", "Password2!"))
            .await
            .unwrap_err();
        assert_eq!(unknown.to_string(), wrong.to_string());
        assert_eq!(unknown.code(), wrong.code());
    }

    #[tokio::test]
    async fn test_login_token_matches_record() {
        let mgr = manager();
        let registered = mgr.register(register_req("a@example.com", "a")).await.unwrap();
        let resp = mgr
            .authenticate(login_req("A@EXAMPLE.COM", "Password1!"))
            .await
            .unwrap();
        let claims = mgr.issuer.verify(&resp.token).unwrap();
        assert_eq!(claims.sub, registered.user.id);
        assert_eq!(claims.role, Role::User);
    }

    #[tokio::test]
    async fn test_change_password_flow() {
        let mgr = manager();
        let id = mgr
            .register(register_req("a@example.com", "a"))
            .await
            .unwrap()
            .user
            .id;
        let change = |current: &str, new: &str| ChangePasswordRequest {
            current_password: current.into(),
            new_password: new.into(),
        };

        assert!(matches!(
            mgr.change_password(id, change("wrong-one", "Another1!")).await,
            Err(GatewayError::InvalidCredentials)
        ));
        assert!(matches!(
            mgr.change_password(id, change("Password1!", "short")).await,
            Err(GatewayError::WeakPassword(_))
        ));
        assert!(matches!(
            mgr.change_password(id, change("Password1!", "Password1!")).await,
            Err(GatewayError::WeakPassword(_))
        ));
        assert!(matches!(
            mgr.change_password(id, change("", "x")).await,
            Err(GatewayError::Validation(_))
        ));

        mgr.change_password(id, change("Password1!", "Another1!"))
            .await
            .unwrap();
        assert!(
            mgr.authenticate(login_req("a@example.com", "Password1!"))
                .await
                .is_err()
        );
        assert!(
            mgr.authenticate(login_req("a@example.com", "Another1!"))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_promote_requires_owner() {
        let mgr = manager();
        let actor = mgr.register(register_req("o@example.com", "o")).await.unwrap().user.id;
        let target = mgr.register(register_req("t@example.com", "t")).await.unwrap().user.id;

        assert!(matches!(
            mgr.promote(actor, target, Role::Admin).await,
            Err(GatewayError::Forbidden)
        ));

        mgr.store.set_role(actor, Role::Owner).await.unwrap();
        let promoted = mgr.promote(actor, target, Role::Admin).await.unwrap();
        assert_eq!(promoted.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_current_user_not_found() {
        let mgr = manager();
        assert!(matches!(
            mgr.current_user(Uuid::new_v4()).await,
            Err(GatewayError::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicate_registration() {
        let mgr = Arc::new(manager());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let mgr = Arc::clone(&mgr);
                tokio::spawn(async move {
                    mgr.register(register_req("race@example.com", &format!("racer{i}")))
                        .await
                })
            })
            .collect();

        let mut wins = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(GatewayError::DuplicateIdentity) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(wins, 1);
    }
}
