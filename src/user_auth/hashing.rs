//! Argon2id password hashing on the blocking pool.

use anyhow::{Context, Result, anyhow};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use rand::rngs::OsRng;

use crate::config::HashingConfig;

#[derive(Clone)]
pub struct CredentialHasher {
    argon2: Argon2<'static>,
}

impl CredentialHasher {
    pub fn new(config: &HashingConfig) -> Result<Self> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            None,
        )
        .map_err(|e| anyhow!("Invalid argon2 parameters: {}", e))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash with a fresh random salt. Runs off the async executor.
    pub async fn hash(&self, plaintext: String) -> Result<String> {
        let argon2 = self.argon2.clone();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(plaintext.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| anyhow!("Hashing failed: {}", e))
        })
        .await
        .context("Hashing task failed")?
    }

    /// `Ok(false)` on mismatch; `Err` only when the stored hash is unusable.
    pub async fn verify(&self, plaintext: String, stored_hash: String) -> Result<bool> {
        let argon2 = self.argon2.clone();
        tokio::task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&stored_hash)
                .map_err(|e| anyhow!("Invalid hash format: {}", e))?;
            match argon2.verify_password(plaintext.as_bytes(), &parsed) {
                Ok(()) => Ok(true),
                Err(password_hash::Error::Password) => Ok(false),
                Err(e) => Err(anyhow!("Verification failed: {}", e)),
            }
        })
        .await
        .context("Verification task failed")?
    }
}
