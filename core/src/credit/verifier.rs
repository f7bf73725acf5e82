//! Credential verification with Argon2id
//!
//! Unknown identities are checked against a dummy hash built with the same
//! parameters, so they cost the same work as a wrong password and yield the
//! same `false`.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use meterml_databases::AccountStore;
use rand::RngCore;
use std::sync::Arc;
use tracing::debug;

use crate::config::SecurityConfig;
use crate::error::{CoreError, CoreResult};

const DUMMY_SECRET: &[u8] = b"meterml-absent-account";

pub struct CredentialVerifier {
    store: Arc<dyn AccountStore>,
    hasher: Argon2<'static>,
    dummy_hash: String,
}

impl CredentialVerifier {
    pub fn new(store: Arc<dyn AccountStore>, security: &SecurityConfig) -> CoreResult<Self> {
        let params = Params::new(
            security.memory_kib,
            security.iterations,
            security.parallelism,
            None,
        )
        .map_err(|e| CoreError::internal("argon2 parameters", e))?;
        let hasher = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let dummy_hash = hash_with(&hasher, DUMMY_SECRET)?;

        Ok(Self {
            store,
            hasher,
            dummy_hash,
        })
    }

    /// Salted PHC-format hash of `secret`, for storing with a new account
    pub async fn hash_secret(&self, secret: &str) -> CoreResult<String> {
        let hasher = self.hasher.clone();
        let secret = secret.to_owned();
        tokio::task::spawn_blocking(move || hash_with(&hasher, secret.as_bytes()))
            .await
            .map_err(|e| CoreError::internal("hashing task", e))?
    }

    /// Whether `secret` matches the stored credential of `identity`
    pub async fn verify(&self, identity: &str, secret: &str) -> CoreResult<bool> {
        let stored = self.store.credential(identity).await?;
        let known = stored.is_some();
        let stored = stored.unwrap_or_else(|| self.dummy_hash.clone());

        let hasher = self.hasher.clone();
        let secret = secret.to_owned();
        let matched = tokio::task::spawn_blocking(move || {
            PasswordHash::new(&stored)
                .map(|parsed| hasher.verify_password(secret.as_bytes(), &parsed).is_ok())
                .unwrap_or(false)
        })
        .await
        .map_err(|e| CoreError::internal("verification task", e))?;

        debug!("Credential check for {}: known={}, matched={}", identity, known, matched);
        Ok(known && matched)
    }
}

fn hash_with(hasher: &Argon2<'static>, secret: &[u8]) -> CoreResult<String> {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt = SaltString::encode_b64(&salt).map_err(|e| CoreError::internal("salt", e))?;
    hasher
        .hash_password(secret, &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CoreError::internal("password hashing", e))
}
