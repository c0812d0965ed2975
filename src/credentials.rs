//! Credential verification.
//!
//! The [`CredentialStore`] trait maps `(username, secret)` to an
//! [`Identity`]. The default [`StaticCredentialStore`] holds the users from
//! configuration in memory and never changes after start-up.
//!
//! Secrets are stored only as Argon2 PHC hashes. Verification re-derives
//! the hash with the stored salt and parameters; the comparison inside
//! `argon2` is constant-time. Unknown usernames are checked against a
//! decoy hash so both failure paths do the same work and return the same
//! [`VaultError::AuthFailure`].

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use uuid::Uuid;

use context_vault_core::error::VaultError;
use context_vault_core::models::Identity;

use crate::config::UserConfig;

/// Verifies a presented secret for a username.
///
/// Implementations may be backed by any storage. They must not reveal
/// whether the username or the secret was wrong.
pub trait CredentialStore: Send + Sync {
    fn verify(&self, username: &str, secret: &str) -> Result<Identity, VaultError>;
}

/// Hash `secret` into an Argon2id PHC string with a fresh random salt.
pub fn hash_secret(secret: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| anyhow!("failed to hash secret: {}", e))
}

fn secret_matches(secret: &str, phc: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// In-memory username → identity map, read-only after construction.
pub struct StaticCredentialStore {
    users: HashMap<String, Identity>,
    decoy_hash: String,
}

impl StaticCredentialStore {
    pub fn new(identities: impl IntoIterator<Item = Identity>) -> Result<Self> {
        let users = identities
            .into_iter()
            .map(|i| (i.username.clone(), i))
            .collect();
        let decoy_hash = hash_secret(&Uuid::new_v4().to_string())?;
        Ok(Self { users, decoy_hash })
    }

    pub fn from_config(users: &[UserConfig]) -> Result<Self> {
        Self::new(users.iter().map(|u| Identity {
            username: u.username.clone(),
            identity_tag: u.identity_tag.clone(),
            secret_hash: u.secret_hash.clone(),
        }))
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl CredentialStore for StaticCredentialStore {
    fn verify(&self, username: &str, secret: &str) -> Result<Identity, VaultError> {
        match self.users.get(username) {
            Some(identity) if secret_matches(secret, &identity.secret_hash) => Ok(identity.clone()),
            Some(_) => Err(VaultError::AuthFailure),
            None => {
                let _ = secret_matches(secret, &self.decoy_hash);
                Err(VaultError::AuthFailure)
            }
        }
    }
}
