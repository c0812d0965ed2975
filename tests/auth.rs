//! Credential and token lifecycle through the public `Vault` surface.

use chrono::Utc;
use context_vault::credentials::{hash_secret, CredentialStore, StaticCredentialStore};
use context_vault::ingest::IngestionPipeline;
use context_vault::retrieve::RetrievalPipeline;
use context_vault::token::TokenService;
use context_vault::vault::Vault;
use context_vault_core::embedding::HashingEmbedder;
use context_vault_core::error::{TokenError, VaultError};
use context_vault_core::models::Identity;
use context_vault_core::store::memory::InMemoryVectorStore;
use std::sync::Arc;
use std::time::Duration;

const KEY: [u8; 32] = [9u8; 32];

fn users() -> Vec<(&'static str, &'static str, &'static str)> {
    vec![
        ("admin", "admin-pw", "tenant-admin"),
        ("ops", "ops-pw", "tenant-ops"),
        ("viewer", "viewer-pw", "tenant-viewer"),
    ]
}

fn credential_store() -> Arc<StaticCredentialStore> {
    Arc::new(
        StaticCredentialStore::new(users().into_iter().map(|(u, s, t)| Identity {
            username: u.into(),
            identity_tag: t.into(),
            secret_hash: hash_secret(s).unwrap(),
        }))
        .unwrap(),
    )
}

fn vault(credentials: Arc<StaticCredentialStore>) -> Vault {
    let embedder = Arc::new(HashingEmbedder::default());
    let store = Arc::new(InMemoryVectorStore::new());
    Vault::new(
        credentials,
        TokenService::new(KEY.to_vec(), Duration::from_secs(300)),
        IngestionPipeline::new(embedder.clone(), store.clone()),
        RetrievalPipeline::new(embedder, store),
    )
}

#[tokio::test]
async fn test_login_then_verify_matches_credential_store() {
    let credentials = credential_store();
    let vault = vault(credentials.clone());

    for (username, secret, _) in users() {
        let direct = credentials.verify(username, secret).unwrap();
        let issued = vault.login(username, secret).await.unwrap();
        let verified = vault.authenticate(&issued.token).unwrap();
        assert_eq!(verified.identity_tag, direct.identity_tag);
        assert_eq!(verified.subject, username);
    }
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let vault = vault(credential_store());
    let wrong_secret = vault.login("admin", "ops-pw").await.unwrap_err();
    let unknown_user = vault.login("root", "admin-pw").await.unwrap_err();
    let empty = vault.login("", "").await.unwrap_err();
    assert_eq!(wrong_secret, VaultError::AuthFailure);
    assert_eq!(wrong_secret, unknown_user);
    assert_eq!(unknown_user, empty);
}

#[tokio::test]
async fn test_expired_token_is_rejected_by_operations() {
    let vault = vault(credential_store());
    let issuer = TokenService::new(KEY.to_vec(), Duration::from_secs(300));
    let admin = Identity {
        username: "admin".into(),
        identity_tag: "tenant-admin".into(),
        secret_hash: String::new(),
    };
    let stale = issuer
        .issue_at(
            &admin,
            Duration::from_secs(60),
            Utc::now() - chrono::Duration::seconds(120),
        )
        .unwrap()
        .token;

    assert_eq!(
        vault.authenticate(&stale),
        Err(VaultError::Token(TokenError::Expired))
    );
    let err = vault.ingest(&stale, &["x".into()]).await.unwrap_err();
    assert_eq!(err, VaultError::Token(TokenError::Expired));
    let err = vault.retrieve(&stale, "x", Some(1)).await.unwrap_err();
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn test_tampered_token_is_rejected_by_operations() {
    let vault = vault(credential_store());
    let token = vault.login("ops", "ops-pw").await.unwrap().token;

    // Replace the final signature symbol.
    let mut chars: Vec<char> = token.chars().collect();
    let last = chars.len() - 1;
    chars[last] = if chars[last] == 'A' { 'B' } else { 'A' };
    let tampered: String = chars.into_iter().collect();

    let err = vault.ingest(&tampered, &["x".into()]).await.unwrap_err();
    assert_eq!(err, VaultError::Token(TokenError::Invalid));
}

#[tokio::test]
async fn test_token_from_other_key_is_invalid() {
    let vault = vault(credential_store());
    let foreign = TokenService::new(vec![1u8; 32], Duration::from_secs(300)).issue_default(
        &Identity {
            username: "admin".into(),
            identity_tag: "tenant-admin".into(),
            secret_hash: String::new(),
        },
    )
    .unwrap();
    assert_eq!(
        vault.authenticate(&foreign.token),
        Err(VaultError::Token(TokenError::Invalid))
    );
}
