//! TOML configuration parsing and validation.
//!
//! A minimal file needs only a server bind address and one user:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8000"
//!
//! [[auth.users]]
//! username = "admin"
//! secret_hash = "$argon2id$v=19$m=19456,t=2,p=1$..."
//! identity_tag = "tenant-admin"
//! ```
//!
//! Everything else has defaults. Secrets may come from the environment:
//! `VAULT_SIGNING_KEY` overrides `auth.signing_key`, `QDRANT_API_KEY`
//! overrides `store.api_key`, and `OPENAI_API_KEY` is read by the OpenAI
//! provider.

use anyhow::{bail, Context, Result};
use argon2::password_hash::rand_core::{OsRng, RngCore};
use argon2::password_hash::PasswordHash;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;

/// Minimum accepted HMAC signing key length in bytes.
pub const MIN_SIGNING_KEY_LEN: usize = 32;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub consistency: ConsistencyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
    #[serde(default)]
    pub signing_key: Option<String>,
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

fn default_token_ttl_secs() -> u64 {
    900
}

#[derive(Debug, Deserialize, Clone)]
pub struct UserConfig {
    pub username: String,
    /// Argon2 PHC string, as printed by `cvault hash-secret`.
    pub secret_hash: String,
    pub identity_tag: String,
}

impl AuthConfig {
    /// Resolve the HMAC key: `env_override`, then `signing_key`, then a
    /// random per-process key (tokens then die with the process).
    pub fn resolve_signing_key(&self, env_override: Option<String>) -> Result<Vec<u8>> {
        match env_override.or_else(|| self.signing_key.clone()) {
            Some(key) => {
                if key.len() < MIN_SIGNING_KEY_LEN {
                    bail!(
                        "auth signing key must be at least {} bytes",
                        MIN_SIGNING_KEY_LEN
                    );
                }
                Ok(key.into_bytes())
            }
            None => {
                let mut key = vec![0u8; MIN_SIGNING_KEY_LEN];
                OsRng.fill_bytes(&mut key);
                tracing::info!("no signing key configured; generated an ephemeral key");
                Ok(key)
            }
        }
    }
}

/// Short, non-reversible identifier for a signing key, safe to print.
pub fn key_fingerprint(key: &[u8]) -> String {
    format!("sha256:{}", hex::encode(&Sha256::digest(key)[..8]))
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            timeout_secs: default_embedding_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hashing".to_string()
}
fn default_embedding_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_provider")]
    pub provider: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            provider: default_store_provider(),
            url: None,
            collection: default_collection(),
            api_key: None,
            timeout_secs: default_store_timeout_secs(),
        }
    }
}

fn default_store_provider() -> String {
    "memory".to_string()
}
fn default_collection() -> String {
    "rag-index".to_string()
}
fn default_store_timeout_secs() -> u64 {
    10
}

/// What to do with a `top_k` above [`RetrievalConfig::max_top_k`].
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TopKPolicy {
    /// Fail with `InvalidInput`.
    #[default]
    Reject,
    /// Silently lower to the ceiling.
    Clamp,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
    #[serde(default)]
    pub top_k_policy: TopKPolicy,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
            top_k_policy: TopKPolicy::default(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_max_top_k() -> usize {
    100
}

/// Read-after-write contract for ingestion.
///
/// After a successful upsert the pipeline polls the store until every new id
/// is visible or `visibility_timeout_ms` elapses.
#[derive(Debug, Deserialize, Clone)]
pub struct ConsistencyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_visibility_timeout_ms")]
    pub visibility_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            visibility_timeout_ms: default_visibility_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_visibility_timeout_ms() -> u64 {
    2000
}
fn default_poll_interval_ms() -> u64 {
    50
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Auth
    if config.auth.token_ttl_secs == 0 {
        bail!("auth.token_ttl_secs must be > 0");
    }
    if config.auth.users.is_empty() {
        bail!("auth.users must contain at least one user");
    }
    let mut names = HashSet::new();
    let mut tags = HashSet::new();
    for user in &config.auth.users {
        if user.username.trim().is_empty() || user.identity_tag.trim().is_empty() {
            bail!("auth.users entries need a non-empty username and identity_tag");
        }
        if !names.insert(user.username.as_str()) {
            bail!("duplicate username in auth.users: '{}'", user.username);
        }
        if !tags.insert(user.identity_tag.as_str()) {
            bail!("duplicate identity_tag in auth.users: '{}'", user.identity_tag);
        }
        PasswordHash::new(&user.secret_hash).map_err(|e| {
            anyhow::anyhow!(
                "auth.users '{}': secret_hash is not a PHC string: {}",
                user.username,
                e
            )
        })?;
    }
    if let Some(key) = &config.auth.signing_key {
        if key.len() < MIN_SIGNING_KEY_LEN {
            bail!(
                "auth.signing_key must be at least {} bytes",
                MIN_SIGNING_KEY_LEN
            );
        }
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "hashing" => {}
        "openai" | "ollama" => {
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be hashing, openai, or ollama.",
            other
        ),
    }
    if config.embedding.timeout_secs == 0 {
        bail!("embedding.timeout_secs must be > 0");
    }

    // Store
    match config.store.provider.as_str() {
        "memory" => {}
        "qdrant" => {
            if config.store.url.is_none() {
                bail!("store.url must be specified when provider is 'qdrant'");
            }
        }
        other => bail!(
            "Unknown store provider: '{}'. Must be memory or qdrant.",
            other
        ),
    }
    if config.store.timeout_secs == 0 {
        bail!("store.timeout_secs must be > 0");
    }

    // Retrieval
    if config.retrieval.max_top_k < 1 {
        bail!("retrieval.max_top_k must be >= 1");
    }
    if config.retrieval.default_top_k < 1 || config.retrieval.default_top_k > config.retrieval.max_top_k
    {
        bail!("retrieval.default_top_k must be in [1, retrieval.max_top_k]");
    }

    // Consistency
    if config.consistency.enabled && config.consistency.poll_interval_ms == 0 {
        bail!("consistency.poll_interval_ms must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-formed Argon2id PHC string; config validation only parses it.
    const HASH: &str =
        "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$pHNw8tM1NqS5lw6KDM7xMxqYBrrJBVPBgBrDcuu6ptk";

    fn minimal(extra: &str) -> String {
        format!(
            r#"
[[auth.users]]
username = "admin"
secret_hash = "{HASH}"
identity_tag = "tenant-admin"
{extra}
"#
        )
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let c = parse_config(&minimal("")).unwrap();
        assert_eq!(c.server.bind, "127.0.0.1:8000");
        assert_eq!(c.auth.token_ttl_secs, 900);
        assert_eq!(c.embedding.provider, "hashing");
        assert_eq!(c.store.provider, "memory");
        assert_eq!(c.store.collection, "rag-index");
        assert_eq!(c.retrieval.default_top_k, 5);
        assert_eq!(c.retrieval.max_top_k, 100);
        assert_eq!(c.retrieval.top_k_policy, TopKPolicy::Reject);
        assert!(c.consistency.enabled);
        assert_eq!(c.consistency.visibility_timeout_ms, 2000);
    }

    #[test]
    fn test_requires_a_user() {
        let err = parse_config("[auth]\ntoken_ttl_secs = 60\n").unwrap_err();
        assert!(err.to_string().contains("at least one user"));
    }

    #[test]
    fn test_rejects_duplicate_identity_tag() {
        let extra = format!(
            r#"
[[auth.users]]
username = "other"
secret_hash = "{HASH}"
identity_tag = "tenant-admin"
"#
        );
        let err = parse_config(&minimal(&extra)).unwrap_err();
        assert!(err.to_string().contains("duplicate identity_tag"));
    }

    #[test]
    fn test_rejects_plaintext_secret() {
        let toml = r#"
[[auth.users]]
username = "admin"
secret_hash = "hunter2"
identity_tag = "t"
"#;
        let err = parse_config(toml).unwrap_err();
        assert!(err.to_string().contains("PHC"));
    }

    #[test]
    fn test_rejects_short_signing_key() {
        let toml = minimal("").replace("[[auth.users]]", "[auth]\nsigning_key = \"short\"\n\n[[auth.users]]");
        let err = parse_config(&toml).unwrap_err();
        assert!(err.to_string().contains("signing_key"));
    }

    #[test]
    fn test_openai_requires_model_and_dims() {
        let err = parse_config(&minimal("[embedding]\nprovider = \"openai\"\n")).unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn test_unknown_store_provider() {
        let err = parse_config(&minimal("[store]\nprovider = \"pinecone\"\n")).unwrap_err();
        assert!(err.to_string().contains("Unknown store provider"));
    }

    #[test]
    fn test_clamp_policy_parses() {
        let c = parse_config(&minimal("[retrieval]\ntop_k_policy = \"clamp\"\nmax_top_k = 10\n"))
            .unwrap();
        assert_eq!(c.retrieval.top_k_policy, TopKPolicy::Clamp);
        assert_eq!(c.retrieval.max_top_k, 10);
    }

    #[test]
    fn test_default_top_k_above_ceiling() {
        let err = parse_config(&minimal("[retrieval]\ndefault_top_k = 20\nmax_top_k = 10\n"))
            .unwrap_err();
        assert!(err.to_string().contains("default_top_k"));
    }

    #[test]
    fn test_signing_key_resolution() {
        let c = parse_config(&minimal("")).unwrap();
        let generated = c.auth.resolve_signing_key(None).unwrap();
        assert_eq!(generated.len(), MIN_SIGNING_KEY_LEN);

        let from_env = c
            .auth
            .resolve_signing_key(Some("k".repeat(MIN_SIGNING_KEY_LEN)))
            .unwrap();
        assert_eq!(from_env, "k".repeat(MIN_SIGNING_KEY_LEN).into_bytes());

        assert!(c.auth.resolve_signing_key(Some("short".into())).is_err());
    }

    #[test]
    fn test_key_fingerprint_hides_key() {
        let key = "k".repeat(MIN_SIGNING_KEY_LEN);
        let fp = key_fingerprint(key.as_bytes());
        assert!(fp.starts_with("sha256:"));
        assert_eq!(fp.len(), "sha256:".len() + 16);
        assert!(!fp.contains("kkkk"));
        assert_ne!(fp, key_fingerprint(b"another-key-another-key-another-key"));
    }
}
