//! The three operations exposed to the transport layer.
//!
//! [`Vault`] wires the credential store, token service, and both pipelines
//! together. Every ingest and retrieve call verifies its token first and
//! takes the tenancy key from the verified claims only; callers have no
//! way to pass an identity tag directly.
//!
//! ```text
//! login(username, secret) ──▶ CredentialStore ──▶ TokenService::issue
//! ingest(token, texts)    ──▶ TokenService::verify ──▶ IngestionPipeline
//! retrieve(token, query)  ──▶ TokenService::verify ──▶ RetrievalPipeline
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{debug, error, info, warn};

use context_vault_core::embedding::EmbeddingProvider;
use context_vault_core::error::{VaultError, VaultResult};
use context_vault_core::models::{IngestResult, QueryResult};
use context_vault_core::store::memory::InMemoryVectorStore;
use context_vault_core::store::VectorStore;

use crate::config::Config;
use crate::credentials::{CredentialStore, StaticCredentialStore};
use crate::embedding::create_provider;
use crate::ingest::{CallTimeouts, Consistency, IngestionPipeline};
use crate::qdrant_store::QdrantStore;
use crate::retrieve::RetrievalPipeline;
use crate::token::{IssuedToken, TokenService, VerifiedToken};

pub struct Vault {
    credentials: Arc<dyn CredentialStore>,
    tokens: TokenService,
    ingestion: IngestionPipeline,
    retrieval: RetrievalPipeline,
    default_top_k: usize,
}

impl Vault {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        tokens: TokenService,
        ingestion: IngestionPipeline,
        retrieval: RetrievalPipeline,
    ) -> Self {
        Self {
            credentials,
            tokens,
            ingestion,
            retrieval,
            default_top_k: 5,
        }
    }

    /// `top_k` used when [`retrieve`](Self::retrieve) gets `None`.
    pub fn with_default_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = top_k;
        self
    }

    /// Build every collaborator named in `config`.
    ///
    /// `VAULT_SIGNING_KEY` in the environment overrides `auth.signing_key`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let embedder = create_provider(&config.embedding)
            .context("Failed to create embedding provider")?;
        let store = create_store(config, embedder.as_ref())?;
        let credentials = StaticCredentialStore::from_config(&config.auth.users)?;

        let key = config
            .auth
            .resolve_signing_key(std::env::var("VAULT_SIGNING_KEY").ok())?;
        let tokens = TokenService::new(key, Duration::from_secs(config.auth.token_ttl_secs));

        let timeouts = CallTimeouts::from_config(config);
        let ingestion = IngestionPipeline::new(embedder.clone(), store.clone())
            .with_timeouts(timeouts)
            .with_consistency(Consistency::from_config(&config.consistency));
        let retrieval = RetrievalPipeline::new(embedder.clone(), store)
            .with_timeouts(timeouts)
            .with_limits(&config.retrieval);

        info!(
            users = credentials.len(),
            embedder = embedder.model_name(),
            dims = embedder.dims(),
            store = %config.store.provider,
            "vault initialised"
        );
        Ok(
            Self::new(Arc::new(credentials), tokens, ingestion, retrieval)
                .with_default_top_k(config.retrieval.default_top_k),
        )
    }

    /// Exchange credentials for a signed token.
    ///
    /// Argon2 verification is CPU-bound, so it runs on the blocking pool.
    pub async fn login(&self, username: &str, secret: &str) -> VaultResult<IssuedToken> {
        let credentials = self.credentials.clone();
        let (username, secret) = (username.to_string(), secret.to_string());
        let outcome = tokio::task::spawn_blocking(move || credentials.verify(&username, &secret))
            .await
            .map_err(|e| {
                warn!(error = %e, "credential check did not complete");
                VaultError::AuthFailure
            })?;

        match outcome {
            Ok(identity) => {
                let issued = self.tokens.issue_default(&identity).map_err(|e| {
                    error!(error = %e, "token issuance failed");
                    VaultError::Internal(e.to_string())
                })?;
                info!(subject = %issued.subject, expires_at = %issued.expires_at, "token issued");
                Ok(issued)
            }
            Err(e) => {
                warn!("login rejected");
                Err(e)
            }
        }
    }

    /// Verify `token` and return the identity it carries.
    pub fn authenticate(&self, token: &str) -> VaultResult<VerifiedToken> {
        self.tokens.verify(token).map_err(|e| {
            debug!(reason = %e, "token rejected");
            VaultError::Token(e)
        })
    }

    pub async fn ingest(&self, token: &str, texts: &[String]) -> VaultResult<IngestResult> {
        let caller = self.authenticate(token)?;
        self.ingestion.ingest(texts, &caller.identity_tag).await
    }

    pub async fn retrieve(
        &self,
        token: &str,
        query: &str,
        top_k: Option<usize>,
    ) -> VaultResult<Vec<QueryResult>> {
        let caller = self.authenticate(token)?;
        self.retrieval
            .retrieve(query, top_k.unwrap_or(self.default_top_k), &caller.identity_tag)
            .await
    }
}

fn create_store(config: &Config, embedder: &dyn EmbeddingProvider) -> Result<Arc<dyn VectorStore>> {
    match config.store.provider.as_str() {
        "memory" => Ok(Arc::new(InMemoryVectorStore::new().with_dims(embedder.dims()))),
        "qdrant" => Ok(Arc::new(
            QdrantStore::new(&config.store).context("Failed to create Qdrant client")?,
        )),
        other => bail!("Unknown store provider: {}", other),
    }
}
