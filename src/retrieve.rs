//! Retrieval pipeline.
//!
//! Embeds a query and asks the vector store for the `top_k` nearest
//! documents owned by the caller. The owner constraint is an exact
//! metadata filter pushed down to the store, so other identities'
//! documents never occupy result slots.
//!
//! Results keep the store's order (similarity descending). The pipeline
//! does not re-rank.

use std::sync::Arc;

use tokio::time::timeout;
use tracing::{debug, warn};

use context_vault_core::embedding::EmbeddingProvider;
use context_vault_core::error::{VaultError, VaultResult};
use context_vault_core::models::{QueryResult, META_OWNER_TAG, META_TEXT, MISSING_TEXT};
use context_vault_core::store::{MetadataFilter, ScoredPoint, VectorStore};

use crate::config::{RetrievalConfig, TopKPolicy};
use crate::ingest::CallTimeouts;

pub struct RetrievalPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    timeouts: CallTimeouts,
    max_top_k: usize,
    policy: TopKPolicy,
}

impl RetrievalPipeline {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        let defaults = RetrievalConfig::default();
        Self {
            embedder,
            store,
            timeouts: CallTimeouts::default(),
            max_top_k: defaults.max_top_k,
            policy: defaults.top_k_policy,
        }
    }

    pub fn with_timeouts(mut self, timeouts: CallTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_limits(mut self, config: &RetrievalConfig) -> Self {
        self.max_top_k = config.max_top_k.max(1);
        self.policy = config.top_k_policy;
        self
    }

    /// Apply the `top_k` bounds: at least 1, at most the configured ceiling.
    pub fn effective_top_k(&self, top_k: usize) -> VaultResult<usize> {
        if top_k == 0 {
            return Err(VaultError::invalid_input("top_k must be >= 1"));
        }
        if top_k > self.max_top_k {
            return match self.policy {
                TopKPolicy::Reject => Err(VaultError::invalid_input(format!(
                    "top_k must be <= {}",
                    self.max_top_k
                ))),
                TopKPolicy::Clamp => Ok(self.max_top_k),
            };
        }
        Ok(top_k)
    }

    /// Return up to `top_k` of `owner_tag`'s documents most similar to `query`.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        owner_tag: &str,
    ) -> VaultResult<Vec<QueryResult>> {
        if query.trim().is_empty() {
            return Err(VaultError::invalid_input("query must not be empty"));
        }
        let k = self.effective_top_k(top_k)?;
        if owner_tag.is_empty() {
            return Err(VaultError::invalid_input("owner tag must not be empty"));
        }

        let vector = timeout(self.timeouts.embed, self.embedder.embed(query))
            .await
            .map_err(|_| VaultError::Embedding("query embedding timed out".to_string()))??;

        let filter = MetadataFilter::owner(owner_tag);
        let hits = timeout(self.timeouts.store, self.store.query(&vector, k, &filter))
            .await
            .map_err(|_| VaultError::Store("vector store query timed out".to_string()))?
            .map_err(|e| VaultError::Store(e.reason))?;

        let total = hits.len();
        let results: Vec<QueryResult> = hits
            .into_iter()
            .filter(|hit| owned_by(hit, owner_tag))
            .take(k)
            .map(to_query_result)
            .collect();
        if results.len() < total.min(k) {
            warn!(
                dropped = total - results.len(),
                "store returned documents outside the owner filter"
            );
        }

        debug!(top_k = k, hits = results.len(), "retrieval complete");
        Ok(results)
    }
}

/// Only hits recorded under `owner_tag` are returned. A hit with no owner
/// recorded, or a non-string one, is dropped.
fn owned_by(hit: &ScoredPoint, owner_tag: &str) -> bool {
    hit.metadata.get(META_OWNER_TAG).and_then(|v| v.as_str()) == Some(owner_tag)
}

fn to_query_result(hit: ScoredPoint) -> QueryResult {
    let text = hit
        .metadata
        .get(META_TEXT)
        .and_then(|v| v.as_str())
        .unwrap_or(MISSING_TEXT)
        .to_string();
    QueryResult {
        id: hit.id,
        score: hit.score,
        text,
    }
}
