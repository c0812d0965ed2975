//! Ingestion pipeline.
//!
//! Turns a batch of texts into owner-tagged documents and writes them to
//! the vector store in one upsert:
//!
//! 1. Validate: at least one text, none blank.
//! 2. Embed every text in order. The first failure aborts the batch and
//!    discards vectors already computed; nothing is written.
//! 3. Assign a fresh UUID per text and stamp `owner_tag`.
//! 4. Upsert all points in a single call. A short or failed write surfaces
//!    as [`VaultError::Upsert`] with the confirmed count.
//! 5. Optionally poll the store until the new ids are readable (see
//!    [`Consistency`]).
//!
//! Every external call runs under a timeout. Dropping the returned future
//! abandons whichever call is in flight.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use context_vault_core::embedding::EmbeddingProvider;
use context_vault_core::error::{VaultError, VaultResult};
use context_vault_core::models::{Document, IngestResult};
use context_vault_core::store::{VectorPoint, VectorStore};

use crate::config::{Config, ConsistencyConfig};

/// Upper bounds for calls to external collaborators.
#[derive(Debug, Clone, Copy)]
pub struct CallTimeouts {
    pub embed: Duration,
    pub store: Duration,
}

impl CallTimeouts {
    /// The embed bound covers every retry attempt plus backoff.
    pub fn from_config(config: &Config) -> Self {
        let attempts = u64::from(config.embedding.max_retries).saturating_add(1);
        let backoff_secs = (1u64 << config.embedding.max_retries.min(6)).saturating_sub(1);
        let embed_secs = config
            .embedding
            .timeout_secs
            .saturating_mul(attempts)
            .saturating_add(backoff_secs);
        Self {
            embed: Duration::from_secs(embed_secs),
            store: Duration::from_secs(config.store.timeout_secs),
        }
    }
}

impl Default for CallTimeouts {
    fn default() -> Self {
        Self {
            embed: Duration::from_secs(30),
            store: Duration::from_secs(10),
        }
    }
}

/// Read-after-write policy: after a successful upsert, poll
/// [`VectorStore::visible`] every `poll_interval` until all new ids are
/// readable or `deadline` passes.
///
/// Missing the deadline is logged, not failed: the write itself succeeded
/// and retrying it would only overwrite the same ids.
#[derive(Debug, Clone, Copy)]
pub struct Consistency {
    pub deadline: Duration,
    pub poll_interval: Duration,
}

impl Consistency {
    pub fn from_config(config: &ConsistencyConfig) -> Option<Self> {
        config.enabled.then(|| Self {
            deadline: Duration::from_millis(config.visibility_timeout_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
        })
    }
}

/// Outcome of a visibility wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Every id became readable after this long.
    Converged(Duration),
    /// The deadline passed with `visible` of the ids readable.
    TimedOut { visible: usize },
    /// The consistency check itself failed.
    Unknown,
}

pub struct IngestionPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    timeouts: CallTimeouts,
    consistency: Option<Consistency>,
}

impl IngestionPipeline {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            embedder,
            store,
            timeouts: CallTimeouts::default(),
            consistency: None,
        }
    }

    pub fn with_timeouts(mut self, timeouts: CallTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_consistency(mut self, consistency: Option<Consistency>) -> Self {
        self.consistency = consistency;
        self
    }

    /// Embed and store `texts` as documents owned by `owner_tag`.
    ///
    /// Returned ids follow the order of `texts`.
    pub async fn ingest(&self, texts: &[String], owner_tag: &str) -> VaultResult<IngestResult> {
        validate_texts(texts)?;
        if owner_tag.is_empty() {
            return Err(VaultError::invalid_input("owner tag must not be empty"));
        }

        let mut documents = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            let embedding = timeout(self.timeouts.embed, self.embedder.embed(text))
                .await
                .map_err(|_| VaultError::Embedding(format!("texts[{}]: embedding timed out", i)))?
                .map_err(|e| VaultError::Embedding(format!("texts[{}]: {}", i, e.reason)))?;
            documents.push(Document::new(text.clone(), embedding, owner_tag));
        }

        let ids: Vec<Uuid> = documents.iter().map(|d| d.id).collect();
        let points: Vec<VectorPoint> = documents.iter().map(VectorPoint::from).collect();
        let expected = points.len();

        let written = match timeout(self.timeouts.store, self.store.upsert(points)).await {
            Err(_) => {
                return Err(VaultError::Upsert {
                    written: 0,
                    reason: "vector store upsert timed out".to_string(),
                })
            }
            Ok(Err(e)) => {
                warn!(written = e.written, expected, "upsert failed: {}", e.reason);
                return Err(VaultError::Upsert {
                    written: e.written,
                    reason: e.reason,
                });
            }
            Ok(Ok(n)) => n,
        };
        if written != expected {
            warn!(written, expected, "upsert confirmed a different count");
            return Err(VaultError::Upsert {
                written: written.min(expected),
                reason: format!("store confirmed {} of {} documents", written, expected),
            });
        }

        if let Some(policy) = self.consistency {
            match self.await_visible(&ids, policy).await {
                Visibility::Converged(after) => {
                    debug!(elapsed_ms = after.as_millis() as u64, "ingested documents visible")
                }
                Visibility::TimedOut { visible } => warn!(
                    visible,
                    expected,
                    deadline_ms = policy.deadline.as_millis() as u64,
                    "ingested documents not yet visible"
                ),
                Visibility::Unknown => {}
            }
        }

        info!(count = expected, "ingested documents");
        Ok(IngestResult {
            document_ids: ids,
            count: expected,
        })
    }

    /// Poll the store until every id is readable or the deadline passes.
    pub async fn await_visible(&self, ids: &[Uuid], policy: Consistency) -> Visibility {
        let start = Instant::now();
        let deadline = start + policy.deadline;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let call_bound = remaining.min(self.timeouts.store);
            match timeout(call_bound, self.store.visible(ids)).await {
                Ok(Ok(n)) if n >= ids.len() => return Visibility::Converged(start.elapsed()),
                Ok(Ok(n)) => {
                    if Instant::now() + policy.poll_interval > deadline {
                        return Visibility::TimedOut { visible: n };
                    }
                }
                Ok(Err(e)) => {
                    warn!("visibility check failed: {}", e.reason);
                    return Visibility::Unknown;
                }
                Err(_) => return Visibility::TimedOut { visible: 0 },
            }
            tokio::time::sleep(policy.poll_interval).await;
        }
    }
}

fn validate_texts(texts: &[String]) -> VaultResult<()> {
    if texts.is_empty() {
        return Err(VaultError::invalid_input("texts must not be empty"));
    }
    if let Some(i) = texts.iter().position(|t| t.trim().is_empty()) {
        return Err(VaultError::invalid_input(format!(
            "texts[{}] must not be blank",
            i
        )));
    }
    Ok(())
}
