//! Vector storage abstraction for Context Vault.
//!
//! The [`VectorStore`] trait is the only way the pipelines touch persisted
//! vectors, enabling pluggable backends (in-memory, Qdrant) and mock stores
//! in tests. Implementations must be `Send + Sync`.
//!
//! # Contract
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`upsert`](VectorStore::upsert) | Write a batch; same id overwrites, never duplicates |
//! | [`query`](VectorStore::query) | Top-k nearest, restricted by an exact metadata filter |
//! | [`visible`](VectorStore::visible) | Count how many ids are readable right now |
//!
//! Query results are ordered by descending score. The store is the ranking
//! authority: callers do not re-sort.

pub mod memory;

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Document, META_OWNER_TAG};

/// A vector with its id and payload, as submitted for writing.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub metadata: Map<String, Value>,
}

impl From<&Document> for VectorPoint {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id,
            vector: doc.embedding.clone(),
            metadata: doc.metadata(),
        }
    }
}

/// A query match returned by the store.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub metadata: Map<String, Value>,
}

/// Conjunction of exact string equalities over payload fields.
///
/// An empty filter matches everything; the pipelines never issue one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    pub equals: Vec<(String, String)>,
}

impl MetadataFilter {
    /// Filter restricting results to documents owned by `tag`.
    pub fn owner(tag: &str) -> Self {
        Self {
            equals: vec![(META_OWNER_TAG.to_string(), tag.to_string())],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.equals.is_empty()
    }

    /// Evaluate the filter against a payload. Missing or non-string fields
    /// never match.
    pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
        self.equals
            .iter()
            .all(|(key, want)| metadata.get(key).and_then(Value::as_str) == Some(want.as_str()))
    }
}

/// Abstract vector index with filtered nearest-neighbour search.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Write all points in one call.
    ///
    /// Returns the number of points the store confirmed. On failure the
    /// returned [`StoreError::written`] reports confirmed writes, if known.
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<usize, StoreError>;

    /// Return up to `top_k` points matching `filter`, best first.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredPoint>, StoreError>;

    /// How many of `ids` are currently visible to [`query`](VectorStore::query).
    ///
    /// Stores with immediate read-after-write consistency return `ids.len()`.
    async fn visible(&self, ids: &[Uuid]) -> Result<usize, StoreError>;
}
