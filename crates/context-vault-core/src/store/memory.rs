//! In-memory [`VectorStore`] implementation for tests and single-process use.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`. Search is brute-force
//! cosine similarity over the points that pass the filter, so filtering is
//! exact. An optional visibility delay simulates an eventually consistent
//! index: freshly written points are hidden from `query` until it elapses.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::embedding::cosine_similarity;
use crate::error::StoreError;

use super::{MetadataFilter, ScoredPoint, VectorPoint, VectorStore};

struct StoredPoint {
    vector: Vec<f32>,
    metadata: Map<String, Value>,
    visible_at: Instant,
}

/// In-memory vector store.
pub struct InMemoryVectorStore {
    points: RwLock<HashMap<Uuid, StoredPoint>>,
    dims: RwLock<Option<usize>>,
    visibility_delay: Duration,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            points: RwLock::new(HashMap::new()),
            dims: RwLock::new(None),
            visibility_delay: Duration::ZERO,
        }
    }

    /// Fix the dimension up front instead of adopting the first write's.
    pub fn with_dims(self, dims: usize) -> Self {
        Self {
            dims: RwLock::new(Some(dims)),
            ..self
        }
    }

    /// Hide new points from queries for `delay` after they are written.
    pub fn with_visibility_delay(self, delay: Duration) -> Self {
        Self {
            visibility_delay: delay,
            ..self
        }
    }

    /// Number of stored points, visible or not.
    pub fn len(&self) -> usize {
        self.points.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimension currently enforced, if any write or configuration fixed it.
    pub fn dims(&self) -> Option<usize> {
        self.dims.read().ok().and_then(|d| *d)
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::new("in-memory store lock poisoned")
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<usize, StoreError> {
        if points.is_empty() {
            return Ok(0);
        }

        // Validate the whole batch before touching the map so a bad point
        // cannot leave half a batch behind.
        {
            let mut dims = self.dims.write().map_err(poisoned)?;
            let want = match *dims {
                Some(d) => d,
                None => points[0].vector.len(),
            };
            if let Some(bad) = points.iter().find(|p| p.vector.len() != want) {
                return Err(StoreError::new(format!(
                    "vector dimension mismatch for {}: got {}, want {}",
                    bad.id,
                    bad.vector.len(),
                    want
                )));
            }
            *dims = Some(want);
        }

        let visible_at = Instant::now() + self.visibility_delay;
        let mut stored = self.points.write().map_err(poisoned)?;
        let count = points.len();
        for p in points {
            stored.insert(
                p.id,
                StoredPoint {
                    vector: p.vector,
                    metadata: p.metadata,
                    visible_at,
                },
            );
        }
        tracing::debug!(count, total = stored.len(), "in-memory upsert");
        Ok(count)
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        if let Some(d) = self.dims() {
            if vector.len() != d {
                return Err(StoreError::new(format!(
                    "query dimension mismatch: got {}, want {}",
                    vector.len(),
                    d
                )));
            }
        }

        let now = Instant::now();
        let stored = self.points.read().map_err(poisoned)?;
        let mut hits: Vec<ScoredPoint> = stored
            .iter()
            .filter(|(_, sp)| sp.visible_at <= now && filter.matches(&sp.metadata))
            .map(|(id, sp)| ScoredPoint {
                id: id.to_string(),
                score: cosine_similarity(vector, &sp.vector),
                metadata: sp.metadata.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn visible(&self, ids: &[Uuid]) -> Result<usize, StoreError> {
        let now = Instant::now();
        let stored = self.points.read().map_err(poisoned)?;
        Ok(ids
            .iter()
            .filter(|id| stored.get(id).is_some_and(|sp| sp.visible_at <= now))
            .count())
    }
}
