//! Qdrant-backed [`VectorStore`].
//!
//! Thin adapter around `qdrant-client` so the pipelines never see its
//! builder API. The collection must already exist with the embedding
//! dimension and cosine distance; this module does not create or delete it.
//!
//! Filtering uses a `must` clause of keyword matches. Qdrant evaluates
//! payload conditions exactly, including during HNSW traversal, so the
//! owner filter is never approximated. Indexing the `owner_tag` payload
//! field as a keyword keeps filtered search fast for many tenants.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, Filter, GetPointsBuilder, PointId, PointStruct, SearchPointsBuilder,
    UpdateStatus, UpsertPointsBuilder, Value as QValue,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use context_vault_core::error::StoreError;
use context_vault_core::store::{MetadataFilter, ScoredPoint, VectorPoint, VectorStore};

use crate::config::StoreConfig;

pub struct QdrantStore {
    client: Qdrant,
    collection: String,
}

impl QdrantStore {
    /// Connect using `[store]` settings. `QDRANT_API_KEY` overrides `api_key`.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("store.url required for qdrant provider"))?;

        let mut builder =
            Qdrant::from_url(url).timeout(Duration::from_secs(config.timeout_secs));
        if let Some(key) = std::env::var("QDRANT_API_KEY")
            .ok()
            .or_else(|| config.api_key.clone())
        {
            builder = builder.api_key(key);
        }
        let client = builder.build()?;

        info!(url, collection = %config.collection, "qdrant store configured");
        Ok(Self {
            client,
            collection: config.collection.clone(),
        })
    }
}

fn to_qdrant_filter(filter: &MetadataFilter) -> Filter {
    Filter::must(
        filter
            .equals
            .iter()
            .map(|(key, value)| Condition::matches(key.clone(), value.clone())),
    )
}

fn point_id_to_string(id: Option<PointId>) -> String {
    match id.and_then(|p| p.point_id_options) {
        Some(PointIdOptions::Uuid(s)) => s,
        Some(PointIdOptions::Num(n)) => n.to_string(),
        None => String::new(),
    }
}

/// Converts a Qdrant payload into a JSON object.
///
/// Nested structs and lists are not written by this crate and map to `Null`.
fn payload_to_json(payload: HashMap<String, QValue>) -> Map<String, Value> {
    payload
        .into_iter()
        .map(|(k, v)| {
            let j = match v.kind {
                Some(Kind::StringValue(s)) => Value::String(s),
                Some(Kind::IntegerValue(i)) => Value::from(i),
                Some(Kind::DoubleValue(f)) => serde_json::json!(f),
                Some(Kind::BoolValue(b)) => Value::Bool(b),
                _ => Value::Null,
            };
            (k, j)
        })
        .collect()
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<usize, StoreError> {
        if points.is_empty() {
            return Ok(0);
        }
        let count = points.len();
        let structs = points
            .into_iter()
            .map(|p| {
                let payload = Payload::try_from(Value::Object(p.metadata))
                    .map_err(|e| StoreError::new(format!("invalid payload for {}: {}", p.id, e)))?;
                Ok(PointStruct::new(p.id.to_string(), p.vector, payload))
            })
            .collect::<Result<Vec<PointStruct>, StoreError>>()?;

        // wait=true: the call returns once the points are applied and searchable.
        let res = self
            .client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, structs).wait(true))
            .await
            .map_err(|e| StoreError::new(e.to_string()))?;

        let status = res.result.map(|r| r.status);
        debug!(?status, count, "qdrant upsert");
        if status == Some(UpdateStatus::Completed as i32) {
            Ok(count)
        } else {
            Err(StoreError::new(format!(
                "qdrant upsert not completed (status {:?})",
                status
            )))
        }
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let mut builder =
            SearchPointsBuilder::new(&self.collection, vector.to_vec(), top_k as u64)
                .with_payload(true);
        if !filter.is_empty() {
            builder = builder.filter(to_qdrant_filter(filter));
        }

        let res = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| StoreError::new(e.to_string()))?;

        debug!(hits = res.result.len(), "qdrant search");
        Ok(res
            .result
            .into_iter()
            .map(|p| ScoredPoint {
                id: point_id_to_string(p.id),
                score: p.score,
                metadata: payload_to_json(p.payload),
            })
            .collect())
    }

    async fn visible(&self, ids: &[Uuid]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let point_ids: Vec<PointId> = ids.iter().map(|id| PointId::from(id.to_string())).collect();
        let res = self
            .client
            .get_points(
                GetPointsBuilder::new(&self.collection, point_ids)
                    .with_payload(false)
                    .with_vectors(false),
            )
            .await
            .map_err(|e| StoreError::new(e.to_string()))?;
        Ok(res.result.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_filter_becomes_must_clause() {
        let f = to_qdrant_filter(&MetadataFilter::owner("tenant-a"));
        assert_eq!(f.must.len(), 1);
        assert!(f.should.is_empty());
    }

    #[test]
    fn test_point_id_rendering() {
        let u = Uuid::new_v4().to_string();
        assert_eq!(point_id_to_string(Some(PointId::from(u.clone()))), u);
        assert_eq!(point_id_to_string(Some(PointId::from(42u64))), "42");
        assert_eq!(point_id_to_string(None), "");
    }

    #[test]
    fn test_payload_conversion() {
        let mut p = HashMap::new();
        p.insert("text".to_string(), QValue::from("hello".to_string()));
        p.insert("n".to_string(), QValue::from(3i64));
        let m = payload_to_json(p);
        assert_eq!(m["text"], "hello");
        assert_eq!(m["n"], 3);
    }
}
