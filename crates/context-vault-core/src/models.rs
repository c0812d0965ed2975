//! Core data models for identity-scoped ingestion and retrieval.
//!
//! These types flow between the credential store, the token service, the
//! pipelines, and the vector store. Payload keys written alongside every
//! vector are defined here so that writers and readers agree on them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payload key holding the original document text.
pub const META_TEXT: &str = "text";
/// Payload key holding the owning identity tag. Every retrieval filters on it.
pub const META_OWNER_TAG: &str = "owner_tag";
/// Payload key holding the ingestion timestamp (RFC 3339).
pub const META_CREATED_AT: &str = "created_at";

/// Text reported for a match whose payload carries no `text` entry.
pub const MISSING_TEXT: &str = "N/A";

/// A registered caller.
///
/// Created from configuration at start-up and immutable afterwards.
/// `secret_hash` is a one-way Argon2 PHC string; the plaintext secret is
/// never held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Human-readable login name; becomes the token subject.
    pub username: String,
    /// Opaque tenancy key stamped on every document this identity writes.
    pub identity_tag: String,
    pub secret_hash: String,
}

/// A stored text with its embedding and owner.
///
/// Never updated in place: re-ingesting the same text yields a new id.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: Uuid,
    pub text: String,
    pub embedding: Vec<f32>,
    pub owner_tag: String,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Build a document with a fresh server-side id.
    pub fn new(text: String, embedding: Vec<f32>, owner_tag: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            text,
            embedding,
            owner_tag: owner_tag.to_string(),
            created_at: Utc::now(),
        }
    }

    /// Payload persisted next to the vector.
    pub fn metadata(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut m = serde_json::Map::new();
        m.insert(META_TEXT.to_string(), self.text.clone().into());
        m.insert(META_OWNER_TAG.to_string(), self.owner_tag.clone().into());
        m.insert(
            META_CREATED_AT.to_string(),
            self.created_at.to_rfc3339().into(),
        );
        m
    }
}

/// One retrieval hit as returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub id: String,
    /// Similarity reported by the store (cosine: higher is closer).
    pub score: f32,
    pub text: String,
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResult {
    /// Generated ids, in the order of the submitted texts.
    pub document_ids: Vec<Uuid>,
    pub count: usize,
}
