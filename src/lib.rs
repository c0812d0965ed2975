//! # Context Vault
//!
//! Identity-scoped text ingestion and semantic retrieval.
//!
//! Authenticated callers store free-text documents and later retrieve the
//! documents most similar to a query. Every document is tagged with its
//! owner's identity tag, and every query is filtered to the caller's tag,
//! so a caller never sees another identity's documents.
//!
//! ## Architecture
//!
//! ```text
//!            ┌──────────────┐
//! login ────▶│ Credentials  │──▶ TokenService ──▶ bearer token
//!            └──────────────┘
//!
//!            ┌──────────────┐   ┌───────────┐   ┌─────────────┐
//! /add ─────▶│  Ingestion   │──▶│ Embedding │──▶│ VectorStore │
//!            └──────────────┘   │ Provider  │   │ (owner_tag) │
//!            ┌──────────────┐   │           │   │             │
//! /search ──▶│  Retrieval   │──▶│           │──▶│  filtered   │
//!            └──────────────┘   └───────────┘   └─────────────┘
//! ```
//!
//! The data model, error taxonomy, and collaborator traits live in
//! `context-vault-core`. This crate adds the runtime pieces.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`credentials`] | Argon2-backed credential store |
//! | [`token`] | HS256 JWT bearer tokens |
//! | [`embedding`] | OpenAI and Ollama embedding providers |
//! | [`qdrant_store`] | Qdrant vector store adapter |
//! | [`ingest`] | Ingestion pipeline |
//! | [`retrieve`] | Retrieval pipeline |
//! | [`vault`] | login / ingest / retrieve facade |
//! | [`server`] | HTTP server |

pub mod config;
pub mod credentials;
pub mod embedding;
pub mod ingest;
pub mod qdrant_store;
pub mod retrieve;
pub mod server;
pub mod token;
pub mod vault;
