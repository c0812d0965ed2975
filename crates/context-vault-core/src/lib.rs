//! # Context Vault Core
//!
//! Runtime-agnostic logic for Context Vault: the identity-scoped data model,
//! the error taxonomy, the embedding provider trait, and the vector store
//! abstraction with an in-memory implementation.
//!
//! This crate contains no tokio, HTTP clients, or filesystem I/O. Network
//! providers, the Qdrant adapter, authentication, and the pipelines live in
//! the `context-vault` app crate.

pub mod embedding;
pub mod error;
pub mod models;
pub mod store;
