//! Error taxonomy shared by every Context Vault component.
//!
//! Collaborator traits report [`EmbeddingError`] and [`StoreError`]; the
//! authentication and pipeline layers surface [`VaultError`]. Outward
//! classification (unauthorized / client error / server error) is derived
//! from the variant, never from the message text.

use thiserror::Error;

/// Why a presented token was rejected.
///
/// All variants collapse to a single "unauthorized" signal at the transport
/// boundary; the distinction only exists for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    /// The token is not three dot-separated segments, or a required claim is
    /// missing or has the wrong type.
    #[error("malformed token")]
    Malformed,
    /// The signature is valid but `exp` lies in the past.
    #[error("token expired")]
    Expired,
    /// The signature does not match the payload (tampering or wrong key).
    #[error("invalid token signature")]
    Invalid,
}

/// Failure reported by an [`EmbeddingProvider`](crate::embedding::EmbeddingProvider).
#[derive(Debug, Clone, PartialEq, Error)]
#[error("embedding failed: {reason}")]
pub struct EmbeddingError {
    pub reason: String,
}

impl EmbeddingError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Failure reported by a [`VectorStore`](crate::store::VectorStore).
///
/// `written` carries the number of points the store confirmed before
/// failing, when the backend can tell. It is `0` for read failures.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("vector store failure: {reason}")]
pub struct StoreError {
    pub reason: String,
    pub written: usize,
}

impl StoreError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            written: 0,
        }
    }

    pub fn partial(reason: impl Into<String>, written: usize) -> Self {
        Self {
            reason: reason.into(),
            written,
        }
    }
}

/// Top-level error for login, ingestion, and retrieval.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VaultError {
    /// Unknown username or wrong secret. Deliberately carries no detail.
    #[error("unauthorized")]
    AuthFailure,

    #[error("unauthorized: {0}")]
    Token(#[from] TokenError),

    /// A request precondition was violated; the message names it.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("embedding failure: {0}")]
    Embedding(String),

    /// A read against the vector store failed.
    #[error("store failure: {0}")]
    Store(String),

    /// A write against the vector store failed or was only partially applied.
    #[error("upsert failure after {written} confirmed writes: {reason}")]
    Upsert { written: usize, reason: String },

    /// A failure inside the service itself, such as token signing.
    #[error("internal error: {0}")]
    Internal(String),
}

impl VaultError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        VaultError::InvalidInput(message.into())
    }

    /// True for every credential or token rejection.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, VaultError::AuthFailure | VaultError::Token(_))
    }

    /// True when the caller can fix the request and retry.
    pub fn is_client_error(&self) -> bool {
        matches!(self, VaultError::InvalidInput(_))
    }

    /// True for transient failures of the embedding provider or vector store.
    pub fn is_dependency_failure(&self) -> bool {
        matches!(
            self,
            VaultError::Embedding(_) | VaultError::Store(_) | VaultError::Upsert { .. }
        )
    }
}

impl From<EmbeddingError> for VaultError {
    fn from(e: EmbeddingError) -> Self {
        VaultError::Embedding(e.reason)
    }
}

pub type VaultResult<T> = std::result::Result<T, VaultError>;
