//! JSON HTTP surface for the vault.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/auth/login` | Exchange `{username, secret}` for a bearer token |
//! | `POST` | `/add` | Ingest `{texts: [...]}` for the caller |
//! | `POST` | `/search` | Retrieve `{query, top_k?}` from the caller's documents |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! `/add` and `/search` require `Authorization: Bearer <token>`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! | Status | Code | Cause |
//! |--------|------|-------|
//! | 401 | `unauthorized` | bad credentials, missing/malformed/expired/invalid token |
//! | 400 | `bad_request` | violated request constraint (message names it) |
//! | 502 | `embedding_failure` | embedding provider failed or timed out |
//! | 502 | `store_failure` | vector store query failed |
//! | 502 | `upsert_failure` | vector store write failed; body carries `written` |
//!
//! Every 401 has the same message whatever the cause.
//!
//! # Cancellation
//!
//! Axum drops a handler's future when the client disconnects, which
//! abandons the in-flight embedding or store call with it.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use uuid::Uuid;

use context_vault_core::error::VaultError;
use context_vault_core::models::QueryResult;

use crate::config::Config;
use crate::vault::Vault;

const UNAUTHORIZED_MESSAGE: &str = "unauthorized";

/// Starts the HTTP server on `[server].bind` and runs until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let vault = Arc::new(Vault::from_config(config)?);
    let app = build_router(vault);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "vault server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("vault server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

/// Build the router over a shared [`Vault`].
///
/// Exposed separately from [`run_server`] so tests can serve it on an
/// ephemeral port.
pub fn build_router(vault: Arc<Vault>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/auth/login", post(handle_login))
        .route("/add", post(handle_add))
        .route("/search", post(handle_search))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(vault)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
    /// Confirmed writes; present only for `upsert_failure`.
    #[serde(skip_serializing_if = "Option::is_none")]
    written: Option<usize>,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    written: Option<usize>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
                written: self.written,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn unauthorized() -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized",
        message: UNAUTHORIZED_MESSAGE.to_string(),
        written: None,
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
        written: None,
    }
}

fn bad_gateway(code: &'static str, message: String, written: Option<usize>) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code,
        message,
        written,
    }
}

fn internal_error() -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal_error",
        message: "internal error".to_string(),
        written: None,
    }
}

impl From<VaultError> for AppError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::AuthFailure | VaultError::Token(_) => unauthorized(),
            VaultError::InvalidInput(message) => bad_request(message),
            VaultError::Embedding(reason) => {
                error!(%reason, "embedding provider failure");
                bad_gateway("embedding_failure", "embedding provider failed".into(), None)
            }
            VaultError::Store(reason) => {
                error!(%reason, "vector store failure");
                bad_gateway("store_failure", "vector store query failed".into(), None)
            }
            VaultError::Upsert { written, reason } => {
                error!(written, %reason, "vector store upsert failure");
                bad_gateway(
                    "upsert_failure",
                    format!("vector store write failed after {} confirmed documents", written),
                    Some(written),
                )
            }
            VaultError::Internal(reason) => {
                error!(%reason, "internal failure");
                internal_error()
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(unauthorized)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /auth/login ============

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    secret: String,
}

#[derive(Serialize)]
struct LoginResponse {
    access_token: String,
    token_type: &'static str,
    expires_at: String,
}

async fn handle_login(
    State(vault): State<Arc<Vault>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let Json(req) = body?;
    let issued = vault.login(&req.username, &req.secret).await?;
    Ok(Json(LoginResponse {
        access_token: issued.token,
        token_type: "bearer",
        expires_at: issued.expires_at.to_rfc3339(),
    }))
}

// ============ POST /add ============

#[derive(Deserialize)]
struct AddRequest {
    texts: Vec<String>,
}

#[derive(Serialize)]
struct AddResponse {
    message: &'static str,
    upserted_count: usize,
    ids: Vec<Uuid>,
}

async fn handle_add(
    State(vault): State<Arc<Vault>>,
    headers: HeaderMap,
    body: Result<Json<AddRequest>, JsonRejection>,
) -> Result<Json<AddResponse>, AppError> {
    let token = bearer_token(&headers)?;
    let Json(req) = body?;
    let result = vault.ingest(token, &req.texts).await?;
    Ok(Json(AddResponse {
        message: "Texts added successfully",
        upserted_count: result.count,
        ids: result.document_ids,
    }))
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
}

async fn handle_search(
    State(vault): State<Arc<Vault>>,
    headers: HeaderMap,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<Vec<QueryResult>>, AppError> {
    let token = bearer_token(&headers)?;
    let Json(req) = body?;
    let results = vault.retrieve(token, &req.query, req.top_k).await?;
    Ok(Json(results))
}
