//! HTTP API for the browser extension and dashboard.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version, no auth) |
//! | `POST` | `/sync` | Ingest a batch of conversations and files |
//! | `GET`  | `/conversations` | List the caller's conversations |
//! | `GET`  | `/conversations/{id}` | One conversation with messages and files |
//! | `DELETE` | `/conversations/{id}` | Delete a conversation |
//!
//! Every endpoint except `/health` requires `Authorization: Bearer <token>`
//! (see [`crate::auth`]) and only ever sees the caller's own rows.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "conversations must be an array" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `not_found` (404),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted; requests come from an
//! extension content script running on third-party chat sites.

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, DefaultBodyLimit, FromRequestParts, Path, Query, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::auth;
use crate::config::Config;
use crate::db;
use crate::ingest;
use crate::migrate;
use crate::models::{Identity, SyncCounts};
use crate::store::{ConversationResponse, ConversationSummary, SqliteStore, Store};

const DEFAULT_LIST_LIMIT: i64 = 50;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    store: Arc<dyn Store>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn Store>) -> Self {
        Self {
            config: Arc::new(config),
            store,
        }
    }
}

/// Builds the router with every route and layer attached.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.config.server.max_body_bytes;

    Router::new()
        .route("/health", get(handle_health))
        .route("/sync", post(handle_sync))
        .route("/conversations", get(handle_list_conversations))
        .route(
            "/conversations/{id}",
            get(handle_get_conversation).delete(handle_delete_conversation),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until Ctrl-C.
///
/// The schema is applied on startup, so a fresh database path works
/// without a separate `threadkeep init`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;

    let bind_addr = config.server.bind.clone();
    let state = AppState::new(config.clone(), Arc::new(SqliteStore::new(pool.clone())));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("threadkeep listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
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
}

/// Internal error type that converts into an Axum HTTP response.
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    error!(error = %err, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: "internal error".to_string(),
    }
}

/// Conversation ids in paths are UUIDs; anything else cannot exist.
fn conversation_id(raw: &str) -> Result<String, AppError> {
    Uuid::parse_str(raw.trim())
        .map(|u| u.hyphenated().to_string())
        .map_err(|_| not_found(format!("conversation not found: {}", raw)))
}

// ============ Authentication ============

/// Extractor that resolves the bearer token into the caller's identity.
/// Rejects with 401 before the handler (or its body) is touched.
pub struct Authenticated(pub Identity);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        auth::authenticate_header(&state.config.auth, header, chrono::Utc::now().timestamp())
            .map(Authenticated)
            .map_err(|e| {
                debug!(error = %e, "rejected credentials");
                unauthorized(e.to_string())
            })
    }
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

// ============ POST /sync ============

#[derive(Serialize)]
struct SyncResponse {
    success: bool,
    synced: SyncCounts,
}

/// Handler for `POST /sync`.
///
/// The body is taken as raw bytes so that malformed JSON and a missing
/// `conversations` array both produce the standard 400 error body.
async fn handle_sync(
    State(state): State<AppState>,
    Authenticated(owner): Authenticated,
    body: Bytes,
) -> Result<Json<SyncResponse>, AppError> {
    let body: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| bad_request(format!("invalid JSON body: {}", e)))?;

    let synced = ingest::sync_batch(state.store.as_ref(), &owner, body)
        .await
        .map_err(|e| bad_request(e.to_string()))?;

    Ok(Json(SyncResponse {
        success: true,
        synced,
    }))
}

// ============ GET /conversations ============

#[derive(Deserialize)]
struct ListParams {
    limit: Option<i64>,
}

#[derive(Serialize)]
struct ListResponse {
    conversations: Vec<ConversationSummary>,
}

async fn handle_list_conversations(
    State(state): State<AppState>,
    Authenticated(owner): Authenticated,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<ListResponse>, AppError> {
    let Query(params) = params.map_err(|e| bad_request(e.body_text()))?;
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    if limit < 1 {
        return Err(bad_request("limit must be >= 1"));
    }
    let conversations = state
        .store
        .list_conversations(owner.as_str(), limit)
        .await
        .map_err(internal)?;
    Ok(Json(ListResponse { conversations }))
}

// ============ GET /conversations/{id} ============

async fn handle_get_conversation(
    State(state): State<AppState>,
    Authenticated(owner): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<ConversationResponse>, AppError> {
    let id = conversation_id(&id)?;
    state
        .store
        .get_conversation(owner.as_str(), &id)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or_else(|| not_found(format!("conversation not found: {}", id)))
}

// ============ DELETE /conversations/{id} ============

#[derive(Serialize)]
struct DeleteResponse {
    success: bool,
    deleted: String,
}

async fn handle_delete_conversation(
    State(state): State<AppState>,
    Authenticated(owner): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let id = conversation_id(&id)?;
    let deleted = state
        .store
        .delete_conversation(owner.as_str(), &id)
        .await
        .map_err(internal)?;

    if !deleted {
        return Err(not_found(format!("conversation not found: {}", id)));
    }
    info!(owner = %owner, conversation_id = %id, "conversation deleted");
    Ok(Json(DeleteResponse { success: true, deleted: id }))
}
