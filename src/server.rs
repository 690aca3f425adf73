//! HTTP session API.
//!
//! Exposes the session controller over JSON so a browser UI (or any HTTP
//! client) can drive Process, Ask and Clear for its own session.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/sessions` | Create a session |
//! | `GET`    | `/sessions/{id}` | Session state and transcript |
//! | `DELETE` | `/sessions/{id}` | Forget a session (local state only) |
//! | `POST`   | `/sessions/{id}/process` | Clone and ingest `{url}` |
//! | `POST`   | `/sessions/{id}/ask` | Submit `{text}` to the chat |
//! | `POST`   | `/sessions/{id}/clear` | Remove repository data and index |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Please enter a GitHub repository URL" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `ingestion_failed` (502).
//!
//! Ask never fails at the HTTP level: question errors come back as the
//! assistant's reply, exactly as the chat shows them.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::error::ProcessError;
use crate::models::Message;
use crate::present;
use crate::session::{
    ClearReport, ProcessReport, Reply, Services, Session, SessionSnapshot, SessionStore,
};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    services: Arc<Services>,
    sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(services: Services) -> Self {
        Self {
            services: Arc::new(services),
            sessions: Arc::new(SessionStore::new()),
        }
    }
}

/// Builds the router with all routes and the CORS layer.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/sessions", post(handle_create_session))
        .route(
            "/sessions/{id}",
            get(handle_get_session).delete(handle_delete_session),
        )
        .route("/sessions/{id}/process", post(handle_process))
        .route("/sessions/{id}/ask", post(handle_ask))
        .route("/sessions/{id}/clear", post(handle_clear))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(services: Services) -> anyhow::Result<()> {
    let bind_addr = services.config.server.bind.clone();
    let app = build_router(AppState::new(services));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "session API listening");
    println!("gitinsight listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
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
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn ingestion_failed(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "ingestion_failed".to_string(),
        message: message.into(),
    }
}

/// An empty URL is the caller's mistake; everything else failed downstream.
fn classify_process_error(err: &ProcessError) -> AppError {
    let message = present::process_error(err);
    match err {
        ProcessError::EmptyUrl => bad_request(message),
        _ => ingestion_failed(message),
    }
}

async fn find_session(state: &AppState, id: &str) -> Result<Arc<Mutex<Session>>, AppError> {
    state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| not_found(format!("no session with id: {}", id)))
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

// ============ /sessions ============

#[derive(Serialize)]
struct CreatedSession {
    id: String,
    index_name: String,
}

async fn handle_create_session(
    State(state): State<AppState>,
) -> (StatusCode, Json<CreatedSession>) {
    let (id, session) = state.sessions.create(&state.services.config).await;
    let index_name = session.lock().await.index_name().to_string();
    tracing::debug!(session = %id, "session created");
    (StatusCode::CREATED, Json(CreatedSession { id, index_name }))
}

async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = find_session(&state, &id).await?;
    let session = session.lock().await;
    Ok(Json(SessionSnapshot::from(&*session)))
}

/// Drops the session from memory. Its index and working directory stay;
/// call clear first to remove them.
async fn handle_delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.sessions.remove(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("no session with id: {}", id)))
    }
}

// ============ POST /sessions/{id}/process ============

#[derive(Deserialize)]
struct ProcessRequest {
    url: String,
}

#[derive(Serialize)]
struct ProcessResponse {
    message: String,
    #[serde(flatten)]
    report: ProcessReport,
}

async fn handle_process(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ProcessRequest>,
) -> Result<Json<ProcessResponse>, AppError> {
    let session = find_session(&state, &id).await?;
    let mut session = session.lock().await;

    let report = state
        .services
        .process(&mut session, &req.url)
        .await
        .map_err(|e| {
            tracing::warn!(session = %id, error = %e, "process failed");
            classify_process_error(&e)
        })?;

    Ok(Json(ProcessResponse {
        message: present::process_success(&report),
        report,
    }))
}

// ============ POST /sessions/{id}/ask ============

#[derive(Deserialize)]
struct AskRequest {
    text: String,
}

#[derive(Serialize)]
struct AskResponse {
    reply: Reply,
    transcript: Vec<Message>,
}

async fn handle_ask(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    let session = find_session(&state, &id).await?;
    let mut session = session.lock().await;

    let reply = state.services.ask(&mut session, &req.text).await;

    Ok(Json(AskResponse {
        reply,
        transcript: session.transcript().to_vec(),
    }))
}

// ============ POST /sessions/{id}/clear ============

#[derive(Serialize)]
struct ClearResponse {
    messages: Vec<String>,
    #[serde(flatten)]
    report: ClearReport,
}

async fn handle_clear(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ClearResponse>, AppError> {
    let session = find_session(&state, &id).await?;
    let mut session = session.lock().await;

    let report = state.services.clear(&mut session).await;

    Ok(Json(ClearResponse {
        messages: present::clear_summary(&report),
        report,
    }))
}
