use std::path::Path as FsPath;
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;

use super::lifecycle::LifecycleManager;
use super::models::ReconcileReport;
use super::static_server::content_type_for;
use crate::errors::HostError;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub manager: Arc<LifecycleManager>,
    /// Outcome of the reconciliation pass run at boot.
    pub last_reconcile: Mutex<Option<ReconcileReport>>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(manager: Arc<LifecycleManager>) -> Self {
        Self {
            manager,
            last_reconcile: Mutex::new(None),
        }
    }
}

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub owner_id: i64,
}

#[derive(Deserialize)]
pub struct OwnerQuery {
    pub owner_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct DirQuery {
    pub dir: Option<String>,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    Host(HostError),
    Internal(String),
}

impl From<HostError> for ApiError {
    fn from(err: HostError) -> Self {
        ApiError::Host(err)
    }
}

fn status_for(err: &HostError) -> StatusCode {
    match err {
        HostError::NotFound { .. } | HostError::FileNotFound { .. } => StatusCode::NOT_FOUND,
        HostError::DuplicateName { .. }
        | HostError::AlreadyRunning { .. }
        | HostError::AlreadyPaused { .. }
        | HostError::DirectoryMissing { .. } => StatusCode::CONFLICT,
        HostError::InvalidName { .. } | HostError::InvalidPath { .. } => StatusCode::BAD_REQUEST,
        HostError::PortExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
        HostError::NotRunning { .. }
        | HostError::ServerStartFailure { .. }
        | HostError::IoFailure { .. }
        | HostError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::Host(err) => (status_for(&err), err.kind(), err.to_string()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", msg),
        };
        if status.is_server_error() {
            tracing::error!(kind, error = %message, "Management API request failed");
        }
        (
            status,
            Json(serde_json::json!({"error": message, "kind": kind})),
        )
            .into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/projects", get(list_projects).post(create_project))
        .route(
            "/api/projects/{id}",
            get(get_project).delete(delete_project),
        )
        .route("/api/projects/{id}/start", post(start_project))
        .route("/api/projects/{id}/pause", post(pause_project))
        .route("/api/projects/{id}/files", get(list_files))
        .route(
            "/api/projects/{id}/files/{*path}",
            get(read_file).put(write_file).delete(delete_file),
        )
        .route("/api/reconcile", get(last_reconcile))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn list_projects(
    State(state): State<SharedState>,
    Query(query): Query<OwnerQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let projects = state.manager.list_projects(query.owner_id).await?;
    Ok(Json(projects))
}

async fn create_project(
    State(state): State<SharedState>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.manager.create_project(&req.name, req.owner_id).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_project(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.manager.get_project(id).await?))
}

async fn start_project(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.manager.start_project(id).await?))
}

async fn pause_project(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.manager.pause_project(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_project(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.manager.delete_project(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_files(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Query(query): Query<DirQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let dir = query.dir.unwrap_or_default();
    Ok(Json(state.manager.list_files(id, &dir).await?))
}

async fn read_file(
    State(state): State<SharedState>,
    Path((id, path)): Path<(i64, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let content = state.manager.read_file(id, &path).await?;
    Ok((
        [(header::CONTENT_TYPE, content_type_for(FsPath::new(&path)))],
        content,
    ))
}

async fn write_file(
    State(state): State<SharedState>,
    Path((id, path)): Path<(i64, String)>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    state.manager.write_file(id, &path, &body).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_file(
    State(state): State<SharedState>,
    Path((id, path)): Path<(i64, String)>,
) -> Result<impl IntoResponse, ApiError> {
    state.manager.delete_file(id, &path).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn last_reconcile(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .last_reconcile
        .lock()
        .map_err(|_| ApiError::Internal("Lock poisoned".into()))?
        .clone()
        .unwrap_or_default();
    Ok(Json(report))
}

// ── Tests ─────────────────────────────────────────────────────────────
