//! Sync run API routes
//!
//! # Route Structure
//!
//! - `POST /api/v1/sync-runs` - Trigger a run
//! - `GET /api/v1/sync-runs` - List runs, most recent first
//! - `GET /api/v1/sync-runs/:id` - Get one run
//! - `POST /api/v1/sync-runs/:id/cancel` - Cancel a pending or running run

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use super::{
    commands::{CancelSyncCommand, CancelSyncError, TriggerSyncCommand, TriggerSyncError},
    queries::{GetSyncRunError, GetSyncRunQuery, ListSyncRunsQuery},
    SyncRunsState,
};
use crate::error::AppError;

// ============================================================================
// Router Configuration
// ============================================================================

pub fn sync_runs_routes() -> Router<SyncRunsState> {
    Router::new()
        .route("/", post(trigger_sync).get(list_sync_runs))
        .route("/:id", get(get_sync_run))
        .route("/:id/cancel", post(cancel_sync_run))
}

// ============================================================================
// Command Handlers (Write Operations)
// ============================================================================

/// Trigger a sync run
///
/// # Request Body
///
/// ```json
/// { "sync_type": "full", "resume_from": null }
/// ```
///
/// # Response
///
/// - `202 Accepted` - Run created and queued
/// - `404 Not Found` - `resume_from` run does not exist
/// - `409 Conflict` - Another run is active, or the resume source is not resumable
/// - `503 Service Unavailable` - Sync disabled or queue full
async fn trigger_sync(
    State(state): State<SyncRunsState>,
    Json(command): Json<TriggerSyncCommand>,
) -> Result<Response, AppError> {
    let run = super::commands::trigger::handle(state.runs.as_ref(), state.queue.as_ref(), command).await?;

    Ok((StatusCode::ACCEPTED, Json(run)).into_response())
}

/// Cancel a sync run
///
/// # Response
///
/// - `200 OK` - Run cancelled
/// - `400 Bad Request` - Malformed run id
/// - `404 Not Found` - Run not found
/// - `409 Conflict` - Run already finished
#[tracing::instrument(skip(state))]
async fn cancel_sync_run(
    State(state): State<SyncRunsState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(id) = path?;
    let run = super::commands::cancel::handle(state.runs.as_ref(), CancelSyncCommand { id }).await?;

    Ok((StatusCode::OK, Json(run)).into_response())
}

// ============================================================================
// Query Handlers (Read Operations)
// ============================================================================

async fn get_sync_run(
    State(state): State<SyncRunsState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(id) = path?;
    let run = super::queries::get_run::handle(state.runs.as_ref(), GetSyncRunQuery { id }).await?;

    Ok((StatusCode::OK, Json(run)).into_response())
}

/// List sync runs
///
/// GET /sync-runs?status=failed&limit=10
async fn list_sync_runs(
    State(state): State<SyncRunsState>,
    query: Result<Query<ListSyncRunsQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(query) = query?;
    let response = super::queries::list_runs::handle(state.runs.as_ref(), query).await?;

    tracing::debug!(count = response.runs.len(), "Sync runs listed");

    Ok((StatusCode::OK, Json(response)).into_response())
}

// ============================================================================
// Error Mapping
// ============================================================================

impl From<TriggerSyncError> for AppError {
    fn from(err: TriggerSyncError) -> Self {
        match err {
            TriggerSyncError::AlreadyActive | TriggerSyncError::NotResumable { .. } => {
                AppError::Conflict(err.to_string())
            },
            TriggerSyncError::ResumeSourceNotFound(_) => AppError::NotFound(err.to_string()),
            TriggerSyncError::QueueUnavailable(_) => AppError::Unavailable(err.to_string()),
            TriggerSyncError::Sync(e) => AppError::Sync(e),
        }
    }
}

impl From<CancelSyncError> for AppError {
    fn from(err: CancelSyncError) -> Self {
        match err {
            CancelSyncError::NotFound(_) => AppError::NotFound(err.to_string()),
            CancelSyncError::AlreadyFinished { .. } => AppError::Conflict(err.to_string()),
            CancelSyncError::Sync(e) => AppError::Sync(e),
        }
    }
}

impl From<GetSyncRunError> for AppError {
    fn from(err: GetSyncRunError) -> Self {
        match err {
            GetSyncRunError::NotFound(_) => AppError::NotFound(err.to_string()),
            GetSyncRunError::Sync(e) => AppError::Sync(e),
        }
    }
}
