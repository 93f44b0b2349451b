//! Trigger sync run command
//!
//! Creates a `pending` run and queues it for the worker. At most one run may be
//! pending or running at a time. A run can resume the product phase after the
//! cursor of an earlier failed or cancelled run.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sync::{SyncError, SyncJob, SyncLogStore, SyncQueue, SyncRun, SyncStatus, SyncType};

/// Command to start a new sync run
///
/// # Examples
///
/// ```rust,ignore
/// let command = TriggerSyncCommand {
///     sync_type: SyncType::Full,
///     resume_from: Some(failed_run_id),
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerSyncCommand {
    pub sync_type: SyncType,

    /// Failed or cancelled run whose product cursor the new run starts after
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_from: Option<Uuid>,
}

/// Errors that can occur when triggering a run
#[derive(Debug, thiserror::Error)]
pub enum TriggerSyncError {
    #[error("Another sync run is already pending or running")]
    AlreadyActive,

    #[error("Sync run {0} to resume from was not found")]
    ResumeSourceNotFound(Uuid),

    #[error("Sync run {id} is {status}; only failed or cancelled runs can be resumed")]
    NotResumable { id: Uuid, status: SyncStatus },

    #[error("Sync worker unavailable: {0}")]
    QueueUnavailable(String),

    #[error("Sync error: {0}")]
    Sync(SyncError),
}

impl From<SyncError> for TriggerSyncError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Conflict => TriggerSyncError::AlreadyActive,
            other => TriggerSyncError::Sync(other),
        }
    }
}

#[tracing::instrument(skip(runs, queue), fields(sync_type = %command.sync_type))]
pub async fn handle(
    runs: &dyn SyncLogStore,
    queue: Option<&SyncQueue>,
    command: TriggerSyncCommand,
) -> Result<SyncRun, TriggerSyncError> {
    let Some(queue) = queue else {
        return Err(TriggerSyncError::QueueUnavailable("sync is disabled".to_string()));
    };

    let cursor = match command.resume_from {
        Some(source_id) => resume_cursor(runs, source_id).await?,
        None => None,
    };

    let run = runs.create(command.sync_type, cursor).await?;

    let job = SyncJob {
        sync_run_id: run.id,
        sync_type: run.sync_type,
    };
    if let Err(e) = queue.enqueue(job) {
        let message = format!("Could not queue sync run: {}", e);
        // Free the active slot so the next trigger is not blocked
        if let Err(fail_err) = runs.fail(run.id, &message).await {
            tracing::error!(sync_run_id = %run.id, error = %fail_err, "Failed to release unqueued run");
        }
        return Err(TriggerSyncError::QueueUnavailable(e.to_string()));
    }

    tracing::info!(
        sync_run_id = %run.id,
        resume_after = ?run.last_reference,
        "Sync run queued"
    );

    Ok(run)
}

async fn resume_cursor(runs: &dyn SyncLogStore, source_id: Uuid) -> Result<Option<String>, TriggerSyncError> {
    let source = runs
        .get(source_id)
        .await?
        .ok_or(TriggerSyncError::ResumeSourceNotFound(source_id))?;

    match source.status {
        SyncStatus::Failed | SyncStatus::Cancelled => Ok(source.last_reference),
        status => Err(TriggerSyncError::NotResumable {
            id: source_id,
            status,
        }),
    }
}
