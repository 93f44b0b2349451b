//! Cancel sync run command
//!
//! Flips a `pending` or `running` run to `cancelled`. The orchestrator observes
//! the new status at its next check and stops; the current chunk, if any, is
//! committed first.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sync::{SyncError, SyncLogStore, SyncRun, SyncStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelSyncCommand {
    pub id: Uuid,
}

#[derive(Debug, thiserror::Error)]
pub enum CancelSyncError {
    #[error("Sync run {0} not found")]
    NotFound(Uuid),

    #[error("Sync run {id} already finished with status {status}")]
    AlreadyFinished { id: Uuid, status: SyncStatus },

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
}

#[tracing::instrument(skip(runs), fields(sync_run_id = %command.id))]
pub async fn handle(runs: &dyn SyncLogStore, command: CancelSyncCommand) -> Result<SyncRun, CancelSyncError> {
    let id = command.id;

    if !runs.cancel(id).await? {
        return match runs.status(id).await? {
            Some(status) => Err(CancelSyncError::AlreadyFinished { id, status }),
            None => Err(CancelSyncError::NotFound(id)),
        };
    }

    tracing::info!("Sync run cancelled");

    runs.get(id).await?.ok_or(CancelSyncError::NotFound(id))
}
