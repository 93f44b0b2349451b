//! Get sync run query

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sync::{SyncError, SyncLogStore, SyncRun};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSyncRunQuery {
    pub id: Uuid,
}

#[derive(Debug, thiserror::Error)]
pub enum GetSyncRunError {
    #[error("Sync run {0} not found")]
    NotFound(Uuid),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
}

pub async fn handle(runs: &dyn SyncLogStore, query: GetSyncRunQuery) -> Result<SyncRun, GetSyncRunError> {
    runs.get(query.id)
        .await?
        .ok_or(GetSyncRunError::NotFound(query.id))
}
