//! List sync runs query
//!
//! Most recent runs first, optionally filtered by status.

use serde::{Deserialize, Serialize};

use crate::sync::{SyncError, SyncLogStore, SyncRun, SyncStatus};

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

/// Query to list sync runs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListSyncRunsQuery {
    /// Filter by status (e.g. "running", "failed")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SyncStatus>,
    /// Limit number of results (default 20, max 100)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

impl ListSyncRunsQuery {
    pub fn effective_limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

/// Response for list sync runs query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListSyncRunsResponse {
    pub runs: Vec<SyncRun>,
    pub limit: i64,
}

pub async fn handle(runs: &dyn SyncLogStore, query: ListSyncRunsQuery) -> Result<ListSyncRunsResponse, SyncError> {
    let limit = query.effective_limit();
    let items = runs.list(query.status, limit).await?;

    Ok(ListSyncRunsResponse { runs: items, limit })
}
