//! Sync runs feature module
//!
//! Trigger, cancel and monitor catalog sync runs.

pub mod commands;
pub mod queries;
pub mod routes;

use std::sync::Arc;

use crate::sync::{SyncLogStore, SyncQueue};

pub use routes::sync_runs_routes;

/// State for the sync run routes
#[derive(Clone)]
pub struct SyncRunsState {
    pub runs: Arc<dyn SyncLogStore>,
    /// `None` when sync is disabled; triggers are then rejected
    pub queue: Option<SyncQueue>,
}
