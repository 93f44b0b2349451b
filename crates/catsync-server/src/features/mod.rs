//! Feature modules implementing the catalog sync API
//!
//! Each feature is organized as a vertical slice with its own commands,
//! queries, and routes.
//!
//! # Features
//!
//! - **sync_runs**: Trigger, cancel and monitor sync runs
//! - **ean**: Internal EAN-13 generation and validation

pub mod ean;
pub mod sync_runs;

use axum::Router;
use std::sync::Arc;

use crate::sync::{SyncLogStore, SyncQueue};

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    pub runs: Arc<dyn SyncLogStore>,
    /// Worker queue; `None` when sync is disabled
    pub queue: Option<SyncQueue>,
}

/// Creates the API router with all feature routes mounted
///
/// - `/sync-runs` - Sync run management
/// - `/ean` - Barcode generation and validation
pub fn router(state: FeatureState) -> Router<()> {
    let sync_runs_state = sync_runs::SyncRunsState {
        runs: state.runs,
        queue: state.queue,
    };

    Router::new()
        .nest("/sync-runs", sync_runs::sync_runs_routes().with_state(sync_runs_state))
        .nest("/ean", ean::ean_routes())
}
