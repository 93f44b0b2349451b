//! Sync run orchestration
//!
//! [`SyncOrchestrator::run`] drives one run through its phases:
//!
//! ```text
//! lookups -> products (chunk loop) -> prices -> finalize
//! ```
//!
//! Phases are gated by the run's [`SyncType`]. The stored status is re-read
//! before every phase and before every product chunk; any status other than
//! `running` stops the run without writing a terminal status. An error inside
//! a phase fails the run with its message. Nothing escapes as an error: the
//! caller gets a [`RunOutcome`].

use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::chunk::ChunkProcessor;
use super::erp::ErpSource;
use super::error::SyncResult;
use super::lookups::LookupSyncer;
use super::models::{ProgressDelta, SyncPhase, SyncStatus, SyncType};
use super::prices::PriceSyncer;
use super::recorder::{StopReason, SyncLogRecorder, SyncLogStore};
use super::storage::CatalogStore;

/// How a call to [`SyncOrchestrator::run`] ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(ProgressDelta),
    Failed(String),
    Cancelled,
    /// The run was not pending when picked up, or left `running` by someone else
    Skipped(SyncStatus),
    NotFound,
}

enum Claim {
    /// Now running; carries the resume cursor
    Started(Option<String>),
    Declined(RunOutcome),
}

enum Flow {
    Finished(ProgressDelta),
    Stopped(StopReason),
}

pub struct SyncOrchestrator {
    runs: Arc<dyn SyncLogStore>,
    catalog: Arc<dyn CatalogStore>,
    erp: Arc<dyn ErpSource>,
    lookups: LookupSyncer,
    chunks: ChunkProcessor,
    prices: PriceSyncer,
    page_size: usize,
}

impl SyncOrchestrator {
    pub fn new(
        runs: Arc<dyn SyncLogStore>,
        erp: Arc<dyn ErpSource>,
        catalog: Arc<dyn CatalogStore>,
        page_size: usize,
    ) -> Self {
        Self {
            lookups: LookupSyncer::new(Arc::clone(&erp), Arc::clone(&catalog)),
            chunks: ChunkProcessor::new(Arc::clone(&erp), Arc::clone(&catalog)),
            prices: PriceSyncer::new(Arc::clone(&erp), Arc::clone(&catalog), page_size),
            runs,
            catalog,
            erp,
            page_size,
        }
    }

    pub fn runs(&self) -> &Arc<dyn SyncLogStore> {
        &self.runs
    }

    #[instrument(skip(self), fields(sync_run_id = %run_id, sync_type = %sync_type))]
    pub async fn run(&self, run_id: Uuid, sync_type: SyncType) -> RunOutcome {
        let recorder = SyncLogRecorder::new(Arc::clone(&self.runs), run_id);

        let cursor = match self.claim(run_id).await {
            Ok(Claim::Started(cursor)) => cursor,
            Ok(Claim::Declined(outcome)) => return outcome,
            Err(e) => {
                error!(error = %e, "Failed to load sync run");
                return self.record_failure(&recorder, e.to_string()).await;
            },
        };

        info!(resume_after = ?cursor, "Sync run started");

        match self.execute(&recorder, sync_type, cursor).await {
            Ok(Flow::Finished(delta)) => self.finish(&recorder, delta).await,
            Ok(Flow::Stopped(reason)) => {
                info!(?reason, "Sync run stopped");
                outcome_for_stop(reason)
            },
            Err(e) => {
                error!(error = %e, transient = e.is_transient(), "Sync run failed");
                self.record_failure(&recorder, e.to_string()).await
            },
        }
    }

    /// Move the run from pending to running and return its resume cursor
    async fn claim(&self, run_id: Uuid) -> SyncResult<Claim> {
        let Some(run) = self.runs.get(run_id).await? else {
            warn!("Sync run not found");
            return Ok(Claim::Declined(RunOutcome::NotFound));
        };

        if run.status != SyncStatus::Pending {
            info!(status = %run.status, "Sync run not pending, nothing to do");
            return Ok(Claim::Declined(outcome_for_status(Some(run.status))));
        }

        if !self.runs.start(run_id).await? {
            let status = self.runs.status(run_id).await?;
            return Ok(Claim::Declined(outcome_for_status(status)));
        }

        Ok(Claim::Started(run.last_reference))
    }

    async fn execute(
        &self,
        recorder: &SyncLogRecorder,
        sync_type: SyncType,
        mut cursor: Option<String>,
    ) -> SyncResult<Flow> {
        let mut progress = ProgressDelta::default();

        for phase in sync_type.phases() {
            if let Some(reason) = recorder.stop_signal().await? {
                return Ok(Flow::Stopped(reason));
            }
            recorder.enter_phase(phase).await?;

            match phase {
                SyncPhase::Lookups => progress.merge(self.lookups.sync_all(recorder).await?),
                SyncPhase::Products => {
                    if let Some(reason) = self.sync_products(recorder, &mut cursor, &mut progress).await? {
                        return Ok(Flow::Stopped(reason));
                    }
                },
                SyncPhase::Prices => progress.merge(self.prices.sync(recorder).await?),
                SyncPhase::Finalize => {
                    if sync_type.runs_phase(SyncPhase::Products) {
                        self.catalog.backfill_barcodes().await?;
                    }
                },
            }
        }

        Ok(Flow::Finished(progress))
    }

    /// Chunk loop; returns a stop reason when the run was stopped between chunks
    async fn sync_products(
        &self,
        recorder: &SyncLogRecorder,
        cursor: &mut Option<String>,
        progress: &mut ProgressDelta,
    ) -> SyncResult<Option<StopReason>> {
        // Resumed runs only count what is left past the cursor
        let estimate = self.erp.count_products(cursor.as_deref()).await?;
        recorder.add_total(estimate).await?;

        let mut chunks = 0usize;
        loop {
            if let Some(reason) = recorder.stop_signal().await? {
                return Ok(Some(reason));
            }

            let result = self
                .chunks
                .process_chunk(recorder.run_id(), cursor.as_deref(), self.page_size)
                .await?;
            chunks += 1;
            progress.merge(result.delta);

            if let Some(last) = result.last_reference {
                *cursor = Some(last);
            }
            if !result.has_more {
                break;
            }
        }

        info!(
            chunks,
            cursor = ?cursor,
            processed = progress.processed,
            "Product phase finished"
        );
        Ok(None)
    }

    async fn finish(&self, recorder: &SyncLogRecorder, progress: ProgressDelta) -> RunOutcome {
        let summary = (progress.skipped > 0).then(|| format!("{} rows skipped", progress.skipped));

        match recorder.complete(summary).await {
            Ok(true) => {
                info!(
                    processed = progress.processed,
                    inserted = progress.inserted,
                    updated = progress.updated,
                    skipped = progress.skipped,
                    "Sync run completed"
                );
                RunOutcome::Completed(progress)
            },
            // Status moved between the last poll and completion
            Ok(false) => self.settled_outcome(recorder, "completion rejected".to_string()).await,
            Err(e) => {
                error!(error = %e, "Failed to mark sync run completed");
                self.record_failure(recorder, e.to_string()).await
            },
        }
    }

    async fn record_failure(&self, recorder: &SyncLogRecorder, message: String) -> RunOutcome {
        match recorder.fail(&message).await {
            Ok(true) => RunOutcome::Failed(message),
            Ok(false) => self.settled_outcome(recorder, message).await,
            Err(e) => {
                error!(error = %e, "Failed to mark sync run failed");
                RunOutcome::Failed(message)
            },
        }
    }

    /// Outcome for a run whose terminal status was written by someone else
    async fn settled_outcome(&self, recorder: &SyncLogRecorder, fallback: String) -> RunOutcome {
        match self.runs.status(recorder.run_id()).await {
            Ok(status) => outcome_for_status(status),
            Err(_) => RunOutcome::Failed(fallback),
        }
    }
}

fn outcome_for_status(status: Option<SyncStatus>) -> RunOutcome {
    match status {
        Some(SyncStatus::Cancelled) => RunOutcome::Cancelled,
        Some(status) => RunOutcome::Skipped(status),
        None => RunOutcome::NotFound,
    }
}

fn outcome_for_stop(reason: StopReason) -> RunOutcome {
    match reason {
        StopReason::Cancelled => RunOutcome::Cancelled,
        StopReason::Status(status) => RunOutcome::Skipped(status),
        StopReason::Missing => RunOutcome::NotFound,
    }
}
