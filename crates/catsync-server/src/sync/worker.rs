//! Background sync worker
//!
//! Triggered runs are queued on a bounded channel and executed one at a time.
//! Each job runs in its own task under a timeout. When the task times out,
//! panics or is aborted, the worker marks the run failed, unless the run has
//! already reached a terminal status.
//!
//! On shutdown the active job is aborted and its run failed, and jobs still
//! waiting in the queue are failed without being started.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::error::{SyncError, SyncResult};
use super::models::{SyncStatus, SyncType};
use super::orchestrator::{RunOutcome, SyncOrchestrator};
use super::recorder::SyncLogStore;

pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

const INTERRUPTED_MESSAGE: &str = "Interrupted by worker restart";
const SHUTDOWN_MESSAGE: &str = "Interrupted by shutdown";

/// Work item placed on the queue by the trigger endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJob {
    pub sync_run_id: Uuid,
    pub sync_type: SyncType,
}

/// Sending half of the worker queue
#[derive(Clone)]
pub struct SyncQueue {
    tx: mpsc::Sender<SyncJob>,
}

impl SyncQueue {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SyncJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue a job without waiting; fails when the queue is full or the worker is gone
    pub fn enqueue(&self, job: SyncJob) -> SyncResult<()> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(job) => {
                SyncError::Storage(format!("sync queue is full, run {} not queued", job.sync_run_id))
            },
            mpsc::error::TrySendError::Closed(job) => {
                SyncError::Storage(format!("sync worker is not running, run {} not queued", job.sync_run_id))
            },
        })
    }
}

/// Handle to a started worker
pub struct WorkerHandle {
    task: JoinHandle<()>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl WorkerHandle {
    /// Stop the worker: the active run and every queued run are failed
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Sync worker task ended abnormally");
        }
    }

    /// Wait for the worker to drain the queue after every sender is dropped
    pub async fn join(self) -> Result<(), JoinError> {
        self.task.await
    }
}

pub struct SyncWorker {
    orchestrator: Arc<SyncOrchestrator>,
    runs: Arc<dyn SyncLogStore>,
    job_timeout: Duration,
    shutdown: Arc<watch::Sender<bool>>,
}

impl SyncWorker {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, job_timeout: Duration) -> Self {
        let runs = Arc::clone(orchestrator.runs());
        let (shutdown, _) = watch::channel(false);
        Self {
            orchestrator,
            runs,
            job_timeout,
            shutdown: Arc::new(shutdown),
        }
    }

    /// Fail runs left pending or running by a process that is gone
    ///
    /// A run counts as abandoned once it has gone a full job timeout without a
    /// write; runs owned by another live worker are left alone.
    pub async fn recover(&self) -> SyncResult<u64> {
        let recovered = self
            .runs
            .fail_interrupted(INTERRUPTED_MESSAGE, self.job_timeout)
            .await?;
        if recovered > 0 {
            warn!(recovered, "Marked interrupted sync runs as failed");
        }
        Ok(recovered)
    }

    /// Consume jobs until every queue sender is dropped or shutdown is requested
    pub fn start(self, mut rx: mpsc::Receiver<SyncJob>) -> WorkerHandle {
        let shutdown = Arc::clone(&self.shutdown);

        let task = tokio::spawn(async move {
            info!(timeout_secs = self.job_timeout.as_secs(), "Sync worker started");

            loop {
                let job = tokio::select! {
                    biased;
                    _ = shutdown_requested(self.shutdown.subscribe()) => break,
                    job = rx.recv() => match job {
                        Some(job) => job,
                        None => {
                            info!("Sync queue closed, worker stopping");
                            return;
                        },
                    },
                };

                let outcome = self.execute(job.clone()).await;
                info!(sync_run_id = %job.sync_run_id, ?outcome, "Sync job finished");
            }

            rx.close();
            let mut abandoned = 0usize;
            while let Ok(job) = rx.try_recv() {
                self.on_failure(job.sync_run_id, SHUTDOWN_MESSAGE.to_string()).await;
                abandoned += 1;
            }
            info!(abandoned, "Sync worker shut down");
        });

        WorkerHandle { task, shutdown }
    }

    /// Run one job under the timeout and report how it ended
    pub async fn execute(&self, job: SyncJob) -> RunOutcome {
        let orchestrator = Arc::clone(&self.orchestrator);
        let SyncJob { sync_run_id, sync_type } = job;

        let mut handle = tokio::spawn(async move { orchestrator.run(sync_run_id, sync_type).await });

        tokio::select! {
            result = tokio::time::timeout(self.job_timeout, &mut handle) => match result {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(join_error)) => {
                    let message = describe_join_error(join_error);
                    error!(sync_run_id = %sync_run_id, error = %message, "Sync job task died");
                    self.on_failure(sync_run_id, message).await
                },
                Err(_) => {
                    stop_task(handle).await;
                    let message = format!("Sync run exceeded timeout of {}s", self.job_timeout.as_secs());
                    error!(sync_run_id = %sync_run_id, "{}", message);
                    self.on_failure(sync_run_id, message).await
                },
            },
            _ = shutdown_requested(self.shutdown.subscribe()) => {
                stop_task(handle).await;
                warn!(sync_run_id = %sync_run_id, "Sync job aborted by shutdown");
                self.on_failure(sync_run_id, SHUTDOWN_MESSAGE.to_string()).await
            },
        }
    }

    /// Failure hook; a run that is already terminal keeps its status
    async fn on_failure(&self, run_id: Uuid, message: String) -> RunOutcome {
        match self.runs.fail(run_id, &message).await {
            Ok(true) => RunOutcome::Failed(message),
            Ok(false) => match self.runs.status(run_id).await {
                Ok(Some(status)) => {
                    info!(sync_run_id = %run_id, status = %status, "Run already terminal, failure not recorded");
                    match status {
                        SyncStatus::Cancelled => RunOutcome::Cancelled,
                        status => RunOutcome::Skipped(status),
                    }
                },
                Ok(None) => RunOutcome::NotFound,
                Err(e) => {
                    error!(sync_run_id = %run_id, error = %e, "Failed to read run status");
                    RunOutcome::Failed(message)
                },
            },
            Err(e) => {
                error!(sync_run_id = %run_id, error = %e, "Failed to record run failure");
                RunOutcome::Failed(message)
            },
        }
    }
}

/// Resolves once shutdown is flagged; never resolves if the flag is dropped unset
async fn shutdown_requested(mut rx: watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Abort a job task and wait until it has stopped writing
async fn stop_task(handle: JoinHandle<RunOutcome>) {
    handle.abort();
    let _ = handle.await;
}

fn describe_join_error(err: JoinError) -> String {
    if err.is_cancelled() {
        return "Sync task was aborted".to_string();
    }

    let payload = err.into_panic();
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("Sync task panicked: {}", detail)
}
