//! Sync run persistence
//!
//! [`SyncLogStore`] owns the `sync_logs` table. Status writes are conditional on
//! the current status so a terminal run is never overwritten: the orchestrator
//! can only complete a `running` run, and failure or cancellation only applies
//! to `pending` or `running` runs. Nothing is cached; every status check reads
//! the stored row.
//!
//! Progress counters are written by the catalog store inside the same
//! transaction as the data they describe, through [`apply_progress`].

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::error::{SyncError, SyncResult};
use super::models::{ProgressDelta, SyncPhase, SyncRun, SyncRunRecord, SyncStatus, SyncType};

const SYNC_RUN_COLUMNS: &str = r#"
    id, sync_type, status, current_phase,
    total_records, processed_records, inserted_records, updated_records, skipped_records,
    last_reference, started_at, completed_at, error_message, created_at, updated_at
"#;

#[async_trait]
pub trait SyncLogStore: Send + Sync {
    /// Insert a `pending` run; `Conflict` when another run is active
    async fn create(&self, sync_type: SyncType, last_reference: Option<String>) -> SyncResult<SyncRun>;

    async fn get(&self, id: Uuid) -> SyncResult<Option<SyncRun>>;

    /// Most recent first
    async fn list(&self, status: Option<SyncStatus>, limit: i64) -> SyncResult<Vec<SyncRun>>;

    async fn status(&self, id: Uuid) -> SyncResult<Option<SyncStatus>>;

    /// `pending -> running`; false when the run was not pending
    async fn start(&self, id: Uuid) -> SyncResult<bool>;

    async fn set_phase(&self, id: Uuid, phase: SyncPhase) -> SyncResult<()>;

    async fn add_total(&self, id: Uuid, count: i64) -> SyncResult<()>;

    /// `running -> completed`; false when the run was no longer running
    async fn complete(&self, id: Uuid, summary: Option<String>) -> SyncResult<bool>;

    /// `pending | running -> failed`; false when already terminal
    async fn fail(&self, id: Uuid, message: &str) -> SyncResult<bool>;

    /// `pending | running -> cancelled`; false when already terminal
    async fn cancel(&self, id: Uuid) -> SyncResult<bool>;

    /// Fail non-terminal runs with no write for at least `stale_after`,
    /// returning how many were affected
    ///
    /// Every progress write bumps `updated_at`, so a run still owned by a live
    /// worker is never older than that worker's job timeout.
    async fn fail_interrupted(&self, message: &str, stale_after: Duration) -> SyncResult<u64>;
}

/// Postgres-backed [`SyncLogStore`]
#[derive(Clone)]
pub struct PgSyncLogStore {
    pool: PgPool,
}

impl PgSyncLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncLogStore for PgSyncLogStore {
    async fn create(&self, sync_type: SyncType, last_reference: Option<String>) -> SyncResult<SyncRun> {
        let run = SyncRun::pending(sync_type, last_reference);

        let record = sqlx::query_as::<_, SyncRunRecord>(&format!(
            r#"
            INSERT INTO sync_logs (id, sync_type, status, last_reference, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING {SYNC_RUN_COLUMNS}
            "#
        ))
        .bind(run.id)
        .bind(sync_type.as_str())
        .bind(SyncStatus::Pending.as_str())
        .bind(&run.last_reference)
        .bind(run.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db_err) if db_err.is_unique_violation() => SyncError::Conflict,
            _ => SyncError::Database(e),
        })?;

        info!(sync_run_id = %record.id, sync_type = %sync_type, "Sync run created");
        SyncRun::try_from(record)
    }

    async fn get(&self, id: Uuid) -> SyncResult<Option<SyncRun>> {
        sqlx::query_as::<_, SyncRunRecord>(&format!(
            "SELECT {SYNC_RUN_COLUMNS} FROM sync_logs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(SyncRun::try_from)
        .transpose()
    }

    async fn list(&self, status: Option<SyncStatus>, limit: i64) -> SyncResult<Vec<SyncRun>> {
        let records = sqlx::query_as::<_, SyncRunRecord>(&format!(
            r#"
            SELECT {SYNC_RUN_COLUMNS} FROM sync_logs
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2
            "#
        ))
        .bind(status.map(SyncStatus::as_str))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(SyncRun::try_from).collect()
    }

    async fn status(&self, id: Uuid) -> SyncResult<Option<SyncStatus>> {
        let status = sqlx::query_scalar::<_, String>("SELECT status FROM sync_logs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        status
            .map(|s| s.parse::<SyncStatus>().map_err(|e| SyncError::Storage(e.to_string())))
            .transpose()
    }

    async fn start(&self, id: Uuid) -> SyncResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sync_logs
            SET status = 'running', started_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_phase(&self, id: Uuid, phase: SyncPhase) -> SyncResult<()> {
        sqlx::query("UPDATE sync_logs SET current_phase = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(phase.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn add_total(&self, id: Uuid, count: i64) -> SyncResult<()> {
        sqlx::query(
            "UPDATE sync_logs SET total_records = total_records + $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete(&self, id: Uuid, summary: Option<String>) -> SyncResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sync_logs
            SET status = 'completed', error_message = $2, completed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(id)
        .bind(summary)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn fail(&self, id: Uuid, message: &str) -> SyncResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sync_logs
            SET status = 'failed', error_message = $2, completed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'running')
            "#,
        )
        .bind(id)
        .bind(message)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn cancel(&self, id: Uuid) -> SyncResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sync_logs
            SET status = 'cancelled', completed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'running')
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn fail_interrupted(&self, message: &str, stale_after: Duration) -> SyncResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE sync_logs
            SET status = 'failed', error_message = $1, completed_at = NOW(), updated_at = NOW()
            WHERE status IN ('pending', 'running')
              AND updated_at < NOW() - make_interval(secs => $2)
            "#,
        )
        .bind(message)
        .bind(stale_after.as_secs_f64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Add a committed unit of work to a run's counters
///
/// Runs on the caller's connection so it commits or rolls back together with
/// the rows it counts. `cursor` moves the product cursor when given.
pub async fn apply_progress(
    conn: &mut PgConnection,
    run_id: Uuid,
    delta: &ProgressDelta,
    cursor: Option<&str>,
) -> SyncResult<()> {
    sqlx::query(
        r#"
        UPDATE sync_logs
        SET processed_records = processed_records + $2,
            inserted_records = inserted_records + $3,
            updated_records = updated_records + $4,
            skipped_records = skipped_records + $5,
            last_reference = COALESCE($6, last_reference),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(run_id)
    .bind(delta.processed)
    .bind(delta.inserted)
    .bind(delta.updated)
    .bind(delta.skipped)
    .bind(cursor)
    .execute(conn)
    .await?;

    Ok(())
}

/// Status and phase writer for one run
#[derive(Clone)]
pub struct SyncLogRecorder {
    store: Arc<dyn SyncLogStore>,
    run_id: Uuid,
}

impl SyncLogRecorder {
    pub fn new(store: Arc<dyn SyncLogStore>, run_id: Uuid) -> Self {
        Self { store, run_id }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Re-read the stored status; `Some` when the run must stop
    ///
    /// Anything other than `running` stops the run: `cancelled` from the
    /// external actor, `failed` from the worker's failure hook, or a deleted row.
    pub async fn stop_signal(&self) -> SyncResult<Option<StopReason>> {
        let status = self.store.status(self.run_id).await?;
        let reason = match status {
            Some(SyncStatus::Running) => None,
            Some(SyncStatus::Cancelled) => Some(StopReason::Cancelled),
            Some(other) => Some(StopReason::Status(other)),
            None => Some(StopReason::Missing),
        };

        if let Some(reason) = &reason {
            debug!(sync_run_id = %self.run_id, ?reason, "Stop signal observed");
        }
        Ok(reason)
    }

    pub async fn enter_phase(&self, phase: SyncPhase) -> SyncResult<()> {
        info!(sync_run_id = %self.run_id, phase = %phase, "Entering phase");
        self.store.set_phase(self.run_id, phase).await
    }

    pub async fn add_total(&self, count: i64) -> SyncResult<()> {
        if count == 0 {
            return Ok(());
        }
        self.store.add_total(self.run_id, count).await
    }

    pub async fn complete(&self, summary: Option<String>) -> SyncResult<bool> {
        self.store.complete(self.run_id, summary).await
    }

    pub async fn fail(&self, message: &str) -> SyncResult<bool> {
        self.store.fail(self.run_id, message).await
    }
}

/// Why a run stopped before finishing its phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    /// Moved to another status by someone else, e.g. failed by the timeout hook
    Status(SyncStatus),
    Missing,
}
