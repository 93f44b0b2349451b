//! Data models for catalog sync runs
//!
//! A [`SyncRun`] is the persisted progress-and-status record of one run. It is
//! the only state shared between the orchestrator, the worker, and the HTTP
//! cancel/monitoring surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::error::SyncError;

/// Which phases a run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    Full,
    LookupsOnly,
    PricesOnly,
}

impl SyncType {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncType::Full => "full",
            SyncType::LookupsOnly => "lookups_only",
            SyncType::PricesOnly => "prices_only",
        }
    }

    /// Phase gating: lookups unless prices_only, products only for full,
    /// prices unless lookups_only, finalize always.
    pub fn runs_phase(self, phase: SyncPhase) -> bool {
        match phase {
            SyncPhase::Lookups => self != SyncType::PricesOnly,
            SyncPhase::Products => self == SyncType::Full,
            SyncPhase::Prices => self != SyncType::LookupsOnly,
            SyncPhase::Finalize => true,
        }
    }

    /// Phases this type executes, in order
    pub fn phases(self) -> impl Iterator<Item = SyncPhase> {
        SyncPhase::ALL
            .into_iter()
            .filter(move |phase| self.runs_phase(*phase))
    }
}

impl std::fmt::Display for SyncType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(SyncType::Full),
            "lookups_only" => Ok(SyncType::LookupsOnly),
            "prices_only" => Ok(SyncType::PricesOnly),
            _ => Err(anyhow::anyhow!("Invalid sync type: {}", s)),
        }
    }
}

/// Lifecycle status of a run
///
/// Moves forward only: `pending -> running -> completed | failed | cancelled`.
/// A pending run may also go straight to `failed` or `cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Running => "running",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
            SyncStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SyncStatus::Completed | SyncStatus::Failed | SyncStatus::Cancelled
        )
    }

    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(SyncStatus::Pending),
            "running" => Ok(SyncStatus::Running),
            "completed" => Ok(SyncStatus::Completed),
            "failed" => Ok(SyncStatus::Failed),
            "cancelled" => Ok(SyncStatus::Cancelled),
            _ => Err(anyhow::anyhow!("Invalid sync status: {}", s)),
        }
    }
}

/// Advisory marker of the phase a run is in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Lookups,
    Products,
    Prices,
    Finalize,
}

impl SyncPhase {
    pub const ALL: [SyncPhase; 4] = [
        SyncPhase::Lookups,
        SyncPhase::Products,
        SyncPhase::Prices,
        SyncPhase::Finalize,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SyncPhase::Lookups => "lookups",
            SyncPhase::Products => "products",
            SyncPhase::Prices => "prices",
            SyncPhase::Finalize => "finalize",
        }
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncPhase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lookups" => Ok(SyncPhase::Lookups),
            "products" => Ok(SyncPhase::Products),
            "prices" => Ok(SyncPhase::Prices),
            "finalize" => Ok(SyncPhase::Finalize),
            _ => Err(anyhow::anyhow!("Invalid sync phase: {}", s)),
        }
    }
}

/// One persisted sync run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: Uuid,
    pub sync_type: SyncType,
    pub status: SyncStatus,
    pub current_phase: Option<SyncPhase>,
    pub total_records: i64,
    pub processed_records: i64,
    pub inserted_records: i64,
    pub updated_records: i64,
    pub skipped_records: i64,
    /// Product cursor: reference of the last committed product row
    pub last_reference: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncRun {
    /// A fresh pending run
    pub fn pending(sync_type: SyncType, last_reference: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            sync_type,
            status: SyncStatus::Pending,
            current_phase: None,
            total_records: 0,
            processed_records: 0,
            inserted_records: 0,
            updated_records: 0,
            skipped_records: 0,
            last_reference,
            started_at: None,
            completed_at: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Fold a committed unit of work into the counters
    pub fn apply(&mut self, delta: &ProgressDelta) {
        self.processed_records += delta.processed;
        self.inserted_records += delta.inserted;
        self.updated_records += delta.updated;
        self.skipped_records += delta.skipped;
    }
}

/// Row shape of `sync_logs`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SyncRunRecord {
    pub id: Uuid,
    pub sync_type: String,
    pub status: String,
    pub current_phase: Option<String>,
    pub total_records: i64,
    pub processed_records: i64,
    pub inserted_records: i64,
    pub updated_records: i64,
    pub skipped_records: i64,
    pub last_reference: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SyncRunRecord> for SyncRun {
    type Error = SyncError;

    fn try_from(record: SyncRunRecord) -> Result<Self, Self::Error> {
        let id = record.id;
        let corrupt = |e: anyhow::Error| SyncError::Storage(format!("sync_logs {}: {}", id, e));

        Ok(Self {
            id,
            sync_type: record.sync_type.parse().map_err(corrupt)?,
            status: record.status.parse().map_err(corrupt)?,
            current_phase: record
                .current_phase
                .as_deref()
                .map(str::parse)
                .transpose()
                .map_err(corrupt)?,
            total_records: record.total_records,
            processed_records: record.processed_records,
            inserted_records: record.inserted_records,
            updated_records: record.updated_records,
            skipped_records: record.skipped_records,
            last_reference: record.last_reference,
            started_at: record.started_at,
            completed_at: record.completed_at,
            error_message: record.error_message,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

/// Counter increments produced by one committed unit of work
///
/// `processed` includes skipped rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressDelta {
    pub processed: i64,
    pub inserted: i64,
    pub updated: i64,
    pub skipped: i64,
}

impl ProgressDelta {
    pub fn record_inserted(&mut self) {
        self.processed += 1;
        self.inserted += 1;
    }

    pub fn record_updated(&mut self) {
        self.processed += 1;
        self.updated += 1;
    }

    pub fn record_upsert(&mut self, inserted: bool) {
        if inserted {
            self.record_inserted();
        } else {
            self.record_updated();
        }
    }

    pub fn record_skipped(&mut self, count: i64) {
        self.processed += count;
        self.skipped += count;
    }

    pub fn merge(&mut self, other: ProgressDelta) {
        self.processed += other.processed;
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.skipped += other.skipped;
    }

    pub fn is_empty(&self) -> bool {
        *self == ProgressDelta::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_gating() {
        let full: Vec<_> = SyncType::Full.phases().collect();
        assert_eq!(full, SyncPhase::ALL.to_vec());

        let lookups: Vec<_> = SyncType::LookupsOnly.phases().collect();
        assert_eq!(lookups, vec![SyncPhase::Lookups, SyncPhase::Finalize]);

        let prices: Vec<_> = SyncType::PricesOnly.phases().collect();
        assert_eq!(prices, vec![SyncPhase::Prices, SyncPhase::Finalize]);
    }

    #[test]
    fn test_sync_type_parsing_is_closed() {
        assert_eq!("full".parse::<SyncType>().unwrap(), SyncType::Full);
        assert_eq!("prices_only".parse::<SyncType>().unwrap(), SyncType::PricesOnly);
        assert!("FULL".parse::<SyncType>().is_err());
        assert!("products_only".parse::<SyncType>().is_err());
        assert!(serde_json::from_str::<SyncType>("\"everything\"").is_err());
    }

    #[test]
    fn test_status_terminal() {
        assert!(!SyncStatus::Pending.is_terminal());
        assert!(!SyncStatus::Running.is_terminal());
        assert!(SyncStatus::Completed.is_terminal());
        assert!(SyncStatus::Failed.is_terminal());
        assert!(SyncStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_record_conversion_rejects_unknown_status() {
        let run = SyncRun::pending(SyncType::Full, None);
        let record = SyncRunRecord {
            id: run.id,
            sync_type: "full".to_string(),
            status: "paused".to_string(),
            current_phase: None,
            total_records: 0,
            processed_records: 0,
            inserted_records: 0,
            updated_records: 0,
            skipped_records: 0,
            last_reference: None,
            started_at: None,
            completed_at: None,
            error_message: None,
            created_at: run.created_at,
            updated_at: run.updated_at,
        };

        assert!(SyncRun::try_from(record).is_err());
    }

    #[test]
    fn test_progress_delta_counts_skips_as_processed() {
        let mut delta = ProgressDelta::default();
        delta.record_upsert(true);
        delta.record_upsert(false);
        delta.record_skipped(2);

        assert_eq!(delta.processed, 4);
        assert_eq!(delta.inserted, 1);
        assert_eq!(delta.updated, 1);
        assert_eq!(delta.skipped, 2);

        let mut run = SyncRun::pending(SyncType::Full, None);
        run.apply(&delta);
        run.apply(&delta);
        assert_eq!(run.processed_records, 8);
        assert_eq!(run.skipped_records, 4);
    }
}
