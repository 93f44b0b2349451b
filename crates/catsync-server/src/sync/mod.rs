//! ERP catalog sync pipeline
//!
//! A run mirrors the ERP catalog into the local database in phases:
//!
//! 1. **Lookups**: brands, categories, collections and suppliers
//! 2. **Products**: keyset-paginated chunks, each committed with the run's cursor
//! 3. **Prices**: current price set in batches
//! 4. **Finalize**: generated EAN-13 barcodes for variants still lacking one
//!
//! Runs are recorded in `sync_logs` through [`SyncLogStore`]. Cancellation is
//! cooperative: the orchestrator re-reads the stored status between phases
//! and between chunks. The [`SyncWorker`] executes queued runs under a timeout
//! and fails runs whose task dies.

pub mod chunk;
pub mod erp;
pub mod error;
pub mod lookups;
pub mod models;
pub mod orchestrator;
pub mod prices;
pub mod recorder;
pub mod storage;
pub mod worker;

pub use chunk::{ChunkProcessor, ChunkResult, DEFAULT_PAGE_SIZE};
pub use erp::{ErpLookup, ErpPrice, ErpProduct, ErpSource, ErpVariant, HttpErpSource, LookupKind};
pub use error::{SyncError, SyncResult};
pub use lookups::{normalize_collection_name, LookupSyncer};
pub use models::{ProgressDelta, SyncPhase, SyncRun, SyncStatus, SyncType};
pub use orchestrator::{RunOutcome, SyncOrchestrator};
pub use prices::PriceSyncer;
pub use recorder::{PgSyncLogStore, StopReason, SyncLogRecorder, SyncLogStore};
pub use storage::{CatalogStore, PgCatalogStore};
pub use worker::{SyncJob, SyncQueue, SyncWorker, WorkerHandle, DEFAULT_QUEUE_CAPACITY};
