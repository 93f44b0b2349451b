//! Lookup table mirroring
//!
//! Brands, categories, collections and suppliers are small enough to be read
//! as a whole set per run. They are mirrored before products so product rows
//! can resolve their codes.

use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::info;

use super::erp::{ErpLookup, ErpSource, LookupKind};
use super::error::SyncResult;
use super::models::ProgressDelta;
use super::recorder::SyncLogRecorder;
use super::storage::CatalogStore;

static LEADING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+[\s-]+").expect("leading number pattern"));
static TRAILING_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\d+\s*$").expect("trailing year pattern"));

/// Normalize an ERP collection display name
///
/// Strips a leading numeric code with its dash/space separator and a trailing
/// `/digits` suffix, then trims and uppercases:
/// `"001 - VERAO/2025"` becomes `"VERAO"`.
pub fn normalize_collection_name(raw: &str) -> String {
    let without_prefix = LEADING_NUMBER.replace(raw, "");
    let without_suffix = TRAILING_YEAR.replace(&without_prefix, "");
    without_suffix.trim().to_uppercase()
}

pub struct LookupSyncer {
    erp: Arc<dyn ErpSource>,
    catalog: Arc<dyn CatalogStore>,
}

impl LookupSyncer {
    pub fn new(erp: Arc<dyn ErpSource>, catalog: Arc<dyn CatalogStore>) -> Self {
        Self { erp, catalog }
    }

    /// Mirror every lookup table
    pub async fn sync_all(&self, recorder: &SyncLogRecorder) -> SyncResult<ProgressDelta> {
        let mut total = ProgressDelta::default();
        for kind in LookupKind::ALL {
            total.merge(self.sync_kind(recorder, kind).await?);
        }
        Ok(total)
    }

    async fn sync_kind(&self, recorder: &SyncLogRecorder, kind: LookupKind) -> SyncResult<ProgressDelta> {
        let fetched = self.erp.fetch_lookups(kind).await?;
        recorder.add_total(fetched.len() as i64).await?;

        let (rows, rejected) = prepare_lookups(kind, fetched);
        let delta = self
            .catalog
            .upsert_lookups(recorder.run_id(), kind, &rows, rejected)
            .await?;

        info!(
            sync_run_id = %recorder.run_id(),
            table = %kind,
            inserted = delta.inserted,
            updated = delta.updated,
            skipped = delta.skipped,
            "Lookup table synced"
        );
        Ok(delta)
    }
}

/// Trim codes, normalize collection names, drop rows without a code
fn prepare_lookups(kind: LookupKind, fetched: Vec<ErpLookup>) -> (Vec<ErpLookup>, i64) {
    let mut rejected = 0;
    let rows = fetched
        .into_iter()
        .filter_map(|row| {
            let code = row.code.trim();
            if code.is_empty() {
                rejected += 1;
                return None;
            }
            let name = match kind {
                LookupKind::Collection => normalize_collection_name(&row.name),
                _ => row.name.trim().to_string(),
            };
            Some(ErpLookup {
                code: code.to_string(),
                name,
            })
        })
        .collect();

    (rows, rejected)
}
