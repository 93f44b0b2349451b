//! Price mirroring
//!
//! Prices are read as the current set and written in batches of the configured
//! page size, each batch committed with its progress.

use std::sync::Arc;
use tracing::info;

use super::erp::{ErpPrice, ErpSource};
use super::error::SyncResult;
use super::models::ProgressDelta;
use super::recorder::SyncLogRecorder;
use super::storage::CatalogStore;

pub struct PriceSyncer {
    erp: Arc<dyn ErpSource>,
    catalog: Arc<dyn CatalogStore>,
    batch_size: usize,
}

impl PriceSyncer {
    pub fn new(erp: Arc<dyn ErpSource>, catalog: Arc<dyn CatalogStore>, batch_size: usize) -> Self {
        Self {
            erp,
            catalog,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn sync(&self, recorder: &SyncLogRecorder) -> SyncResult<ProgressDelta> {
        let fetched = self.erp.fetch_prices().await?;
        recorder.add_total(fetched.len() as i64).await?;

        let (rows, rejected) = prepare_prices(fetched);
        let mut total = ProgressDelta::default();

        if rows.is_empty() {
            if rejected > 0 {
                total = self
                    .catalog
                    .upsert_prices(recorder.run_id(), &[], rejected)
                    .await?;
            }
        } else {
            // Rejected rows are counted with the first batch
            let mut pending_rejected = rejected;
            for batch in rows.chunks(self.batch_size) {
                let delta = self
                    .catalog
                    .upsert_prices(recorder.run_id(), batch, pending_rejected)
                    .await?;
                pending_rejected = 0;
                total.merge(delta);
            }
        }

        info!(
            sync_run_id = %recorder.run_id(),
            inserted = total.inserted,
            updated = total.updated,
            skipped = total.skipped,
            "Prices synced"
        );
        Ok(total)
    }
}

fn prepare_prices(fetched: Vec<ErpPrice>) -> (Vec<ErpPrice>, i64) {
    let mut rejected = 0;
    let rows = fetched
        .into_iter()
        .filter(|row| {
            let valid = !row.reference.trim().is_empty()
                && row.price_cents >= 0
                && row.promo_price_cents.map_or(true, |promo| promo >= 0);
            if !valid {
                rejected += 1;
            }
            valid
        })
        .collect();

    (rows, rejected)
}
