//! Keyset-paginated product chunks
//!
//! One call fetches at most `page_size` products with a reference strictly
//! greater than the cursor, validates them, and commits the valid rows together
//! with the run's counters and new cursor. The cursor only moves past a chunk
//! that has been committed.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::erp::{ErpProduct, ErpSource, ErpVariant};
use super::error::{SyncError, SyncResult};
use super::models::ProgressDelta;
use super::storage::CatalogStore;

pub const DEFAULT_PAGE_SIZE: usize = 500;

/// Outcome of one chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkResult {
    /// True when the page came back full, so another fetch is needed
    pub has_more: bool,
    /// Reference of the last fetched row; `None` for an empty page
    pub last_reference: Option<String>,
    pub fetched: usize,
    pub delta: ProgressDelta,
}

pub struct ChunkProcessor {
    erp: Arc<dyn ErpSource>,
    catalog: Arc<dyn CatalogStore>,
}

impl ChunkProcessor {
    pub fn new(erp: Arc<dyn ErpSource>, catalog: Arc<dyn CatalogStore>) -> Self {
        Self { erp, catalog }
    }

    #[instrument(skip(self, run_id), fields(sync_run_id = %run_id))]
    pub async fn process_chunk(
        &self,
        run_id: Uuid,
        after: Option<&str>,
        page_size: usize,
    ) -> SyncResult<ChunkResult> {
        if page_size == 0 {
            return Err(SyncError::Storage("page size must be positive".to_string()));
        }

        let rows = self.erp.fetch_products(after, page_size).await?;
        check_page(after, &rows, page_size)?;

        let Some(last_reference) = rows.last().map(|row| row.reference.clone()) else {
            debug!("Empty page, product source exhausted");
            return Ok(ChunkResult {
                has_more: false,
                last_reference: None,
                fetched: 0,
                delta: ProgressDelta::default(),
            });
        };

        let fetched = rows.len();
        let (valid, rejected) = prepare_products(rows);
        let delta = self
            .catalog
            .commit_product_chunk(run_id, &valid, rejected, &last_reference)
            .await?;

        debug!(
            cursor = %last_reference,
            fetched,
            inserted = delta.inserted,
            updated = delta.updated,
            skipped = delta.skipped,
            "Chunk committed"
        );

        Ok(ChunkResult {
            has_more: fetched == page_size,
            last_reference: Some(last_reference),
            fetched,
            delta,
        })
    }
}

/// The page must be no larger than requested and must not repeat the cursor
/// row or any of its own rows, otherwise the cursor could stall.
fn check_page(after: Option<&str>, rows: &[ErpProduct], page_size: usize) -> SyncResult<()> {
    if rows.len() > page_size {
        return Err(SyncError::Erp(format!(
            "requested at most {} products, received {}",
            page_size,
            rows.len()
        )));
    }

    let mut seen: HashSet<&str> = HashSet::with_capacity(rows.len());
    for row in rows {
        let reference = row.reference.as_str();
        if Some(reference) == after {
            return Err(SyncError::Erp(format!(
                "cursor did not advance: page repeats '{}'",
                reference
            )));
        }
        if !seen.insert(reference) {
            return Err(SyncError::Erp(format!(
                "duplicate product reference '{}' in page",
                reference
            )));
        }
    }

    Ok(())
}

/// Split a page into normalized valid rows and a count of rejected ones
fn prepare_products(rows: Vec<ErpProduct>) -> (Vec<ErpProduct>, i64) {
    let mut rejected = 0;
    let mut valid = Vec::with_capacity(rows.len());

    for row in rows {
        match normalize_product(row) {
            Ok(product) => valid.push(product),
            Err(e) => {
                debug!(error = %e, "Product rejected");
                rejected += 1;
            },
        }
    }

    (valid, rejected)
}

fn normalize_product(mut row: ErpProduct) -> SyncResult<ErpProduct> {
    if row.reference.trim().is_empty() {
        return Err(SyncError::invalid_row(&row.reference, "empty reference"));
    }
    row.name = row.name.trim().to_string();
    if row.name.is_empty() {
        return Err(SyncError::invalid_row(&row.reference, "empty name"));
    }

    row.description = non_blank(row.description);
    row.brand_code = non_blank(row.brand_code);
    row.category_code = non_blank(row.category_code);
    row.collection_code = non_blank(row.collection_code);
    row.supplier_code = non_blank(row.supplier_code);

    let mut seen = HashSet::with_capacity(row.variants.len());
    let variants = std::mem::take(&mut row.variants);
    for variant in variants {
        let variant = ErpVariant {
            code: variant.code.trim().to_string(),
            size: non_blank(variant.size),
            color: non_blank(variant.color),
            barcode: non_blank(variant.barcode),
        };
        if variant.code.is_empty() {
            return Err(SyncError::invalid_row(&row.reference, "variant without code"));
        }
        if !seen.insert(variant.code.clone()) {
            return Err(SyncError::invalid_row(
                &row.reference,
                format!("duplicate variant code '{}'", variant.code),
            ));
        }
        row.variants.push(variant);
    }

    Ok(row)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
