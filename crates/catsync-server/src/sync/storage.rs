//! Local catalog storage
//!
//! Every write method commits its rows and the matching progress update for
//! the run in one transaction. Each row is isolated with a savepoint: a row
//! that fails is rolled back, logged, and counted as skipped while the rest of
//! the batch commits. A failure outside a row (begin, savepoint handling,
//! progress update, commit) rolls the whole batch back.

use async_trait::async_trait;
use catsync_common::ean;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::erp::{ErpLookup, ErpPrice, ErpProduct, ErpVariant, LookupKind};
use super::error::{SyncError, SyncResult};
use super::models::ProgressDelta;
use super::recorder::apply_progress;

/// Upper bound on per-row failures logged individually per batch
const MAX_LOGGED_ROW_ERRORS: usize = 5;

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Upsert lookup rows keyed by code; `rejected` rows failed validation upstream
    async fn upsert_lookups(
        &self,
        run_id: Uuid,
        kind: LookupKind,
        rows: &[ErpLookup],
        rejected: i64,
    ) -> SyncResult<ProgressDelta>;

    /// Upsert one page of products and move the run's cursor to `last_reference`
    async fn commit_product_chunk(
        &self,
        run_id: Uuid,
        rows: &[ErpProduct],
        rejected: i64,
        last_reference: &str,
    ) -> SyncResult<ProgressDelta>;

    /// Upsert prices; rows for unknown products are skipped
    async fn upsert_prices(&self, run_id: Uuid, rows: &[ErpPrice], rejected: i64) -> SyncResult<ProgressDelta>;

    /// Assign generated EAN-13 codes to variants without a barcode
    async fn backfill_barcodes(&self) -> SyncResult<u64>;
}

/// Postgres-backed [`CatalogStore`]
#[derive(Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

/// Tracks per-row outcomes for one batch
struct RowTally<'a> {
    label: &'a str,
    delta: ProgressDelta,
    logged: usize,
    suppressed: usize,
}

impl<'a> RowTally<'a> {
    fn new(label: &'a str, rejected: i64) -> Self {
        let mut delta = ProgressDelta::default();
        delta.record_skipped(rejected);
        Self {
            label,
            delta,
            logged: 0,
            suppressed: 0,
        }
    }

    fn skipped(&mut self, reference: &str, error: &SyncError) {
        self.delta.record_skipped(1);
        if self.logged < MAX_LOGGED_ROW_ERRORS {
            warn!(batch = self.label, reference = %reference, error = %error, "Row skipped");
            self.logged += 1;
        } else {
            self.suppressed += 1;
        }
    }

    fn finish(self) -> ProgressDelta {
        if self.suppressed > 0 {
            warn!(
                batch = self.label,
                additional = self.suppressed,
                "Additional skipped rows not shown"
            );
        }
        self.delta
    }
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn savepoint(tx: &mut Transaction<'_, Postgres>) -> SyncResult<()> {
        sqlx::query("SAVEPOINT catalog_row").execute(&mut **tx).await?;
        Ok(())
    }

    /// Release or roll back the row savepoint depending on `outcome`
    async fn settle<T>(
        tx: &mut Transaction<'_, Postgres>,
        outcome: SyncResult<T>,
        reference: &str,
        tally: &mut RowTally<'_>,
    ) -> SyncResult<Option<T>> {
        match outcome {
            Ok(value) => {
                sqlx::query("RELEASE SAVEPOINT catalog_row")
                    .execute(&mut **tx)
                    .await?;
                Ok(Some(value))
            },
            Err(e) => {
                sqlx::query("ROLLBACK TO SAVEPOINT catalog_row")
                    .execute(&mut **tx)
                    .await?;
                tally.skipped(reference, &e);
                Ok(None)
            },
        }
    }

    async fn upsert_lookup_tx(
        tx: &mut Transaction<'_, Postgres>,
        kind: LookupKind,
        row: &ErpLookup,
    ) -> SyncResult<bool> {
        let inserted = sqlx::query_scalar::<_, bool>(&format!(
            r#"
            INSERT INTO {table} (code, name)
            VALUES ($1, $2)
            ON CONFLICT (code) DO UPDATE SET
                name = EXCLUDED.name,
                updated_at = NOW()
            RETURNING (xmax = 0)
            "#,
            table = kind.table()
        ))
        .bind(&row.code)
        .bind(&row.name)
        .fetch_one(&mut **tx)
        .await?;

        Ok(inserted)
    }

    /// Resolve an optional lookup code to its local id; unknown codes reject the row
    async fn lookup_id(
        tx: &mut Transaction<'_, Postgres>,
        kind: LookupKind,
        reference: &str,
        code: Option<&str>,
    ) -> SyncResult<Option<i64>> {
        let Some(code) = code else {
            return Ok(None);
        };

        let id = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT id FROM {} WHERE code = $1",
            kind.table()
        ))
        .bind(code)
        .fetch_optional(&mut **tx)
        .await?;

        match id {
            Some(id) => Ok(Some(id)),
            None => Err(SyncError::invalid_row(
                reference,
                format!("unknown {} code '{}'", kind, code),
            )),
        }
    }

    async fn upsert_product_tx(tx: &mut Transaction<'_, Postgres>, row: &ErpProduct) -> SyncResult<bool> {
        let reference = row.reference.as_str();
        let brand_id = Self::lookup_id(tx, LookupKind::Brand, reference, row.brand_code.as_deref()).await?;
        let category_id =
            Self::lookup_id(tx, LookupKind::Category, reference, row.category_code.as_deref()).await?;
        let collection_id =
            Self::lookup_id(tx, LookupKind::Collection, reference, row.collection_code.as_deref()).await?;
        let supplier_id =
            Self::lookup_id(tx, LookupKind::Supplier, reference, row.supplier_code.as_deref()).await?;

        let (product_id, inserted) = sqlx::query_as::<_, (i64, bool)>(
            r#"
            INSERT INTO products (
                reference, name, description, brand_id, category_id,
                collection_id, supplier_id, active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (reference) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                brand_id = EXCLUDED.brand_id,
                category_id = EXCLUDED.category_id,
                collection_id = EXCLUDED.collection_id,
                supplier_id = EXCLUDED.supplier_id,
                active = EXCLUDED.active,
                updated_at = NOW()
            RETURNING id, (xmax = 0)
            "#,
        )
        .bind(reference)
        .bind(&row.name)
        .bind(&row.description)
        .bind(brand_id)
        .bind(category_id)
        .bind(collection_id)
        .bind(supplier_id)
        .bind(row.active)
        .fetch_one(&mut **tx)
        .await?;

        for variant in &row.variants {
            Self::upsert_variant_tx(tx, product_id, variant).await?;
        }

        Ok(inserted)
    }

    async fn upsert_variant_tx(
        tx: &mut Transaction<'_, Postgres>,
        product_id: i64,
        variant: &ErpVariant,
    ) -> SyncResult<()> {
        let (variant_id, barcode) = sqlx::query_as::<_, (i64, Option<String>)>(
            r#"
            INSERT INTO product_variants (product_id, code, size, color, barcode)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (product_id, code) DO UPDATE SET
                size = EXCLUDED.size,
                color = EXCLUDED.color,
                barcode = COALESCE(EXCLUDED.barcode, product_variants.barcode),
                updated_at = NOW()
            RETURNING id, barcode
            "#,
        )
        .bind(product_id)
        .bind(&variant.code)
        .bind(&variant.size)
        .bind(&variant.color)
        .bind(&variant.barcode)
        .fetch_one(&mut **tx)
        .await?;

        if barcode.is_none() {
            let code = generated_barcode(product_id, variant_id)?;
            sqlx::query("UPDATE product_variants SET barcode = $2 WHERE id = $1")
                .bind(variant_id)
                .bind(&code)
                .execute(&mut **tx)
                .await?;
            debug!(product_id, variant_id, barcode = %code, "Generated barcode");
        }

        Ok(())
    }

    /// Rejects the row when no local product has the reference
    async fn upsert_price_tx(tx: &mut Transaction<'_, Postgres>, row: &ErpPrice) -> SyncResult<bool> {
        let inserted = sqlx::query_scalar::<_, bool>(
            r#"
            INSERT INTO product_prices (product_id, price_cents, promo_price_cents)
            SELECT id, $2, $3 FROM products WHERE reference = $1
            ON CONFLICT (product_id) DO UPDATE SET
                price_cents = EXCLUDED.price_cents,
                promo_price_cents = EXCLUDED.promo_price_cents,
                updated_at = NOW()
            RETURNING (xmax = 0)
            "#,
        )
        .bind(&row.reference)
        .bind(row.price_cents)
        .bind(row.promo_price_cents)
        .fetch_optional(&mut **tx)
        .await?;

        inserted.ok_or_else(|| SyncError::invalid_row(&row.reference, "unknown product reference"))
    }
}

fn generated_barcode(product_id: i64, variant_id: i64) -> SyncResult<String> {
    let product = u64::try_from(product_id)
        .map_err(|_| SyncError::Storage(format!("negative product id {}", product_id)))?;
    let variant = u64::try_from(variant_id)
        .map_err(|_| SyncError::Storage(format!("negative variant id {}", variant_id)))?;
    Ok(ean::generate(product, variant))
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn upsert_lookups(
        &self,
        run_id: Uuid,
        kind: LookupKind,
        rows: &[ErpLookup],
        rejected: i64,
    ) -> SyncResult<ProgressDelta> {
        let mut tx = self.pool.begin().await?;
        let mut tally = RowTally::new(kind.table(), rejected);

        for row in rows {
            Self::savepoint(&mut tx).await?;
            let outcome = Self::upsert_lookup_tx(&mut tx, kind, row).await;
            if let Some(inserted) = Self::settle(&mut tx, outcome, &row.code, &mut tally).await? {
                tally.delta.record_upsert(inserted);
            }
        }

        let delta = tally.finish();
        apply_progress(&mut *tx, run_id, &delta, None).await?;
        tx.commit().await?;

        Ok(delta)
    }

    async fn commit_product_chunk(
        &self,
        run_id: Uuid,
        rows: &[ErpProduct],
        rejected: i64,
        last_reference: &str,
    ) -> SyncResult<ProgressDelta> {
        let mut tx = self.pool.begin().await?;
        let mut tally = RowTally::new("products", rejected);

        for row in rows {
            Self::savepoint(&mut tx).await?;
            let outcome = Self::upsert_product_tx(&mut tx, row).await;
            if let Some(inserted) = Self::settle(&mut tx, outcome, &row.reference, &mut tally).await? {
                tally.delta.record_upsert(inserted);
            }
        }

        let delta = tally.finish();
        apply_progress(&mut *tx, run_id, &delta, Some(last_reference)).await?;
        tx.commit().await?;

        Ok(delta)
    }

    async fn upsert_prices(&self, run_id: Uuid, rows: &[ErpPrice], rejected: i64) -> SyncResult<ProgressDelta> {
        let mut tx = self.pool.begin().await?;
        let mut tally = RowTally::new("prices", rejected);

        for row in rows {
            Self::savepoint(&mut tx).await?;
            let outcome = Self::upsert_price_tx(&mut tx, row).await;
            if let Some(inserted) = Self::settle(&mut tx, outcome, &row.reference, &mut tally).await? {
                tally.delta.record_upsert(inserted);
            }
        }

        let delta = tally.finish();
        apply_progress(&mut *tx, run_id, &delta, None).await?;
        tx.commit().await?;

        Ok(delta)
    }

    async fn backfill_barcodes(&self) -> SyncResult<u64> {
        let mut tx = self.pool.begin().await?;

        let missing = sqlx::query_as::<_, (i64, i64)>(
            "SELECT id, product_id FROM product_variants WHERE barcode IS NULL OR barcode = '' ORDER BY id",
        )
        .fetch_all(&mut *tx)
        .await?;

        for (variant_id, product_id) in &missing {
            let code = generated_barcode(*product_id, *variant_id)?;
            sqlx::query("UPDATE product_variants SET barcode = $2, updated_at = NOW() WHERE id = $1")
                .bind(variant_id)
                .bind(code)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        if !missing.is_empty() {
            info!(count = missing.len(), "Backfilled variant barcodes");
        }
        Ok(missing.len() as u64)
    }
}
