//! Test helpers for catalog sync integration tests
//!
//! - [`MemoryStore`]: in-memory `SyncLogStore` + `CatalogStore` with the same
//!   conditional status rules as the Postgres stores
//! - [`FakeErp`]: scripted ERP source that records every product fetch

#![allow(dead_code)]

use async_trait::async_trait;
use catsync_common::ean;
use catsync_server::sync::{
    CatalogStore, ErpLookup, ErpPrice, ErpProduct, ErpSource, ErpVariant, LookupKind, ProgressDelta,
    SyncError, SyncLogStore, SyncPhase, SyncResult, SyncRun, SyncStatus, SyncType,
};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// Fixtures
// ============================================================================

pub fn product_ref(n: usize) -> String {
    format!("REF-{:05}", n)
}

/// `count` products `REF-00001..`, each with one variant and no barcode
pub fn products(count: usize) -> Vec<ErpProduct> {
    (1..=count).map(|n| product(&product_ref(n))).collect()
}

pub fn product(reference: &str) -> ErpProduct {
    ErpProduct {
        reference: reference.to_string(),
        name: format!("Product {}", reference),
        description: None,
        brand_code: None,
        category_code: None,
        collection_code: None,
        supplier_code: None,
        active: true,
        variants: vec![ErpVariant {
            code: "V1".to_string(),
            size: Some("M".to_string()),
            color: None,
            barcode: None,
        }],
    }
}

pub fn lookup(code: &str, name: &str) -> ErpLookup {
    ErpLookup {
        code: code.to_string(),
        name: name.to_string(),
    }
}

pub fn price(reference: &str, cents: i64) -> ErpPrice {
    ErpPrice {
        reference: reference.to_string(),
        price_cents: cents,
        promo_price_cents: None,
    }
}

// ============================================================================
// In-memory stores
// ============================================================================

#[derive(Debug, Clone)]
pub struct StoredVariant {
    pub id: i64,
    pub code: String,
    pub barcode: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StoredProduct {
    pub id: i64,
    pub name: String,
    pub variants: Vec<StoredVariant>,
}

#[derive(Default)]
struct Inner {
    runs: HashMap<Uuid, SyncRun>,
    created: Vec<Uuid>,
    lookups: HashMap<(LookupKind, String), String>,
    products: BTreeMap<String, StoredProduct>,
    prices: HashMap<String, (i64, Option<i64>)>,
    next_id: i64,
    fail_next_commit: bool,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn apply(&mut self, run_id: Uuid, delta: &ProgressDelta, cursor: Option<&str>) {
        if let Some(run) = self.runs.get_mut(&run_id) {
            run.apply(delta);
            if let Some(cursor) = cursor {
                run.last_reference = Some(cursor.to_string());
            }
            run.updated_at = Utc::now();
        }
    }

    fn finish(&mut self, id: Uuid, from: &[SyncStatus], to: SyncStatus, message: Option<String>) -> bool {
        match self.runs.get_mut(&id) {
            Some(run) if from.contains(&run.status) => {
                run.status = to;
                run.completed_at = Some(Utc::now());
                run.updated_at = Utc::now();
                if message.is_some() {
                    run.error_message = message;
                }
                true
            },
            _ => false,
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn run(&self, id: Uuid) -> SyncRun {
        self.lock().runs.get(&id).cloned().expect("run exists")
    }

    /// Flip a run to cancelled the way the cancel endpoint does, from sync code
    pub fn force_cancel(&self, id: Uuid) -> bool {
        self.lock().finish(
            id,
            &[SyncStatus::Pending, SyncStatus::Running],
            SyncStatus::Cancelled,
            None,
        )
    }

    /// Pretend the run's last write happened `age` ago
    pub fn backdate(&self, id: Uuid, age: Duration) {
        if let Some(run) = self.lock().runs.get_mut(&id) {
            run.updated_at = Utc::now() - chrono::Duration::from_std(age).unwrap();
        }
    }

    /// Make the next product chunk commit fail without writing anything
    pub fn fail_next_commit(&self) {
        self.lock().fail_next_commit = true;
    }

    pub fn product(&self, reference: &str) -> Option<StoredProduct> {
        self.lock().products.get(reference).cloned()
    }

    pub fn product_count(&self) -> usize {
        self.lock().products.len()
    }

    pub fn price(&self, reference: &str) -> Option<i64> {
        self.lock().prices.get(reference).map(|(cents, _)| *cents)
    }

    pub fn lookup_name(&self, kind: LookupKind, code: &str) -> Option<String> {
        self.lock().lookups.get(&(kind, code.to_string())).cloned()
    }

    /// A local product whose variants predate barcode generation
    pub fn seed_product_without_barcodes(&self, reference: &str, variants: usize) {
        let mut inner = self.lock();
        let id = inner.next_id();
        let variants = (1..=variants)
            .map(|n| StoredVariant {
                id: inner.next_id(),
                code: format!("V{}", n),
                barcode: None,
            })
            .collect();
        inner.products.insert(
            reference.to_string(),
            StoredProduct {
                id,
                name: reference.to_string(),
                variants,
            },
        );
    }

    pub fn all_barcodes(&self) -> Vec<Option<String>> {
        self.lock()
            .products
            .values()
            .flat_map(|p| p.variants.iter().map(|v| v.barcode.clone()))
            .collect()
    }

    fn upsert_product(inner: &mut Inner, row: &ErpProduct) -> SyncResult<bool> {
        let codes = [
            (LookupKind::Brand, &row.brand_code),
            (LookupKind::Category, &row.category_code),
            (LookupKind::Collection, &row.collection_code),
            (LookupKind::Supplier, &row.supplier_code),
        ];
        for (kind, code) in codes {
            if let Some(code) = code {
                if !inner.lookups.contains_key(&(kind, code.clone())) {
                    return Err(SyncError::invalid_row(
                        &row.reference,
                        format!("unknown {} code '{}'", kind, code),
                    ));
                }
            }
        }

        let inserted = !inner.products.contains_key(&row.reference);
        if inserted {
            let id = inner.next_id();
            inner.products.insert(
                row.reference.clone(),
                StoredProduct {
                    id,
                    name: row.name.clone(),
                    variants: vec![],
                },
            );
        }

        let mut fresh_ids = Vec::new();
        for variant in &row.variants {
            let exists = inner
                .products
                .get(&row.reference)
                .map(|p| p.variants.iter().any(|v| v.code == variant.code))
                .unwrap_or(false);
            if !exists {
                fresh_ids.push(inner.next_id());
            } else {
                fresh_ids.push(0);
            }
        }

        let product = inner.products.get_mut(&row.reference).expect("product inserted");
        product.name = row.name.clone();
        for (variant, fresh_id) in row.variants.iter().zip(fresh_ids) {
            let product_id = product.id;
            match product.variants.iter_mut().find(|v| v.code == variant.code) {
                Some(existing) => {
                    if variant.barcode.is_some() {
                        existing.barcode = variant.barcode.clone();
                    }
                },
                None => {
                    let barcode = variant
                        .barcode
                        .clone()
                        .unwrap_or_else(|| ean::generate(product_id as u64, fresh_id as u64));
                    product.variants.push(StoredVariant {
                        id: fresh_id,
                        code: variant.code.clone(),
                        barcode: Some(barcode),
                    });
                },
            }
        }

        Ok(inserted)
    }
}

#[async_trait]
impl SyncLogStore for MemoryStore {
    async fn create(&self, sync_type: SyncType, last_reference: Option<String>) -> SyncResult<SyncRun> {
        let mut inner = self.lock();
        if inner.runs.values().any(|run| run.status.is_active()) {
            return Err(SyncError::Conflict);
        }
        let run = SyncRun::pending(sync_type, last_reference);
        inner.created.push(run.id);
        inner.runs.insert(run.id, run.clone());
        Ok(run)
    }

    async fn get(&self, id: Uuid) -> SyncResult<Option<SyncRun>> {
        Ok(self.lock().runs.get(&id).cloned())
    }

    async fn list(&self, status: Option<SyncStatus>, limit: i64) -> SyncResult<Vec<SyncRun>> {
        let inner = self.lock();
        Ok(inner
            .created
            .iter()
            .rev()
            .filter_map(|id| inner.runs.get(id))
            .filter(|run| status.map_or(true, |s| run.status == s))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn status(&self, id: Uuid) -> SyncResult<Option<SyncStatus>> {
        Ok(self.lock().runs.get(&id).map(|run| run.status))
    }

    async fn start(&self, id: Uuid) -> SyncResult<bool> {
        let mut inner = self.lock();
        match inner.runs.get_mut(&id) {
            Some(run) if run.status == SyncStatus::Pending => {
                run.status = SyncStatus::Running;
                run.started_at = Some(Utc::now());
                run.updated_at = Utc::now();
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn set_phase(&self, id: Uuid, phase: SyncPhase) -> SyncResult<()> {
        if let Some(run) = self.lock().runs.get_mut(&id) {
            run.current_phase = Some(phase);
            run.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn add_total(&self, id: Uuid, count: i64) -> SyncResult<()> {
        if let Some(run) = self.lock().runs.get_mut(&id) {
            run.total_records += count;
            run.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn complete(&self, id: Uuid, summary: Option<String>) -> SyncResult<bool> {
        Ok(self
            .lock()
            .finish(id, &[SyncStatus::Running], SyncStatus::Completed, summary))
    }

    async fn fail(&self, id: Uuid, message: &str) -> SyncResult<bool> {
        Ok(self.lock().finish(
            id,
            &[SyncStatus::Pending, SyncStatus::Running],
            SyncStatus::Failed,
            Some(message.to_string()),
        ))
    }

    async fn cancel(&self, id: Uuid) -> SyncResult<bool> {
        Ok(self.force_cancel(id))
    }

    async fn fail_interrupted(&self, message: &str, stale_after: Duration) -> SyncResult<u64> {
        let cutoff = Utc::now() - chrono::Duration::from_std(stale_after).unwrap();
        let mut inner = self.lock();
        let stale: Vec<Uuid> = inner
            .runs
            .values()
            .filter(|run| run.status.is_active() && run.updated_at < cutoff)
            .map(|run| run.id)
            .collect();
        for id in &stale {
            inner.finish(
                *id,
                &[SyncStatus::Pending, SyncStatus::Running],
                SyncStatus::Failed,
                Some(message.to_string()),
            );
        }
        Ok(stale.len() as u64)
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn upsert_lookups(
        &self,
        run_id: Uuid,
        kind: LookupKind,
        rows: &[ErpLookup],
        rejected: i64,
    ) -> SyncResult<ProgressDelta> {
        let mut inner = self.lock();
        let mut delta = ProgressDelta::default();
        delta.record_skipped(rejected);

        for row in rows {
            let previous = inner.lookups.insert((kind, row.code.clone()), row.name.clone());
            delta.record_upsert(previous.is_none());
        }

        inner.apply(run_id, &delta, None);
        Ok(delta)
    }

    async fn commit_product_chunk(
        &self,
        run_id: Uuid,
        rows: &[ErpProduct],
        rejected: i64,
        last_reference: &str,
    ) -> SyncResult<ProgressDelta> {
        let mut inner = self.lock();
        if std::mem::take(&mut inner.fail_next_commit) {
            return Err(SyncError::Storage("injected commit failure".to_string()));
        }

        let mut delta = ProgressDelta::default();
        delta.record_skipped(rejected);

        for row in rows {
            match Self::upsert_product(&mut inner, row) {
                Ok(inserted) => delta.record_upsert(inserted),
                Err(_) => delta.record_skipped(1),
            }
        }

        inner.apply(run_id, &delta, Some(last_reference));
        Ok(delta)
    }

    async fn upsert_prices(&self, run_id: Uuid, rows: &[ErpPrice], rejected: i64) -> SyncResult<ProgressDelta> {
        let mut inner = self.lock();
        let mut delta = ProgressDelta::default();
        delta.record_skipped(rejected);

        for row in rows {
            if !inner.products.contains_key(&row.reference) {
                delta.record_skipped(1);
                continue;
            }
            let previous = inner
                .prices
                .insert(row.reference.clone(), (row.price_cents, row.promo_price_cents));
            delta.record_upsert(previous.is_none());
        }

        inner.apply(run_id, &delta, None);
        Ok(delta)
    }

    async fn backfill_barcodes(&self) -> SyncResult<u64> {
        let mut inner = self.lock();
        let mut filled = 0;
        for product in inner.products.values_mut() {
            let product_id = product.id;
            for variant in product.variants.iter_mut().filter(|v| v.barcode.is_none()) {
                variant.barcode = Some(ean::generate(product_id as u64, variant.id as u64));
                filled += 1;
            }
        }
        Ok(filled)
    }
}

// ============================================================================
// Fake ERP
// ============================================================================

type FetchHook = Box<dyn Fn(usize) + Send + Sync>;

/// Scripted ERP source; products are served in reference order
#[derive(Default)]
pub struct FakeErp {
    products: Vec<ErpProduct>,
    lookups: HashMap<LookupKind, Vec<ErpLookup>>,
    prices: Vec<ErpPrice>,
    fetches: Mutex<Vec<Option<String>>>,
    on_fetch: Option<FetchHook>,
    fail_at_fetch: Option<usize>,
    panic_on_fetch: bool,
    fetch_delay: Option<Duration>,
}

impl FakeErp {
    pub fn with_products(products: Vec<ErpProduct>) -> Self {
        let mut products = products;
        products.sort_by(|a, b| a.reference.cmp(&b.reference));
        Self {
            products,
            ..Self::default()
        }
    }

    pub fn lookups(mut self, kind: LookupKind, rows: Vec<ErpLookup>) -> Self {
        self.lookups.insert(kind, rows);
        self
    }

    pub fn prices(mut self, rows: Vec<ErpPrice>) -> Self {
        self.prices = rows;
        self
    }

    /// Called with the zero-based fetch number before each product page is served
    pub fn on_fetch(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_fetch = Some(Box::new(hook));
        self
    }

    /// Fail the product fetch with the given zero-based number
    pub fn failing_at(mut self, fetch: usize) -> Self {
        self.fail_at_fetch = Some(fetch);
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic_on_fetch = true;
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    /// The `after` cursor of every product fetch, in order
    pub fn fetches(&self) -> Vec<Option<String>> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ErpSource for FakeErp {
    async fn fetch_lookups(&self, kind: LookupKind) -> SyncResult<Vec<ErpLookup>> {
        Ok(self.lookups.get(&kind).cloned().unwrap_or_default())
    }

    async fn count_products(&self, after: Option<&str>) -> SyncResult<i64> {
        Ok(self
            .products
            .iter()
            .filter(|p| after.map_or(true, |after| p.reference.as_str() > after))
            .count() as i64)
    }

    async fn fetch_products(&self, after: Option<&str>, limit: usize) -> SyncResult<Vec<ErpProduct>> {
        let index = {
            let mut fetches = self.fetches.lock().unwrap();
            fetches.push(after.map(str::to_string));
            fetches.len() - 1
        };

        if let Some(hook) = &self.on_fetch {
            hook(index);
        }
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic_on_fetch {
            panic!("ERP client crashed");
        }
        if self.fail_at_fetch == Some(index) {
            return Err(SyncError::Erp("connection reset by peer".to_string()));
        }

        Ok(self
            .products
            .iter()
            .filter(|p| after.map_or(true, |after| p.reference.as_str() > after))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn fetch_prices(&self) -> SyncResult<Vec<ErpPrice>> {
        Ok(self.prices.clone())
    }
}
