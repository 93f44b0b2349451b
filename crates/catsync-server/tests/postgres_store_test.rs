//! Postgres store tests
//!
//! Need a database: `DATABASE_URL=postgres://... cargo test -- --ignored`

mod helpers;

use catsync_common::ean;
use catsync_server::sync::{
    CatalogStore, LookupKind, PgCatalogStore, PgSyncLogStore, SyncError, SyncLogStore, SyncResult,
    SyncStatus, SyncType,
};
use helpers::{lookup, price, product, products};
use sqlx::PgPool;
use std::time::Duration;

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_single_active_run(pool: PgPool) -> SyncResult<()> {
    let store = PgSyncLogStore::new(pool);

    let first = store.create(SyncType::Full, None).await?;
    let second = store.create(SyncType::PricesOnly, None).await;
    assert!(matches!(second, Err(SyncError::Conflict)));

    assert!(store.cancel(first.id).await?);
    let next = store.create(SyncType::PricesOnly, None).await?;
    assert_eq!(next.status, SyncStatus::Pending);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_conditional_transitions(pool: PgPool) -> SyncResult<()> {
    let store = PgSyncLogStore::new(pool);
    let run = store.create(SyncType::Full, None).await?;

    assert!(!store.complete(run.id, None).await?);
    assert!(store.start(run.id).await?);
    assert!(!store.start(run.id).await?);
    assert!(store.cancel(run.id).await?);

    // Terminal states are final
    assert!(!store.fail(run.id, "late failure").await?);
    assert!(!store.complete(run.id, None).await?);
    assert!(!store.cancel(run.id).await?);

    let stored = store.get(run.id).await?.unwrap();
    assert_eq!(stored.status, SyncStatus::Cancelled);
    assert!(stored.error_message.is_none());
    assert!(stored.completed_at.is_some());

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_fail_interrupted_and_list(pool: PgPool) -> SyncResult<()> {
    let store = PgSyncLogStore::new(pool.clone());
    let run = store.create(SyncType::Full, None).await?;
    store.start(run.id).await?;
    let stale_after = Duration::from_secs(60);

    // Freshly written runs belong to a live worker
    assert_eq!(store.fail_interrupted("Interrupted by worker restart", stale_after).await?, 0);
    assert_eq!(store.get(run.id).await?.unwrap().status, SyncStatus::Running);

    sqlx::query("UPDATE sync_logs SET updated_at = NOW() - INTERVAL '5 minutes' WHERE id = $1")
        .bind(run.id)
        .execute(&pool)
        .await?;

    assert_eq!(store.fail_interrupted("Interrupted by worker restart", stale_after).await?, 1);
    assert_eq!(store.fail_interrupted("Interrupted by worker restart", stale_after).await?, 0);

    let failed = store.list(Some(SyncStatus::Failed), 10).await?;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].error_message.as_deref(), Some("Interrupted by worker restart"));
    assert!(store.list(Some(SyncStatus::Running), 10).await?.is_empty());

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_product_chunk_insert_then_update(pool: PgPool) -> SyncResult<()> {
    let runs = PgSyncLogStore::new(pool.clone());
    let catalog = PgCatalogStore::new(pool.clone());
    let run = runs.create(SyncType::Full, None).await?;
    runs.start(run.id).await?;

    let page = products(3);
    let first = catalog.commit_product_chunk(run.id, &page, 0, "REF-00003").await?;
    assert_eq!(first.inserted, 3);
    assert_eq!(first.updated, 0);

    let second = catalog.commit_product_chunk(run.id, &page, 1, "REF-00003").await?;
    assert_eq!(second.inserted, 0);
    assert_eq!(second.updated, 3);
    assert_eq!(second.skipped, 1);

    let stored = runs.get(run.id).await?.unwrap();
    assert_eq!(stored.last_reference.as_deref(), Some("REF-00003"));
    assert_eq!(stored.processed_records, 7);
    assert_eq!(stored.skipped_records, 1);

    let variants: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM product_variants")
        .fetch_one(&pool)
        .await?;
    assert_eq!(variants, 3);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_unknown_lookup_code_skips_only_that_row(pool: PgPool) -> SyncResult<()> {
    let runs = PgSyncLogStore::new(pool.clone());
    let catalog = PgCatalogStore::new(pool.clone());
    let run = runs.create(SyncType::Full, None).await?;
    runs.start(run.id).await?;

    catalog
        .upsert_lookups(run.id, LookupKind::Brand, &[lookup("B1", "Acme")], 0)
        .await?;

    let mut known = product("REF-A");
    known.brand_code = Some("B1".to_string());
    let mut unknown = product("REF-B");
    unknown.brand_code = Some("B404".to_string());

    let delta = catalog
        .commit_product_chunk(run.id, &[known, unknown], 0, "REF-B")
        .await?;
    assert_eq!(delta.inserted, 1);
    assert_eq!(delta.skipped, 1);

    let references: Vec<String> = sqlx::query_scalar("SELECT reference FROM products ORDER BY reference")
        .fetch_all(&pool)
        .await?;
    assert_eq!(references, vec!["REF-A".to_string()]);

    // Cursor moves past the rejected row
    let stored = runs.get(run.id).await?.unwrap();
    assert_eq!(stored.last_reference.as_deref(), Some("REF-B"));

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_generated_and_given_barcodes(pool: PgPool) -> SyncResult<()> {
    let runs = PgSyncLogStore::new(pool.clone());
    let catalog = PgCatalogStore::new(pool.clone());
    let run = runs.create(SyncType::Full, None).await?;
    runs.start(run.id).await?;

    let mut given = product("REF-A");
    given.variants[0].barcode = Some("4006381333931".to_string());
    let generated = product("REF-B");

    catalog
        .commit_product_chunk(run.id, &[given, generated], 0, "REF-B")
        .await?;

    let rows: Vec<(String, i64, i64, Option<String>)> = sqlx::query_as(
        r#"
        SELECT p.reference, p.id, v.id, v.barcode
        FROM product_variants v
        JOIN products p ON p.id = v.product_id
        ORDER BY p.reference
        "#,
    )
    .fetch_all(&pool)
    .await?;

    assert_eq!(rows[0].3.as_deref(), Some("4006381333931"));
    let (_, product_id, variant_id, barcode) = &rows[1];
    let expected = ean::generate(*product_id as u64, *variant_id as u64);
    assert_eq!(barcode.as_deref(), Some(expected.as_str()));
    assert!(ean::is_valid(&expected));

    // Backfill finds nothing left to do
    assert_eq!(catalog.backfill_barcodes().await?, 0);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_prices_for_unknown_products_are_skipped(pool: PgPool) -> SyncResult<()> {
    let runs = PgSyncLogStore::new(pool.clone());
    let catalog = PgCatalogStore::new(pool.clone());
    let run = runs.create(SyncType::Full, None).await?;
    runs.start(run.id).await?;

    catalog
        .commit_product_chunk(run.id, &products(1), 0, "REF-00001")
        .await?;

    let delta = catalog
        .upsert_prices(run.id, &[price("REF-00001", 1999), price("REF-99999", 500)], 0)
        .await?;
    assert_eq!(delta.inserted, 1);
    assert_eq!(delta.skipped, 1);

    let again = catalog.upsert_prices(run.id, &[price("REF-00001", 2499)], 0).await?;
    assert_eq!(again.updated, 1);

    let cents: i64 = sqlx::query_scalar(
        "SELECT price_cents FROM product_prices pp JOIN products p ON p.id = pp.product_id WHERE p.reference = $1",
    )
    .bind("REF-00001")
    .fetch_one(&pool)
    .await?;
    assert_eq!(cents, 2499);

    Ok(())
}
