//! Catalog Sync Server Library
//!
//! Mirrors an ERP product catalog (lookup tables, products with variants,
//! prices) into a local PostgreSQL database.
//!
//! # Overview
//!
//! - **Sync pipeline** ([`sync`]): phased runs with keyset-paginated product
//!   chunks, cooperative cancellation and a persisted resume cursor
//! - **Worker** ([`sync::SyncWorker`]): executes queued runs one at a time under
//!   a timeout and fails runs whose task dies
//! - **API** ([`features`]): trigger, cancel and monitor runs; EAN-13 helpers
//! - **Configuration** ([`config`]): environment-based settings
//!
//! # Example
//!
//! ```no_run
//! use catsync_server::{config::Config, db};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let pool = db::create_pool(&config.database).await?;
//!     db::run_migrations(&pool).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod middleware;
pub mod sync;

// Re-export commonly used types
pub use error::AppError;
