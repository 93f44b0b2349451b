//! Catsync Common Library
//!
//! Shared types, utilities, and error handling for the catalog sync workspace.
//!
//! # Overview
//!
//! - **Error Handling**: `CatsyncError` and the `Result` alias
//! - **Logging**: tracing subscriber setup shared by every binary
//! - **EAN-13**: deterministic barcode generation and validation for
//!   internally issued codes
//!
//! # Example
//!
//! ```
//! use catsync_common::ean;
//!
//! let code = ean::generate(42, 7);
//! assert!(ean::is_valid(&code));
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod ean;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{CatsyncError, Result};
