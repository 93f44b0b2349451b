//! Error types shared across the workspace

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CatsyncError>;

/// Main error type for shared utilities
#[derive(Error, Debug)]
pub enum CatsyncError {
    #[error("Invalid barcode input: {0}")]
    InvalidBarcode(String),
}
