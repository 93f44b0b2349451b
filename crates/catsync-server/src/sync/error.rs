//! Sync pipeline errors

use thiserror::Error;
use uuid::Uuid;

pub type SyncResult<T> = std::result::Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    /// The ERP could not be reached or returned an unusable response
    #[error("ERP request failed: {0}")]
    Erp(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Sync run {0} not found")]
    NotFound(Uuid),

    /// Another run is already pending or running
    #[error("Another sync run is already active")]
    Conflict,

    #[error("Invalid row '{reference}': {reason}")]
    InvalidRow { reference: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl SyncError {
    pub fn invalid_row(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRow {
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    /// ERP fetch failures may succeed on a later run
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Erp(_))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        match err.url() {
            Some(url) => SyncError::Erp(format!("{} ({})", err, url.path())),
            None => SyncError::Erp(err.to_string()),
        }
    }
}
