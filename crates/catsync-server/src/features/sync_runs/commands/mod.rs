pub mod cancel;
pub mod trigger;

pub use cancel::{CancelSyncCommand, CancelSyncError};
pub use trigger::{TriggerSyncCommand, TriggerSyncError};
