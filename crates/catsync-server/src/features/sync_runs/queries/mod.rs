pub mod get_run;
pub mod list_runs;

pub use get_run::{GetSyncRunError, GetSyncRunQuery};
pub use list_runs::{ListSyncRunsQuery, ListSyncRunsResponse};
