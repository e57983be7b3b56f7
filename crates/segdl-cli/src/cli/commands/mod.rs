//! CLI command handlers, one per file.

mod get;
mod list;
mod remove;

pub use get::run_get;
pub use list::{run_list, ListFilter};
pub use remove::run_remove;

use anyhow::Result;
use segdl_core::SqliteStore;

/// Open the default record store, marking downloads a previous process
/// left mid-flight as stopped.
async fn open_store() -> Result<SqliteStore> {
    let store = SqliteStore::open_default().await?;
    let recovered = store.recover_interrupted().await?;
    if recovered > 0 {
        tracing::info!(recovered, "marked interrupted downloads as stopped");
    }
    Ok(store)
}
