//! Persistent record store seam.
//!
//! The engine keeps live records in memory and writes through to a
//! [`RecordStore`] on every terminal transition. Two implementations ship:
//! [`MemoryStore`] (default, and used by tests) and [`SqliteStore`].

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

use crate::record::{CacheEntry, DownloadRecord};

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Record for `url`, if one was persisted.
    async fn get(&self, url: &str) -> Result<Option<DownloadRecord>>;

    /// Insert or replace the record keyed by its url.
    async fn upsert(&self, record: &DownloadRecord) -> Result<()>;

    /// Save HTTP cache metadata for a finished download.
    async fn update_cache(&self, entry: &CacheEntry) -> Result<()>;

    async fn cache(&self, url: &str) -> Result<Option<CacheEntry>>;

    /// Remove the record for `url` and any record pointing at `path`,
    /// together with cached metadata for `url`.
    async fn delete(&self, url: &str, path: &Path) -> Result<()>;

    /// All records, newest first.
    async fn list(&self) -> Result<Vec<DownloadRecord>>;

    async fn list_by_tag(&self, tag: &str) -> Result<Vec<DownloadRecord>>;

    /// Release resources. Further calls may fail.
    async fn close(&self) -> Result<()>;
}
