//! Download requests, persisted records and their status.
//!
//! A request is the caller's template for a download; a record is the
//! observable state that survives restarts through the record store.

mod request;
mod types;

pub use request::{DownloadRequest, DEFAULT_SEGMENT_COUNT};
pub use types::{unix_timestamp, CacheEntry, DownloadRecord, DownloadStatus};
