//! Record and status types shared by the scheduler, tasks and stores.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::ErrorCode;
use crate::storage;

/// Lifecycle status of a download, stored as a string in the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    /// Queued, waiting for a permit.
    Wait,
    Running,
    /// Pause requested; the worker is winding down.
    Pausing,
    /// Paused; resume reuses the original request.
    Paused,
    /// Stopped; resume rebuilds the request from url and path.
    Stopped,
    Finished,
    Failed,
}

impl DownloadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DownloadStatus::Wait => "wait",
            DownloadStatus::Running => "running",
            DownloadStatus::Pausing => "pausing",
            DownloadStatus::Paused => "paused",
            DownloadStatus::Stopped => "stopped",
            DownloadStatus::Finished => "finished",
            DownloadStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "wait" => DownloadStatus::Wait,
            "running" => DownloadStatus::Running,
            "pausing" => DownloadStatus::Pausing,
            "paused" => DownloadStatus::Paused,
            "stopped" => DownloadStatus::Stopped,
            "finished" => DownloadStatus::Finished,
            _ => DownloadStatus::Failed,
        }
    }

    /// True once no worker will touch the record again for this run.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DownloadStatus::Paused
                | DownloadStatus::Stopped
                | DownloadStatus::Finished
                | DownloadStatus::Failed
        )
    }
}

/// Persisted, observable state of one download. One live record per url.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub url: String,
    /// Destination of the final artifact.
    pub path: PathBuf,
    pub tag: Option<String>,
    /// Total size of the remote resource; `None` until probed or if the
    /// server never reports it.
    pub content_length: Option<u64>,
    pub completed_size: u64,
    pub status: DownloadStatus,
    pub error_code: ErrorCode,
    /// Unix seconds.
    pub created_at: i64,
    pub finished: bool,
    /// Directory holding segment files while a segmented fetch is in progress.
    pub temp_dir: PathBuf,
}

impl DownloadRecord {
    pub fn new(url: impl Into<String>, path: impl Into<PathBuf>, tag: Option<String>) -> Self {
        let path = path.into();
        let temp_dir = storage::temp_dir_for(&path);
        Self {
            url: url.into(),
            path,
            tag,
            content_length: None,
            completed_size: 0,
            status: DownloadStatus::Stopped,
            error_code: ErrorCode::None,
            created_at: unix_timestamp(),
            finished: false,
            temp_dir,
        }
    }

    /// Integer percentage, `None` while the content length is unknown or zero.
    pub fn percent(&self) -> Option<u8> {
        match self.content_length {
            Some(total) if total > 0 => {
                Some((self.completed_size.min(total) * 100 / total) as u8)
            }
            _ => None,
        }
    }
}

/// HTTP cache metadata captured by the probe stage and saved on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub url: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// Current time as Unix seconds.
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
