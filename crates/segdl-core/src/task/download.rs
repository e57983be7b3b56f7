//! The per-download lock and the state it guards.

use tokio::sync::{Mutex, MutexGuard};

use super::speed::ThroughputMonitor;
use super::ProgressEvent;
use crate::error::ErrorCode;
use crate::record::{CacheEntry, DownloadRecord, DownloadRequest, DownloadStatus};

/// One download known to the engine. Every mutation of its record goes
/// through `state`; no code holds two downloads' locks at once.
#[derive(Debug)]
pub struct Download {
    url: String,
    state: Mutex<DownloadState>,
}

#[derive(Debug)]
pub struct DownloadState {
    pub record: DownloadRecord,
    /// Request bound by the last submit; cleared by stop.
    pub request: Option<DownloadRequest>,
    /// Whether the server honoured range requests at the last probe.
    pub supports_range: bool,
    /// Validators captured by the probe, saved when the download finishes.
    pub cache: Option<CacheEntry>,
    pub speed: Option<ThroughputMonitor>,
    /// Percentage of the last progress event.
    pub last_percent: Option<u8>,
}

impl Download {
    pub fn new(record: DownloadRecord) -> Self {
        let last_percent = record.percent();
        Self {
            url: record.url.clone(),
            state: Mutex::new(DownloadState {
                record,
                request: None,
                supports_range: true,
                cache: None,
                speed: None,
                last_percent,
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn lock(&self) -> MutexGuard<'_, DownloadState> {
        self.state.lock().await
    }

    /// For blocking worker threads only; panics inside async context.
    pub fn blocking_lock(&self) -> MutexGuard<'_, DownloadState> {
        self.state.blocking_lock()
    }

    pub async fn snapshot(&self) -> DownloadRecord {
        self.state.lock().await.record.clone()
    }
}

impl DownloadState {
    /// Record a failure. Ignored while pausing; the first code of a run wins.
    pub fn fail(&mut self, code: ErrorCode) {
        let code = code.normalized();
        if self.record.status == DownloadStatus::Pausing || code.is_none() {
            return;
        }
        if self.record.error_code.is_none() {
            self.record.error_code = code;
        }
        self.record.status = DownloadStatus::Failed;
        self.record.finished = false;
    }

    pub fn has_error(&self) -> bool {
        !self.record.error_code.is_none()
    }

    /// Set completed bytes, clamped to a known positive content length.
    pub fn set_completed(&mut self, bytes: u64) {
        self.record.completed_size = match self.record.content_length {
            Some(total) if total > 0 => bytes.min(total),
            _ => bytes,
        };
    }

    pub fn event(&mut self) -> ProgressEvent {
        let rate = self.speed.as_mut().map_or(0, |s| s.bytes_per_sec());
        ProgressEvent::from_record(&self.record, rate)
    }
}
