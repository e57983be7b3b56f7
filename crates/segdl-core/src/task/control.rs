//! Lifecycle control: pause, stop, delete, cancel, downgrade, fail.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::{DownloadState, DownloadTask};
use crate::error::ErrorCode;
use crate::record::DownloadStatus;
use crate::storage;

impl DownloadTask {
    /// Record a stage failure. Ignored once the task is destroyed, since a
    /// cancelled transfer failing is expected.
    pub fn fail(&self, st: &mut DownloadState, code: ErrorCode) {
        if self.is_destroyed() {
            return;
        }
        st.fail(code);
    }

    /// Pause: the bound request is kept so resume continues with it. A task
    /// still queued goes straight to `Paused`.
    pub async fn pause(self: &Arc<Self>) {
        let mut st = self.download.lock().await;
        if self.is_destroyed() {
            return;
        }
        if self.worker_active.load(Ordering::SeqCst) {
            st.record.status = DownloadStatus::Pausing;
        } else {
            st.record.status = DownloadStatus::Paused;
            self.persist(&st).await;
        }
        let ev = st.event();
        self.ctx.emit(ev);
        tracing::debug!(task = self.id, url = %self.url(), "pause requested");
        self.cancel();
    }

    /// Stop: detaches the bound request, so resume starts from url and path.
    pub async fn stop(self: &Arc<Self>) {
        let mut st = self.download.lock().await;
        if self.is_destroyed() {
            return;
        }
        st.record.status = DownloadStatus::Stopped;
        st.request = None;
        if !self.worker_active.load(Ordering::SeqCst) {
            self.persist(&st).await;
        }
        let ev = st.event();
        self.ctx.emit(ev);
        tracing::debug!(task = self.id, url = %self.url(), "stop requested");
        self.cancel();
    }

    /// Cancel and suppress all further persistence. Returns once no stage
    /// holds the download lock, so files can be removed safely afterwards.
    pub async fn delete(self: &Arc<Self>) {
        self.need_delete.store(true, Ordering::SeqCst);
        self.cancel();
        let _barrier = self.download.lock().await;
        tracing::debug!(task = self.id, url = %self.url(), "delete requested");
    }

    /// Destroy the task: raise the abort flag for a running worker, or end
    /// a task that never started. Cancels every segment worker. Idempotent.
    pub fn cancel(self: &Arc<Self>) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel_subtasks();
        if !self.worker_active.load(Ordering::SeqCst) {
            self.end();
        }
    }

    /// Fall back to a single stream: one segment, segment workers cancelled,
    /// temp dir removed, progress reset. One-way and idempotent.
    pub async fn downgrade(&self) {
        if self.downgraded.swap(true, Ordering::SeqCst) {
            return;
        }
        self.segment_count.store(1, Ordering::SeqCst);
        self.cancel_subtasks();

        let mut st = self.download.lock().await;
        if let Some(request) = st.request.as_mut() {
            request.segment_count = 1;
        }
        st.record.completed_size = 0;
        st.supports_range = false;
        st.last_percent = st.record.percent();
        if let Err(e) = storage::remove_dir_if_exists(&st.record.temp_dir).await {
            tracing::warn!(path = %st.record.temp_dir.display(), "remove temp dir: {e}");
        }
        tracing::info!(task = self.id, url = %self.url(), "downgraded to single stream");
        self.persist(&st).await;
    }
}
