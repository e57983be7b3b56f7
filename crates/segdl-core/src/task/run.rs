//! One run of a task: start bookkeeping, drive the pipeline, reconcile.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::OwnedSemaphorePermit;
use tokio::task::JoinError;

use super::guard::EndGuard;
use super::{DownloadTask, ThroughputMonitor};
use crate::error::ErrorCode;
use crate::interceptor;
use crate::record::{DownloadRecord, DownloadStatus};

impl DownloadTask {
    /// Run the task with a scheduler permit. The permit moves into the
    /// scheduler's running set and is released by the end callback, which
    /// fires exactly when this future completes (or unwinds).
    pub async fn run(self: Arc<Self>, permit: OwnedSemaphorePermit) {
        self.worker_active.store(true, Ordering::SeqCst);
        if !self.is_destroyed() {
            let mut st = self.download.lock().await;
            if !self.is_destroyed() {
                st.record.status = DownloadStatus::Running;
                st.speed = Some(ThroughputMonitor::new());
                let ev = st.event();
                self.ctx.emit(ev);
            }
        }
        match self.observer.upgrade() {
            Some(observer) => observer.on_task_start(&self, permit),
            None => drop(permit),
        }
        let _guard = EndGuard { task: &self };

        let outcome = if self.is_destroyed() {
            None
        } else {
            tracing::info!(task = self.id, url = %self.url(), "download started");
            let pipeline = tokio::spawn(interceptor::run_pipeline(Arc::clone(&self)));
            Some(pipeline.await)
        };
        self.finish_run(outcome).await;
        self.clear_subtasks();
    }

    async fn finish_run(&self, outcome: Option<Result<DownloadRecord, JoinError>>) {
        let mut st = self.download.lock().await;
        match outcome {
            Some(Ok(result)) => {
                if result.path != st.record.path {
                    tracing::debug!(
                        url = %st.record.url,
                        path = %result.path.display(),
                        "stage changed destination"
                    );
                    st.record.path = result.path;
                }
                if !result.error_code.is_none() {
                    self.fail(&mut st, result.error_code);
                }
            }
            Some(Err(e)) => {
                tracing::warn!(url = %st.record.url, "pipeline aborted: {e}");
                self.fail(&mut st, ErrorCode::DownloadFailed);
            }
            None => {}
        }
        let status = st.record.status;
        match status {
            DownloadStatus::Running if self.is_destroyed() => {
                st.record.status = DownloadStatus::Stopped;
            }
            DownloadStatus::Running => st.fail(ErrorCode::DownloadFailed),
            DownloadStatus::Pausing => st.record.status = DownloadStatus::Paused,
            _ => {}
        }
        self.persist(&st).await;
        if !self.is_delete_requested() {
            let ev = st.event();
            self.ctx.emit(ev);
        }
        st.speed = None;
        tracing::info!(
            task = self.id,
            url = %st.record.url,
            status = st.record.status.as_str(),
            error_code = st.record.error_code.as_i32(),
            completed = st.record.completed_size,
            "download ended"
        );
    }
}
