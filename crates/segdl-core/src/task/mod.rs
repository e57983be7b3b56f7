//! Per-download task: binds one request and record to a worker and owns
//! the lifecycle (run, pause, stop, delete, downgrade, progress).

mod control;
mod download;
mod guard;
mod progress;
mod run;
mod speed;

pub use download::{Download, DownloadState};
pub use progress::ProgressEvent;
pub use speed::ThroughputMonitor;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::OwnedSemaphorePermit;

use crate::context::EngineContext;
use crate::record::{DownloadRecord, DownloadRequest, DownloadStatus};

/// Task id, unique per scheduler.
pub type TaskId = u64;

/// Scheduler callbacks around a task's run.
pub trait TaskLifecycle: Send + Sync {
    /// The worker started; the permit is held until the matching end.
    fn on_task_start(&self, task: &Arc<DownloadTask>, permit: OwnedSemaphorePermit);

    /// The task is done for this run (finished, failed, cancelled or never
    /// started). May be called more than once per task.
    fn on_task_end(&self, task: &Arc<DownloadTask>);
}

pub struct DownloadTask {
    id: TaskId,
    download: Arc<Download>,
    request: DownloadRequest,
    segment_count: AtomicUsize,
    destroyed: AtomicBool,
    need_delete: AtomicBool,
    downgraded: AtomicBool,
    worker_active: AtomicBool,
    /// Cancel flags of spawned segment workers.
    subtasks: Mutex<Vec<Arc<AtomicBool>>>,
    observer: Weak<dyn TaskLifecycle>,
    ctx: Arc<EngineContext>,
}

impl std::fmt::Debug for DownloadTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadTask")
            .field("id", &self.id)
            .field("url", &self.request.url)
            .field("destroyed", &self.is_destroyed())
            .field("downgraded", &self.is_downgraded())
            .finish_non_exhaustive()
    }
}

impl DownloadTask {
    /// Build a queued task: status `Wait`, prior error cleared, progress
    /// restarted if the previous run had completed every byte.
    pub async fn create(
        id: TaskId,
        download: Arc<Download>,
        request: DownloadRequest,
        observer: Weak<dyn TaskLifecycle>,
        ctx: Arc<EngineContext>,
    ) -> Arc<Self> {
        let segment_count = request.segment_count.max(1);
        let task = Arc::new(Self {
            id,
            download,
            request,
            segment_count: AtomicUsize::new(segment_count),
            destroyed: AtomicBool::new(false),
            need_delete: AtomicBool::new(false),
            downgraded: AtomicBool::new(false),
            worker_active: AtomicBool::new(false),
            subtasks: Mutex::new(Vec::new()),
            observer,
            ctx,
        });
        {
            let mut st = task.download.lock().await;
            let record = &mut st.record;
            if matches!(record.content_length, Some(total) if total > 0 && record.completed_size == total)
            {
                record.completed_size = 0;
            }
            record.status = DownloadStatus::Wait;
            record.error_code = Default::default();
            record.finished = false;
            st.last_percent = st.record.percent();
            let ev = st.event();
            task.ctx.emit(ev);
        }
        tracing::debug!(task = id, url = %task.request.url, "task created");
        task
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.request.url
    }

    pub fn download(&self) -> &Arc<Download> {
        &self.download
    }

    /// The request this run was created from.
    pub fn request(&self) -> &DownloadRequest {
        &self.request
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    pub fn segment_count(&self) -> usize {
        self.segment_count.load(Ordering::SeqCst)
    }

    /// Narrow the segment count, e.g. when the file is smaller than the
    /// requested number of segments.
    pub fn set_segment_count(&self, count: usize) {
        self.segment_count.store(count.max(1), Ordering::SeqCst);
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn is_downgraded(&self) -> bool {
        self.downgraded.load(Ordering::SeqCst)
    }

    pub fn is_delete_requested(&self) -> bool {
        self.need_delete.load(Ordering::SeqCst)
    }

    /// Whether this run fetches into segment files rather than one stream.
    pub fn uses_segments(&self, st: &DownloadState) -> bool {
        st.supports_range
            && !self.is_downgraded()
            && matches!(st.record.content_length, Some(total) if total > 0)
    }

    /// New cancel flag for a segment worker, cancelled together with the task.
    pub fn register_subtask(&self) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(self.is_destroyed()));
        self.subtasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&flag));
        flag
    }

    pub fn cancel_subtasks(&self) {
        let subtasks = self.subtasks.lock().unwrap_or_else(PoisonError::into_inner);
        for flag in subtasks.iter() {
            flag.store(true, Ordering::SeqCst);
        }
    }

    fn clear_subtasks(&self) {
        self.subtasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Progress callback for blocking segment workers. Adds `delta` bytes,
    /// feeds the rate monitor and emits an event when the whole percentage
    /// changes (below 100). Returns false, discarding the delta, once the
    /// task is destroyed or `flag` is cancelled.
    pub fn on_download(&self, flag: &AtomicBool, delta: u64) -> bool {
        if self.is_destroyed() || flag.load(Ordering::SeqCst) {
            return false;
        }
        let mut st = self.download.blocking_lock();
        let completed = st.record.completed_size.saturating_add(delta);
        st.set_completed(completed);
        if let Some(speed) = st.speed.as_mut() {
            speed.record(delta);
        }
        let percent = st.record.percent();
        if percent != st.last_percent && percent.map_or(true, |p| p < 100) {
            st.last_percent = percent;
            let ev = st.event();
            self.ctx.emit(ev);
        }
        true
    }

    /// Persist the record unless a delete is pending. Caller holds the lock.
    pub async fn persist(&self, st: &DownloadState) {
        if self.is_delete_requested() {
            return;
        }
        if let Err(e) = self.ctx.store.upsert(&st.record).await {
            tracing::warn!(url = %st.record.url, "persist record: {e:#}");
        }
    }

    /// Persist the current record (takes the lock).
    pub async fn update_info(&self) -> DownloadRecord {
        let st = self.download.lock().await;
        self.persist(&st).await;
        st.record.clone()
    }

    fn end(self: &Arc<Self>) {
        if let Some(observer) = self.observer.upgrade() {
            observer.on_task_end(self);
        }
    }
}
