//! Control operations: submit, delete, stop, pause, resume, shutdown.

use std::sync::atomic::Ordering;
use std::sync::{Arc, PoisonError, Weak};

use super::{Scheduler, Shared};
use crate::error::EngineError;
use crate::record::{DownloadRecord, DownloadRequest, DownloadStatus};
use crate::storage;
use crate::task::{Download, DownloadTask, TaskLifecycle};

impl Shared {
    /// In-memory download for `url`, loading it from the store or creating
    /// a fresh record on a miss.
    async fn resolve_download(
        &self,
        request: &DownloadRequest,
    ) -> Result<Arc<Download>, EngineError> {
        if let Some(d) = self.book().downloads.get(&request.url) {
            return Ok(Arc::clone(d));
        }
        let record = match self.ctx.store.get(&request.url).await? {
            Some(record) => record,
            None => DownloadRecord::new(&request.url, &request.path, request.tag.clone()),
        };
        let download = Arc::new(Download::new(record));
        let mut book = self.book();
        Ok(Arc::clone(
            book.downloads
                .entry(request.url.clone())
                .or_insert(download),
        ))
    }

    fn live_task(&self, url: &str) -> Option<Arc<DownloadTask>> {
        self.book().tasks.get(url).cloned()
    }

    fn live_download(&self, url: &str) -> Option<Arc<Download>> {
        self.book().downloads.get(url).cloned()
    }

    async fn delete_locked(&self, record: &DownloadRecord) -> Result<(), EngineError> {
        if let Some(task) = self.live_task(&record.url) {
            self.unqueue(task.id());
            task.delete().await;
        }
        let live = self.book().downloads.remove(&record.url);
        let (path, temp_dir) = match live {
            Some(download) => {
                let st = download.lock().await;
                (st.record.path.clone(), st.record.temp_dir.clone())
            }
            None => (record.path.clone(), record.temp_dir.clone()),
        };
        let removed_file = storage::remove_file_if_exists(&path).await;
        if let Err(e) = &removed_file {
            tracing::warn!(path = %path.display(), "remove destination: {e}");
        }
        let removed_dir = storage::remove_dir_if_exists(&temp_dir).await;
        if let Err(e) = &removed_dir {
            tracing::warn!(path = %temp_dir.display(), "remove temp dir: {e}");
        }
        self.ctx.store.delete(&record.url, &path).await?;
        tracing::info!(url = %record.url, "download deleted");
        removed_file.and(removed_dir)?;
        Ok(())
    }
}

impl Scheduler {
    /// Queue a download. A url that already has a live task is left alone.
    /// An existing record keeps its destination path.
    pub async fn submit(&self, mut request: DownloadRequest) -> Result<(), EngineError> {
        let s = &self.inner;
        if s.is_shut_down() {
            return Err(EngineError::ShutDown);
        }
        let _serial = s.submit_lock.lock().await;
        if s.is_shut_down() {
            return Err(EngineError::ShutDown);
        }
        if s.book().tasks.contains_key(&request.url) {
            tracing::debug!(url = %request.url, "already queued or running, ignoring submit");
            return Ok(());
        }

        let download = s.resolve_download(&request).await?;
        {
            let mut st = download.lock().await;
            if st.record.path != request.path {
                tracing::debug!(
                    url = %request.url,
                    kept = %st.record.path.display(),
                    requested = %request.path.display(),
                    "keeping destination of existing record"
                );
                request.path = st.record.path.clone();
            }
            if request.tag.is_some() {
                st.record.tag = request.tag.clone();
            } else {
                request.tag = st.record.tag.clone();
            }
            st.record.status = DownloadStatus::Stopped;
            st.request = Some(request.clone());
        }

        let id = s.next_id.fetch_add(1, Ordering::SeqCst);
        let weak = Arc::downgrade(&self.inner);
        let observer: Weak<dyn TaskLifecycle> = weak;
        let task =
            DownloadTask::create(id, download, request, observer, Arc::clone(&s.ctx)).await;
        s.book()
            .tasks
            .insert(task.url().to_string(), Arc::clone(&task));
        let executor = s.executor_for(task.request().tag.as_deref());
        if !executor.ready.push(Arc::clone(&task)) {
            s.on_task_end(&task);
            return Err(EngineError::ShutDown);
        }
        tracing::info!(
            task = id,
            url = %task.url(),
            executor = executor.name(),
            "download queued"
        );
        Ok(())
    }

    /// Cancel any live task, remove the destination and temp dir, and drop
    /// the persisted record. The record is dropped even when a file cannot
    /// be removed; that failure is returned as [`EngineError::Io`].
    pub async fn delete(&self, record: &DownloadRecord) -> Result<(), EngineError> {
        let _serial = self.inner.submit_lock.lock().await;
        self.inner.delete_locked(record).await
    }

    /// Delete every record with `tag`, live or persisted.
    pub async fn delete_by_tag(&self, tag: &str) -> Result<usize, EngineError> {
        let records = self.list_by_tag(tag).await?;
        let _serial = self.inner.submit_lock.lock().await;
        for record in &records {
            self.inner.delete_locked(record).await?;
        }
        Ok(records.len())
    }

    /// Cancel the live task and detach the bound request; resume then
    /// rebuilds the request from url and path.
    pub async fn stop(&self, record: &DownloadRecord) -> Result<(), EngineError> {
        if let Some(task) = self.inner.live_task(&record.url) {
            task.stop().await;
        } else if let Some(download) = self.inner.live_download(&record.url) {
            download.lock().await.request = None;
        }
        Ok(())
    }

    /// Pause the live task, keeping the bound request and progress.
    pub async fn pause(&self, record: &DownloadRecord) -> Result<(), EngineError> {
        if let Some(task) = self.inner.live_task(&record.url) {
            task.pause().await;
        }
        Ok(())
    }

    /// Resubmit the bound request, or a fresh one built from url and path.
    pub async fn resume(&self, record: &DownloadRecord) -> Result<(), EngineError> {
        let bound = match self.inner.live_download(&record.url) {
            Some(download) => download.lock().await.request.clone(),
            None => None,
        };
        let request = bound.unwrap_or_else(|| {
            let mut r = DownloadRequest::new(&record.url, &record.path);
            r.tag = record.tag.clone();
            r.segment_count = self.inner.ctx.config.default_segment_count.max(1);
            r
        });
        self.submit(request).await
    }

    /// Stop everything and release resources: no new submissions, queued
    /// tasks end without running, running tasks are stopped and awaited,
    /// every dispatch loop exits and the store is closed. Idempotent.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        let s = &self.inner;
        if s.shutdown.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!("scheduler shutting down");
        let _serial = s.submit_lock.lock().await;

        let dispatchers = std::mem::take(
            &mut *s
                .dispatchers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let mut queued = Vec::new();
        for (executor, handle) in s.executors.iter().zip(&dispatchers) {
            queued.extend(executor.ready.drain());
            if !handle.is_finished() {
                executor.ready.close();
            }
        }
        for task in &queued {
            task.stop().await;
            s.on_task_end(task);
        }
        let live: Vec<Arc<DownloadTask>> = s.book().tasks.values().cloned().collect();
        for task in &live {
            task.stop().await;
        }
        for handle in dispatchers {
            if let Err(e) = handle.await {
                tracing::warn!("dispatch loop: {e}");
            }
        }
        self.wait_idle().await;

        s.book().downloads.clear();
        s.ctx.store.close().await?;
        tracing::info!("scheduler shut down");
        Ok(())
    }
}
