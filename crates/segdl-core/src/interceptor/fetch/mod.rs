//! Fetch stage: segmented range download into the temp dir, or a single
//! stream straight into the destination.

mod worker;

use async_trait::async_trait;
use std::sync::Arc;

use self::worker::Outcome;
use super::{Chain, Interceptor};
use crate::error::ErrorCode;
use crate::record::{DownloadRecord, DownloadRequest};
use crate::segmenter::plan_segments;
use crate::storage;
use crate::task::DownloadTask;

/// Fetches every byte of the download. Segments resume from the length of
/// their files on disk; a segment answered without partial content
/// downgrades the task, after which the whole file is streamed once.
#[derive(Debug, Default, Clone, Copy)]
pub struct FetchInterceptor;

#[async_trait]
impl Interceptor for FetchInterceptor {
    async fn intercept(&self, chain: Chain<'_>) -> DownloadRecord {
        let task = Arc::clone(chain.task());
        if task.is_destroyed() {
            return task.download().snapshot().await;
        }
        let segmented = {
            let st = task.download().lock().await;
            if st.has_error() {
                return st.record.clone();
            }
            task.uses_segments(&st)
        };

        let single = if segmented {
            fetch_segments(&task, chain.request()).await
        } else {
            true
        };
        if single && !task.is_destroyed() && !task.download().lock().await.has_error() {
            fetch_single(&task, chain.request()).await;
        }
        chain.proceed().await
    }
}

async fn fail(task: &DownloadTask, code: ErrorCode) {
    let mut st = task.download().lock().await;
    task.fail(&mut st, code);
}

/// Returns true when the task was downgraded and still needs a single stream.
async fn fetch_segments(task: &Arc<DownloadTask>, request: &DownloadRequest) -> bool {
    let (total, temp_dir) = {
        let st = task.download().lock().await;
        (st.record.content_length.unwrap_or(0), st.record.temp_dir.clone())
    };
    if let Err(e) = tokio::fs::create_dir_all(&temp_dir).await {
        tracing::warn!(path = %temp_dir.display(), "create temp dir: {e}");
        fail(task, ErrorCode::FileIo).await;
        return false;
    }
    // Segment files from an earlier run fix the layout; a fresh run
    // creates all of them up front so the layout survives a restart.
    let existing = match storage::segment_files(&temp_dir) {
        Ok(files) => files.len(),
        Err(e) => {
            tracing::warn!(path = %temp_dir.display(), "list segment files: {e}");
            fail(task, ErrorCode::FileIo).await;
            return false;
        }
    };
    let count = if existing > 0 { existing } else { task.segment_count() };
    let segments = plan_segments(total, count);
    task.set_segment_count(segments.len());
    for segment in &segments {
        let path = storage::segment_path(&temp_dir, segment.index);
        let created = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await;
        if let Err(e) = created {
            tracing::warn!(path = %path.display(), "create segment file: {e}");
            fail(task, ErrorCode::FileIo).await;
            return false;
        }
    }

    let done: Vec<u64> = segments
        .iter()
        .map(|s| storage::file_len(&storage::segment_path(&temp_dir, s.index)).min(s.len()))
        .collect();
    {
        let mut st = task.download().lock().await;
        st.set_completed(done.iter().sum());
        st.last_percent = st.record.percent();
        tracing::debug!(
            url = %st.record.url,
            segments = segments.len(),
            completed = st.record.completed_size,
            "segmented fetch"
        );
    }

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut spawned = 0usize;
    for (segment, done) in segments.into_iter().zip(done) {
        if done >= segment.len() {
            continue;
        }
        let flag = task.register_subtask();
        let task = Arc::clone(task);
        let request = request.clone();
        let path = storage::segment_path(&temp_dir, segment.index);
        let tx = tx.clone();
        tokio::task::spawn_blocking(move || {
            let connector = Arc::clone(&task.context().connector);
            let outcome =
                worker::fetch_segment(&task, connector.as_ref(), &request, &segment, &path, &flag);
            let _ = tx.send((segment.index, outcome));
        });
        spawned += 1;
    }
    drop(tx);

    let mut downgraded = false;
    let mut received = 0usize;
    while let Some((index, outcome)) = rx.recv().await {
        received += 1;
        match outcome {
            Outcome::Done(bytes) => tracing::debug!(index, bytes, "segment complete"),
            Outcome::Cancelled => tracing::debug!(index, "segment cancelled"),
            Outcome::RangeIgnored if !downgraded => {
                tracing::info!(index, "server ignored range request");
                downgraded = true;
                task.downgrade().await;
            }
            Outcome::RangeIgnored => {}
            Outcome::Failed { code, reason } if !downgraded => {
                tracing::warn!(index, "segment failed: {reason}");
                fail(task, code).await;
                task.cancel_subtasks();
            }
            Outcome::Failed { .. } => {}
        }
    }
    if received < spawned && !downgraded {
        tracing::warn!(spawned, received, "segment worker exited without reporting");
        fail(task, ErrorCode::DownloadFailed).await;
    }
    downgraded
}

async fn fetch_single(task: &Arc<DownloadTask>, request: &DownloadRequest) {
    let dest = {
        let mut st = task.download().lock().await;
        st.record.completed_size = 0;
        st.last_percent = st.record.percent();
        st.record.path.clone()
    };
    tracing::debug!(url = %request.url, path = %dest.display(), "single-stream fetch");
    let flag = task.register_subtask();
    let worker_task = Arc::clone(task);
    let request = request.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let connector = Arc::clone(&worker_task.context().connector);
        worker::fetch_single(&worker_task, connector.as_ref(), &request, &dest, &flag)
    })
    .await;

    match joined {
        Ok(Outcome::Done(bytes)) => {
            let mut st = task.download().lock().await;
            if st.record.content_length.is_none() {
                st.record.content_length = Some(bytes);
                st.set_completed(bytes);
            }
        }
        Ok(Outcome::Cancelled) | Ok(Outcome::RangeIgnored) => {}
        Ok(Outcome::Failed { code, reason }) => {
            tracing::warn!(url = %task.url(), "single-stream fetch failed: {reason}");
            fail(task, code).await;
        }
        Err(e) => {
            tracing::warn!(url = %task.url(), "single-stream worker aborted: {e}");
            fail(task, ErrorCode::DownloadFailed).await;
        }
    }
}
