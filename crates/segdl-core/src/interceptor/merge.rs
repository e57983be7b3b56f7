//! Terminal stage: merge segment files into the destination and settle the
//! final status.

use async_trait::async_trait;
use std::path::PathBuf;

use super::{Chain, Interceptor};
use crate::error::ErrorCode;
use crate::record::{DownloadRecord, DownloadStatus};
use crate::storage;
use crate::task::{DownloadState, DownloadTask};

/// Runs under the download lock. A segmented download is merged once every
/// byte and every segment file is present (one file is renamed, several are
/// concatenated in index order); the temp dir is kept if merging fails so
/// the download stays resumable. The destination is then validated against
/// the content length and completed size.
#[derive(Debug, Default, Clone, Copy)]
pub struct MergeInterceptor;

#[async_trait]
impl Interceptor for MergeInterceptor {
    async fn intercept(&self, chain: Chain<'_>) -> DownloadRecord {
        let task = chain.task();
        let mut st = task.download().lock().await;
        if task.is_destroyed() || st.record.status == DownloadStatus::Failed {
            return st.record.clone();
        }
        if task.uses_segments(&st) && ready_to_merge(task, &st) {
            if let Err(e) = merge_segments(&st).await {
                tracing::warn!(url = %st.record.url, "merge failed: {e}");
                task.fail(&mut st, ErrorCode::MergeFailed);
                return st.record.clone();
            }
            if let Err(e) = storage::remove_dir_if_exists(&st.record.temp_dir).await {
                tracing::warn!(path = %st.record.temp_dir.display(), "remove temp dir: {e}");
            }
        }
        validate(task, &mut st).await;
        st.record.clone()
    }
}

fn ready_to_merge(task: &DownloadTask, st: &DownloadState) -> bool {
    let Some(total) = st.record.content_length.filter(|t| *t > 0) else {
        return false;
    };
    if st.record.completed_size != total {
        return false;
    }
    match storage::segment_files(&st.record.temp_dir) {
        Ok(files) => files.len() == task.segment_count(),
        Err(_) => false,
    }
}

async fn merge_segments(st: &DownloadState) -> std::io::Result<()> {
    let dest = &st.record.path;
    storage::remove_file_if_exists(dest).await?;
    let parts: Vec<PathBuf> = storage::segment_files(&st.record.temp_dir)?
        .into_iter()
        .map(|(_, path)| path)
        .collect();
    match parts.as_slice() {
        [only] => tokio::fs::rename(only, dest).await?,
        _ => {
            storage::concat_files(&parts, dest).await?;
        }
    }
    tracing::debug!(path = %dest.display(), parts = parts.len(), "segments merged");
    Ok(())
}

async fn validate(task: &DownloadTask, st: &mut DownloadState) {
    let actual = tokio::fs::metadata(&st.record.path)
        .await
        .map(|m| m.len())
        .unwrap_or(0);
    let ok = st.record.status != DownloadStatus::Failed
        && actual > 0
        && st.record.content_length == Some(actual)
        && st.record.completed_size == actual;
    if !ok {
        tracing::warn!(
            url = %st.record.url,
            actual,
            content_length = ?st.record.content_length,
            completed = st.record.completed_size,
            "validation failed"
        );
        task.fail(st, ErrorCode::DownloadFailed);
        return;
    }
    st.record.status = DownloadStatus::Finished;
    st.record.finished = true;
    if let Some(entry) = st.cache.clone() {
        if let Err(e) = task.context().store.update_cache(&entry).await {
            tracing::warn!(url = %entry.url, "save cache entry: {e:#}");
        }
    }
}
