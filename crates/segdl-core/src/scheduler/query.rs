//! Record queries. Live in-memory records take precedence over the store.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::Scheduler;
use crate::error::EngineError;
use crate::record::{DownloadRecord, DownloadStatus};
use crate::task::Download;

impl Scheduler {
    /// Current record for `url`, live or persisted.
    pub async fn get(&self, url: &str) -> Result<Option<DownloadRecord>, EngineError> {
        let live = self.inner.book().downloads.get(url).cloned();
        match live {
            Some(download) => Ok(Some(download.snapshot().await)),
            None => Ok(self.inner.ctx.store.get(url).await?),
        }
    }

    /// Every record, newest first.
    pub async fn list_all(&self) -> Result<Vec<DownloadRecord>, EngineError> {
        let mut by_url: HashMap<String, DownloadRecord> = self
            .inner
            .ctx
            .store
            .list()
            .await?
            .into_iter()
            .map(|r| (r.url.clone(), r))
            .collect();
        let live: Vec<Arc<Download>> = self.inner.book().downloads.values().cloned().collect();
        for download in live {
            let record = download.snapshot().await;
            by_url.insert(record.url.clone(), record);
        }
        let mut records: Vec<DownloadRecord> = by_url.into_values().collect();
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.url.cmp(&b.url))
        });
        Ok(records)
    }

    /// Records not finished yet.
    pub async fn list_downloading(&self) -> Result<Vec<DownloadRecord>, EngineError> {
        let mut records = self.list_all().await?;
        records.retain(|r| !r.finished);
        Ok(records)
    }

    pub async fn list_downloaded(&self) -> Result<Vec<DownloadRecord>, EngineError> {
        let mut records = self.list_all().await?;
        records.retain(|r| r.finished);
        Ok(records)
    }

    pub async fn list_by_tag(&self, tag: &str) -> Result<Vec<DownloadRecord>, EngineError> {
        let mut records = self.list_all().await?;
        records.retain(|r| r.tag.as_deref() == Some(tag));
        Ok(records)
    }

    /// Whether `url` finished and its artifact is still on disk.
    pub async fn has_succeeded(&self, url: &str) -> Result<bool, EngineError> {
        Ok(self.artifact_path_if_succeeded(url).await?.is_some())
    }

    pub async fn artifact_path_if_succeeded(
        &self,
        url: &str,
    ) -> Result<Option<PathBuf>, EngineError> {
        let Some(record) = self.get(url).await? else {
            return Ok(None);
        };
        if !record.finished || record.status != DownloadStatus::Finished {
            return Ok(None);
        }
        match tokio::fs::metadata(&record.path).await {
            Ok(m) if m.is_file() => Ok(Some(record.path)),
            _ => Ok(None),
        }
    }
}
