use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::RecordStore;
use crate::record::{CacheEntry, DownloadRecord};

/// Process-local store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Tables>,
}

#[derive(Debug, Default)]
struct Tables {
    records: HashMap<String, DownloadRecord>,
    cache: HashMap<String, CacheEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn newest_first(mut records: Vec<DownloadRecord>) -> Vec<DownloadRecord> {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.url.cmp(&b.url)));
    records
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, url: &str) -> Result<Option<DownloadRecord>> {
        Ok(self.tables().records.get(url).cloned())
    }

    async fn upsert(&self, record: &DownloadRecord) -> Result<()> {
        self.tables()
            .records
            .insert(record.url.clone(), record.clone());
        Ok(())
    }

    async fn update_cache(&self, entry: &CacheEntry) -> Result<()> {
        self.tables().cache.insert(entry.url.clone(), entry.clone());
        Ok(())
    }

    async fn cache(&self, url: &str) -> Result<Option<CacheEntry>> {
        Ok(self.tables().cache.get(url).cloned())
    }

    async fn delete(&self, url: &str, path: &Path) -> Result<()> {
        let mut t = self.tables();
        t.records.retain(|u, r| u != url && r.path != path);
        t.cache.remove(url);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<DownloadRecord>> {
        Ok(newest_first(self.tables().records.values().cloned().collect()))
    }

    async fn list_by_tag(&self, tag: &str) -> Result<Vec<DownloadRecord>> {
        let records = self
            .tables()
            .records
            .values()
            .filter(|r| r.tag.as_deref() == Some(tag))
            .cloned()
            .collect();
        Ok(newest_first(records))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
