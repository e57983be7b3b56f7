use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

use super::SqliteStore;
use crate::record::{unix_timestamp, CacheEntry, DownloadRecord};
use crate::store::RecordStore;

impl SqliteStore {
    /// Turn records left in a live status by a crash (`wait`, `running`,
    /// `pausing`) into `stopped` so they can be resumed. Returns how many
    /// were reset.
    pub async fn recover_interrupted(&self) -> Result<u64> {
        let r = sqlx::query(
            r#"
            UPDATE downloads
            SET status = 'stopped',
                updated_at = ?1
            WHERE status IN ('wait', 'running', 'pausing')
            "#,
        )
        .bind(unix_timestamp())
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected())
    }
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn get(&self, url: &str) -> Result<Option<DownloadRecord>> {
        self.get_record(url).await
    }

    async fn upsert(&self, record: &DownloadRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO downloads (
                url, path, tag, content_length, completed_size, status,
                error_code, created_at, finished, temp_dir, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(url) DO UPDATE SET
                path = excluded.path,
                tag = excluded.tag,
                content_length = excluded.content_length,
                completed_size = excluded.completed_size,
                status = excluded.status,
                error_code = excluded.error_code,
                finished = excluded.finished,
                temp_dir = excluded.temp_dir,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.url)
        .bind(record.path.to_string_lossy().into_owned())
        .bind(&record.tag)
        .bind(record.content_length.map(to_i64))
        .bind(to_i64(record.completed_size))
        .bind(record.status.as_str())
        .bind(i64::from(record.error_code.as_i32()))
        .bind(record.created_at)
        .bind(record.finished)
        .bind(record.temp_dir.to_string_lossy().into_owned())
        .bind(unix_timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_cache(&self, entry: &CacheEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO download_cache (url, etag, last_modified)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(url) DO UPDATE SET
                etag = excluded.etag,
                last_modified = excluded.last_modified
            "#,
        )
        .bind(&entry.url)
        .bind(&entry.etag)
        .bind(&entry.last_modified)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn cache(&self, url: &str) -> Result<Option<CacheEntry>> {
        self.get_cache(url).await
    }

    async fn delete(&self, url: &str, path: &Path) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM downloads WHERE url = ?1 OR path = ?2")
            .bind(url)
            .bind(path.to_string_lossy().into_owned())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM download_cache WHERE url = ?1")
            .bind(url)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<DownloadRecord>> {
        self.list_records(None).await
    }

    async fn list_by_tag(&self, tag: &str) -> Result<Vec<DownloadRecord>> {
        self.list_records(Some(tag)).await
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
