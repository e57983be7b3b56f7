use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::path::PathBuf;

use super::SqliteStore;
use crate::error::ErrorCode;
use crate::record::{CacheEntry, DownloadRecord, DownloadStatus};

const RECORD_COLUMNS: &str = "url, path, tag, content_length, completed_size, status, \
     error_code, created_at, finished, temp_dir";

fn record_from_row(row: &SqliteRow) -> DownloadRecord {
    let path: String = row.get("path");
    let temp_dir: String = row.get("temp_dir");
    let content_length: Option<i64> = row.get("content_length");
    let completed_size: i64 = row.get("completed_size");
    let status: String = row.get("status");
    let error_code: i64 = row.get("error_code");
    DownloadRecord {
        url: row.get("url"),
        path: PathBuf::from(path),
        tag: row.get("tag"),
        content_length: content_length.and_then(|n| u64::try_from(n).ok()),
        completed_size: u64::try_from(completed_size).unwrap_or(0),
        status: DownloadStatus::from_str(&status),
        error_code: ErrorCode::from_i32(error_code as i32),
        created_at: row.get("created_at"),
        finished: row.get("finished"),
        temp_dir: PathBuf::from(temp_dir),
    }
}

impl SqliteStore {
    pub(super) async fn get_record(&self, url: &str) -> Result<Option<DownloadRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM downloads WHERE url = ?1"
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(record_from_row))
    }

    /// All records, newest first.
    pub(super) async fn list_records(&self, tag: Option<&str>) -> Result<Vec<DownloadRecord>> {
        let rows = match tag {
            Some(tag) => {
                sqlx::query(&format!(
                    "SELECT {RECORD_COLUMNS} FROM downloads WHERE tag = ?1 \
                     ORDER BY created_at DESC, url ASC"
                ))
                .bind(tag)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {RECORD_COLUMNS} FROM downloads ORDER BY created_at DESC, url ASC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows.iter().map(record_from_row).collect())
    }

    pub(super) async fn get_cache(&self, url: &str) -> Result<Option<CacheEntry>> {
        let row = sqlx::query("SELECT url, etag, last_modified FROM download_cache WHERE url = ?1")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| CacheEntry {
            url: row.get("url"),
            etag: row.get("etag"),
            last_modified: row.get("last_modified"),
        }))
    }
}
