//! Tests for the SQLite store (in-memory database).

use std::path::{Path, PathBuf};

use super::SqliteStore;
use crate::error::ErrorCode;
use crate::record::{CacheEntry, DownloadRecord, DownloadStatus};
use crate::store::RecordStore;

fn record(url: &str, path: &str, tag: Option<&str>, created_at: i64) -> DownloadRecord {
    let mut r = DownloadRecord::new(url, path, tag.map(str::to_string));
    r.created_at = created_at;
    r
}

#[tokio::test]
async fn upsert_then_get_preserves_fields() {
    let store = SqliteStore::open_memory().await.unwrap();
    let mut r = record("https://example.com/a.iso", "/data/a.iso", Some("iso"), 100);
    r.content_length = Some(400);
    r.completed_size = 150;
    r.status = DownloadStatus::Paused;
    r.error_code = ErrorCode::Network;
    store.upsert(&r).await.unwrap();

    let got = store.get(&r.url).await.unwrap().unwrap();
    assert_eq!(got, r);
    assert_eq!(got.temp_dir, PathBuf::from("/data/a.iso.parts"));
}

#[tokio::test]
async fn upsert_replaces_existing_row() {
    let store = SqliteStore::open_memory().await.unwrap();
    let mut r = record("https://example.com/a", "/data/a", None, 1);
    store.upsert(&r).await.unwrap();
    r.status = DownloadStatus::Finished;
    r.finished = true;
    r.completed_size = 10;
    r.content_length = Some(10);
    store.upsert(&r).await.unwrap();

    let all = store.list().await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(all[0].finished);
    assert_eq!(all[0].status, DownloadStatus::Finished);
}

#[tokio::test]
async fn list_newest_first_and_by_tag() {
    let store = SqliteStore::open_memory().await.unwrap();
    store.upsert(&record("https://a/1", "/d/1", Some("x"), 10)).await.unwrap();
    store.upsert(&record("https://a/2", "/d/2", None, 20)).await.unwrap();
    store.upsert(&record("https://a/3", "/d/3", Some("x"), 30)).await.unwrap();

    let urls: Vec<String> = store.list().await.unwrap().into_iter().map(|r| r.url).collect();
    assert_eq!(urls, vec!["https://a/3", "https://a/2", "https://a/1"]);

    let tagged: Vec<String> = store
        .list_by_tag("x")
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.url)
        .collect();
    assert_eq!(tagged, vec!["https://a/3", "https://a/1"]);
}

#[tokio::test]
async fn delete_removes_record_and_cache() {
    let store = SqliteStore::open_memory().await.unwrap();
    let r = record("https://a/1", "/d/1", None, 1);
    store.upsert(&r).await.unwrap();
    store
        .update_cache(&CacheEntry {
            url: r.url.clone(),
            etag: Some("abc".into()),
            last_modified: Some("Wed, 21 Oct 2015 07:28:00 GMT".into()),
        })
        .await
        .unwrap();
    assert_eq!(
        store.cache(&r.url).await.unwrap().unwrap().etag.as_deref(),
        Some("abc")
    );

    store.delete(&r.url, &r.path).await.unwrap();
    assert!(store.get(&r.url).await.unwrap().is_none());
    assert!(store.cache(&r.url).await.unwrap().is_none());
}

#[tokio::test]
async fn delete_unknown_is_ok() {
    let store = SqliteStore::open_memory().await.unwrap();
    store.delete("https://nope", Path::new("/nope")).await.unwrap();
}

#[tokio::test]
async fn recover_interrupted_resets_live_statuses() {
    let store = SqliteStore::open_memory().await.unwrap();
    let statuses = [
        DownloadStatus::Wait,
        DownloadStatus::Running,
        DownloadStatus::Pausing,
        DownloadStatus::Paused,
        DownloadStatus::Finished,
    ];
    for (i, s) in statuses.iter().enumerate() {
        let mut r = record(&format!("https://a/{i}"), &format!("/d/{i}"), None, i as i64);
        r.status = *s;
        store.upsert(&r).await.unwrap();
    }
    assert_eq!(store.recover_interrupted().await.unwrap(), 3);
    let stopped = store
        .list()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.status == DownloadStatus::Stopped)
        .count();
    assert_eq!(stopped, 3);
}

#[tokio::test]
async fn open_at_creates_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested dir").join("downloads.db");
    let store = SqliteStore::open_at(&path).await.unwrap();
    store.upsert(&record("https://a/1", "/d/1", None, 1)).await.unwrap();
    store.close().await.unwrap();
    assert!(path.exists());

    let reopened = SqliteStore::open_at(&path).await.unwrap();
    assert!(reopened.get("https://a/1").await.unwrap().is_some());
}
