use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use super::queue::ReadyQueue;
use super::Scheduler;
use crate::config::{EngineConfig, ExecutorConfig};
use crate::context::EngineContext;
use crate::error::{EngineError, ErrorCode};
use crate::record::{DownloadRecord, DownloadRequest, DownloadStatus};
use crate::store::MemoryStore;
use crate::task::{Download, DownloadTask, TaskLifecycle};
use crate::transport::{ByteRange, ConnectionFactory, Response, TransportError};

struct Refuse;

impl ConnectionFactory for Refuse {
    fn open(
        &self,
        _url: &str,
        _headers: &HashMap<String, String>,
        _range: Option<ByteRange>,
    ) -> Result<Response, TransportError> {
        Err(TransportError::Http(503))
    }
}

fn config() -> EngineConfig {
    EngineConfig {
        max_running_downloads: 2,
        min_usable_storage_bytes: 0,
        ..EngineConfig::default()
    }
}

async fn queued_task(id: u64) -> Arc<DownloadTask> {
    let ctx = Arc::new(EngineContext::new(
        config(),
        Arc::new(MemoryStore::new()),
        Arc::new(Refuse),
        Vec::new(),
    ));
    let url = format!("https://example.com/{id}");
    let request = DownloadRequest::new(&url, format!("/tmp/segdl-queue-{id}"));
    let download = Arc::new(Download::new(DownloadRecord::new(&url, &request.path, None)));
    let observer: Weak<dyn TaskLifecycle> = Weak::<super::Shared>::new();
    DownloadTask::create(id, download, request, observer, ctx).await
}

#[tokio::test]
async fn ready_queue_is_fifo_and_removable() {
    let q = ReadyQueue::default();
    for id in 1..=3 {
        assert!(q.push(queued_task(id).await));
    }
    assert_eq!(q.remove(2).map(|t| t.id()), Some(2));
    assert!(q.remove(2).is_none());
    assert!(q.wait_nonempty().await);
    assert_eq!(q.try_pop().map(|t| t.id()), Some(1));
    assert_eq!(q.try_pop().map(|t| t.id()), Some(3));
    assert!(q.try_pop().is_none());
    assert_eq!(q.len(), 0);
}

#[tokio::test]
async fn closed_queue_wakes_waiting_consumer() {
    let q = Arc::new(ReadyQueue::default());
    let waiter = {
        let q = Arc::clone(&q);
        tokio::spawn(async move { !q.wait_nonempty().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    q.close();
    assert!(tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .unwrap()
        .unwrap());
    assert!(!q.push(queued_task(9).await));
}

#[tokio::test]
async fn push_wakes_waiting_consumer() {
    let q = Arc::new(ReadyQueue::default());
    let waiter = {
        let q = Arc::clone(&q);
        tokio::spawn(async move { q.wait_nonempty().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(q.push(queued_task(4).await));
    assert!(tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .unwrap()
        .unwrap());
    assert_eq!(q.len(), 1);
}

#[tokio::test]
async fn drain_empties_queue() {
    let q = ReadyQueue::default();
    q.push(queued_task(1).await);
    q.push(queued_task(2).await);
    let ids: Vec<u64> = q.drain().iter().map(|t| t.id()).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(q.len(), 0);
}

fn start(dir: &std::path::Path) -> (Scheduler, DownloadRequest) {
    let scheduler = Scheduler::builder(config())
        .connection_factory(Arc::new(Refuse))
        .start();
    let request = DownloadRequest::new("https://example.com/a.bin", dir.join("a.bin"));
    (scheduler, request)
}

#[tokio::test]
async fn failed_download_releases_permit_and_registry() {
    let dir = tempfile::tempdir().unwrap();
    let (scheduler, request) = start(dir.path());
    scheduler.submit(request.clone()).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), scheduler.wait_idle())
        .await
        .unwrap();

    assert_eq!(scheduler.available_permits(), scheduler.max_permits());
    assert_eq!(scheduler.running_count(), 0);
    assert!(!scheduler.is_active(&request.url));
    let record = scheduler.get(&request.url).await.unwrap().unwrap();
    assert_eq!(record.status, DownloadStatus::Failed);
    assert_eq!(record.error_code, ErrorCode::Network);
    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn idle_scheduler_holds_no_permits() {
    let dir = tempfile::tempdir().unwrap();
    let (scheduler, request) = start(dir.path());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(scheduler.available_permits(), 2);

    for i in 0..3 {
        let mut r = request.clone();
        r.url = format!("https://example.com/{i}.bin");
        r.path = dir.path().join(format!("{i}.bin"));
        scheduler.submit(r).await.unwrap();
    }
    tokio::time::timeout(Duration::from_secs(5), scheduler.wait_idle())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(scheduler.available_permits(), scheduler.max_permits());
    assert_eq!(scheduler.queued_count(), 0);
    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn tagged_requests_route_to_their_executor() {
    let mut cfg = config();
    cfg.executors = vec![
        ExecutorConfig::new("music", "music", 1),
        ExecutorConfig::new("again", "music", 4),
    ];
    let scheduler = Scheduler::builder(cfg)
        .connection_factory(Arc::new(Refuse))
        .executor(ExecutorConfig::new("image", "image", 3))
        .start();

    let stats = scheduler.executors();
    let names: Vec<&str> = stats.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["default", "music", "image"]);
    assert_eq!(stats[0].tag, None);
    assert_eq!(stats[1].max_running, 1);
    assert_eq!(scheduler.max_permits(), 2 + 1 + 3);

    let s = &scheduler.inner;
    assert_eq!(s.executor_for(Some("music")).name(), "music");
    assert_eq!(s.executor_for(Some("image")).name(), "image");
    assert_eq!(s.executor_for(Some("video")).name(), "default");
    assert_eq!(s.executor_for(None).name(), "default");
    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn submit_after_shutdown_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (scheduler, request) = start(dir.path());
    scheduler.shutdown().await.unwrap();
    scheduler.shutdown().await.unwrap();
    assert!(matches!(
        scheduler.submit(request).await,
        Err(EngineError::ShutDown)
    ));
}

#[tokio::test]
async fn resume_without_bound_request_rebuilds_it() {
    let dir = tempfile::tempdir().unwrap();
    let (scheduler, request) = start(dir.path());
    let mut record = DownloadRecord::new(&request.url, &request.path, Some("t".into()));
    record.status = DownloadStatus::Stopped;
    scheduler.resume(&record).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), scheduler.wait_idle())
        .await
        .unwrap();
    let got = scheduler.get(&request.url).await.unwrap().unwrap();
    assert_eq!(got.path, request.path);
    assert_eq!(got.tag.as_deref(), Some("t"));
    scheduler.shutdown().await.unwrap();
}
