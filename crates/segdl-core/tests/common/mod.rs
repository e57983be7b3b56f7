#![allow(dead_code)]

pub mod mock_transport;
pub mod range_server;

use std::time::Duration;

use segdl_core::{DownloadRecord, DownloadStatus, Scheduler};

/// Deterministic, non-repeating-ish test body.
pub fn body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

const TIMEOUT: Duration = Duration::from_secs(10);

/// Poll until `cond` holds, failing the test after a timeout.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within {TIMEOUT:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll the record for `url` until `pred` accepts it.
pub async fn wait_for(
    scheduler: &Scheduler,
    url: &str,
    pred: impl Fn(&DownloadRecord) -> bool,
) -> DownloadRecord {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        let record = scheduler.get(url).await.unwrap();
        match record {
            Some(r) if pred(&r) => return r,
            other => assert!(
                tokio::time::Instant::now() < deadline,
                "{url} not reached within {TIMEOUT:?}, last: {other:?}"
            ),
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait until the record for `url` has `status`.
pub async fn wait_for_status(scheduler: &Scheduler, url: &str, status: DownloadStatus) -> DownloadRecord {
    wait_for(scheduler, url, |r| r.status == status).await
}
