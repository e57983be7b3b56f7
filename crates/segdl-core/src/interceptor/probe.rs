//! Storage headroom check and resumability probe.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use super::{Chain, Interceptor};
use crate::error::ErrorCode;
use crate::record::{CacheEntry, DownloadRecord};
use crate::storage;
use crate::transport::{ByteRange, Response, TransportError};

/// Checks free space at the destination, then opens `bytes=0-` to learn the
/// content length, validators and whether ranges are honoured. A server
/// that ignores the range downgrades the task to a single stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProbeInterceptor;

#[async_trait]
impl Interceptor for ProbeInterceptor {
    async fn intercept(&self, chain: Chain<'_>) -> DownloadRecord {
        let task = Arc::clone(chain.task());
        if task.is_destroyed() {
            return task.download().snapshot().await;
        }
        {
            let st = task.download().lock().await;
            if st.has_error() {
                return st.record.clone();
            }
        }

        let dest = chain.request().path.clone();
        let parent = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();
        if let Err(e) = tokio::fs::create_dir_all(&parent).await {
            tracing::warn!(path = %parent.display(), "create destination dir: {e}");
            return fail(&chain, ErrorCode::FileIo).await;
        }

        let min_free = task.context().config.min_usable_storage_bytes;
        if let Some(free) = storage::available_space(&parent) {
            if free < min_free {
                tracing::warn!(free, min_free, path = %parent.display(), "insufficient storage");
                return fail(&chain, ErrorCode::InsufficientStorage).await;
            }
        }

        let probe = match open_probe(&chain).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(url = %chain.request().url, "probe failed: {e}");
                return fail(&chain, ErrorCode::Network).await;
            }
        };
        tracing::debug!(url = %chain.request().url, ?probe, "probe response");

        let ranged = probe.partial;
        {
            let mut st = task.download().lock().await;
            if probe.total_length != st.record.content_length {
                if st.record.content_length.is_some() {
                    tracing::info!(
                        url = %st.record.url,
                        old = ?st.record.content_length,
                        new = ?probe.total_length,
                        "content length changed, restarting"
                    );
                    if let Err(e) = storage::remove_dir_if_exists(&st.record.temp_dir).await {
                        tracing::warn!(path = %st.record.temp_dir.display(), "remove temp dir: {e}");
                    }
                }
                st.record.completed_size = 0;
                st.record.content_length = probe.total_length;
                st.last_percent = st.record.percent();
            }
            st.supports_range = ranged;
            st.cache = Some(CacheEntry {
                url: st.record.url.clone(),
                etag: probe.etag.clone(),
                last_modified: probe.last_modified.clone(),
            });
        }
        if !ranged {
            task.downgrade().await;
        }
        chain.proceed().await
    }
}

/// Open the probe connection on a blocking thread and drop the body right
/// away, which aborts the transfer.
async fn open_probe(chain: &Chain<'_>) -> Result<Response, TransportError> {
    let connector = Arc::clone(&chain.task().context().connector);
    let url = chain.request().url.clone();
    let headers = chain.request().headers.clone();
    let joined = tokio::task::spawn_blocking(move || {
        connector.open(&url, &headers, Some(ByteRange::from(0))).map(|mut r| {
            r.body = Box::new(std::io::empty());
            r
        })
    })
    .await;
    match joined {
        Ok(result) => result,
        Err(e) => Err(TransportError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            e.to_string(),
        ))),
    }
}

async fn fail(chain: &Chain<'_>, code: ErrorCode) -> DownloadRecord {
    let task = chain.task();
    let mut st = task.download().lock().await;
    task.fail(&mut st, code);
    st.record.clone()
}
