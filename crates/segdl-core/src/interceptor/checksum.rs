//! Optional SHA-256 verification of a finished artifact.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use super::{Chain, Interceptor};
use crate::error::ErrorCode;
use crate::record::{DownloadRecord, DownloadStatus};

const BUF_SIZE: usize = 64 * 1024;

/// Compute SHA-256 of a file as lowercase hex, reading in chunks.
pub fn sha256_path(path: &Path) -> Result<String> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = f
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// User stage that checks the digest of every download that finishes.
/// A mismatch fails the download with `ChecksumMismatch`.
#[derive(Debug, Clone)]
pub struct ChecksumInterceptor {
    expected: Vec<(String, String)>,
}

impl ChecksumInterceptor {
    /// Verify the download of `url` against the hex digest `sha256`.
    pub fn sha256(url: impl Into<String>, sha256: impl Into<String>) -> Self {
        Self {
            expected: vec![(url.into(), sha256.into().to_ascii_lowercase())],
        }
    }

    pub fn with(mut self, url: impl Into<String>, sha256: impl Into<String>) -> Self {
        self.expected
            .push((url.into(), sha256.into().to_ascii_lowercase()));
        self
    }

    fn expected_for(&self, url: &str) -> Option<&str> {
        self.expected
            .iter()
            .find(|(u, _)| u == url)
            .map(|(_, d)| d.as_str())
    }
}

#[async_trait]
impl Interceptor for ChecksumInterceptor {
    async fn intercept(&self, chain: Chain<'_>) -> DownloadRecord {
        let expected = self.expected_for(&chain.request().url).map(str::to_string);
        let mut result = chain.proceed().await;
        let Some(expected) = expected else {
            return result;
        };
        if result.status != DownloadStatus::Finished {
            return result;
        }
        let path: PathBuf = result.path.clone();
        let actual = tokio::task::spawn_blocking(move || sha256_path(&path)).await;
        match actual {
            Ok(Ok(digest)) if digest == expected => {
                tracing::debug!(url = %result.url, "checksum verified");
            }
            Ok(Ok(digest)) => {
                tracing::warn!(url = %result.url, %expected, actual = %digest, "checksum mismatch");
                result.error_code = ErrorCode::ChecksumMismatch;
            }
            Ok(Err(e)) => {
                tracing::warn!(url = %result.url, "checksum: {e:#}");
                result.error_code = ErrorCode::ChecksumMismatch;
            }
            Err(e) => {
                tracing::warn!(url = %result.url, "checksum worker: {e}");
                result.error_code = ErrorCode::ChecksumMismatch;
            }
        }
        result
    }
}
