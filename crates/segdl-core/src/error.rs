//! Engine error types and the per-download error code channel.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error code carried on a download record.
///
/// Stages report expected failures through this code instead of returning
/// errors across stage boundaries. The first non-`None` code wins for a run;
/// a fresh run clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErrorCode {
    #[default]
    None,
    /// Final file length did not match content length / completed size.
    DownloadFailed,
    /// Renaming or concatenating segment files failed.
    MergeFailed,
    /// Less free space than `min_usable_storage_bytes` at the destination.
    InsufficientStorage,
    /// Transport failure while probing or fetching.
    Network,
    /// Writing a segment or the destination file failed.
    FileIo,
    /// The checksum stage found a digest mismatch.
    ChecksumMismatch,
    /// Code set by a caller-registered stage. `0` and `1001..=1006` belong
    /// to the variants above; build custom codes with [`ErrorCode::custom`]
    /// so those values resolve to them.
    Custom(i32),
}

impl ErrorCode {
    pub fn is_none(self) -> bool {
        self == ErrorCode::None
    }

    /// Integer form stored in the record store.
    pub fn as_i32(self) -> i32 {
        match self {
            ErrorCode::None => 0,
            ErrorCode::DownloadFailed => 1001,
            ErrorCode::MergeFailed => 1002,
            ErrorCode::InsufficientStorage => 1003,
            ErrorCode::Network => 1004,
            ErrorCode::FileIo => 1005,
            ErrorCode::ChecksumMismatch => 1006,
            ErrorCode::Custom(code) => code,
        }
    }

    /// Code for a caller-registered stage. Reserved values map to the engine
    /// variant with that integer form.
    pub fn custom(code: i32) -> Self {
        Self::from_i32(code)
    }

    /// Same code in the form it takes after a store round trip.
    pub fn normalized(self) -> Self {
        Self::from_i32(self.as_i32())
    }

    pub fn from_i32(code: i32) -> Self {
        match code {
            0 => ErrorCode::None,
            1001 => ErrorCode::DownloadFailed,
            1002 => ErrorCode::MergeFailed,
            1003 => ErrorCode::InsufficientStorage,
            1004 => ErrorCode::Network,
            1005 => ErrorCode::FileIo,
            1006 => ErrorCode::ChecksumMismatch,
            other => ErrorCode::Custom(other),
        }
    }
}

/// Errors returned by the scheduler's control API.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The scheduler was shut down; no new work is accepted.
    #[error("download engine is shut down")]
    ShutDown,

    /// The record store failed.
    #[error("record store: {0:#}")]
    Store(#[from] anyhow::Error),

    /// Filesystem cleanup failed.
    #[error("file system: {0}")]
    Io(#[from] std::io::Error),
}
