//! Blocking fetch workers. They poll their cancel flag before opening a
//! connection and between chunks; dropping the response aborts the transfer.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::ErrorCode;
use crate::record::DownloadRequest;
use crate::segmenter::Segment;
use crate::storage;
use crate::task::DownloadTask;
use crate::transport::{ConnectionFactory, Response};

const BUF_SIZE: usize = 64 * 1024;

#[derive(Debug)]
pub(super) enum Outcome {
    /// Finished; bytes written by this worker.
    Done(u64),
    Cancelled,
    /// The server answered a range request with the whole body.
    RangeIgnored,
    Failed { code: ErrorCode, reason: String },
}

fn failed(code: ErrorCode, reason: impl std::fmt::Display) -> Outcome {
    Outcome::Failed {
        code,
        reason: reason.to_string(),
    }
}

struct Cancel<'a> {
    task: &'a DownloadTask,
    flag: &'a AtomicBool,
}

impl Cancel<'_> {
    fn is_set(&self) -> bool {
        self.task.is_destroyed() || self.flag.load(Ordering::SeqCst)
    }
}

/// Fetch the missing tail of one segment, appending to its file.
pub(super) fn fetch_segment(
    task: &DownloadTask,
    connector: &dyn ConnectionFactory,
    request: &DownloadRequest,
    segment: &Segment,
    path: &Path,
    flag: &AtomicBool,
) -> Outcome {
    let cancel = Cancel { task, flag };
    if cancel.is_set() {
        return Outcome::Cancelled;
    }
    let mut done = storage::file_len(path);
    if done > segment.len() {
        let truncated = OpenOptions::new()
            .write(true)
            .open(path)
            .and_then(|f| f.set_len(segment.len()));
        if let Err(e) = truncated {
            return failed(ErrorCode::FileIo, format!("truncate {}: {e}", path.display()));
        }
        done = segment.len();
    }
    let Some(range) = segment.remaining(done) else {
        return Outcome::Done(0);
    };

    let response = match connector.open(&request.url, &request.headers, Some(range)) {
        Ok(r) => r,
        Err(_) if cancel.is_set() => return Outcome::Cancelled,
        Err(e) => return failed(ErrorCode::Network, format!("open {range}: {e}")),
    };
    if !response.partial {
        return Outcome::RangeIgnored;
    }
    let file = match OpenOptions::new().create(true).append(true).open(path) {
        Ok(f) => f,
        Err(_) if cancel.is_set() => return Outcome::Cancelled,
        Err(e) => return failed(ErrorCode::FileIo, format!("open {}: {e}", path.display())),
    };
    let remaining = segment.len() - done;
    match copy_body(&cancel, response, file, Some(remaining)) {
        Ok(Some(written)) if written == remaining => Outcome::Done(written),
        Ok(Some(written)) => failed(
            ErrorCode::Network,
            format!("segment {} ended {} bytes short", segment.index, remaining - written),
        ),
        Ok(None) => Outcome::Cancelled,
        Err(_) if cancel.is_set() => Outcome::Cancelled,
        Err(e) => e,
    }
}

/// Stream the whole resource into `dest`, truncating it first.
pub(super) fn fetch_single(
    task: &DownloadTask,
    connector: &dyn ConnectionFactory,
    request: &DownloadRequest,
    dest: &Path,
    flag: &AtomicBool,
) -> Outcome {
    let cancel = Cancel { task, flag };
    if cancel.is_set() {
        return Outcome::Cancelled;
    }
    let response = match connector.open(&request.url, &request.headers, None) {
        Ok(r) => r,
        Err(_) if cancel.is_set() => return Outcome::Cancelled,
        Err(e) => return failed(ErrorCode::Network, format!("open: {e}")),
    };
    if let Some(total) = response.total_length {
        let mut st = task.download().blocking_lock();
        if st.record.content_length.is_none() {
            st.record.content_length = Some(total);
        }
    }
    let file = match File::create(dest) {
        Ok(f) => f,
        Err(e) => return failed(ErrorCode::FileIo, format!("create {}: {e}", dest.display())),
    };
    match copy_body(&cancel, response, file, None) {
        Ok(Some(written)) => Outcome::Done(written),
        Ok(None) => Outcome::Cancelled,
        Err(_) if cancel.is_set() => Outcome::Cancelled,
        Err(e) => e,
    }
}

/// Copy the body into `out`, reporting progress per chunk. `Ok(None)` means
/// cancelled. At most `limit` bytes are written when given.
fn copy_body(
    cancel: &Cancel<'_>,
    mut response: Response,
    mut out: File,
    limit: Option<u64>,
) -> Result<Option<u64>, Outcome> {
    let mut buf = vec![0u8; BUF_SIZE];
    let mut written = 0u64;
    loop {
        if limit.is_some_and(|l| written >= l) {
            break;
        }
        if cancel.is_set() {
            return Ok(None);
        }
        let n = match response.body.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(failed(ErrorCode::Network, format!("read: {e}"))),
        };
        let n = match limit {
            Some(l) => n.min((l - written) as usize),
            None => n,
        };
        if let Err(e) = out.write_all(&buf[..n]) {
            return Err(failed(ErrorCode::FileIo, format!("write: {e}")));
        }
        written += n as u64;
        if !cancel.task.on_download(cancel.flag, n as u64) {
            return Ok(None);
        }
    }
    if let Err(e) = out.sync_data() {
        return Err(failed(ErrorCode::FileIo, format!("sync: {e}")));
    }
    Ok(Some(written))
}
