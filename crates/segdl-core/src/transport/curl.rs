//! libcurl-backed connection factory.
//!
//! Each `open` runs one curl transfer on its own thread. Header lines are
//! collected until the first body chunk, then parsed and handed back to the
//! caller; body chunks follow over a bounded channel that the returned
//! reader drains. Dropping the reader raises an abort flag that the write
//! and progress callbacks check, which ends the transfer even while the
//! server sends nothing.
//!
//! A read that sees no data within [`READ_POLL`] fails with
//! `ErrorKind::Interrupted` so callers get a chance to check for
//! cancellation before retrying.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::time::Duration;

use curl::easy::{Easy, List};

use super::{ByteRange, ConnectionFactory, Response, ResponseHead, TransportError};
use crate::config::EngineConfig;

/// Body chunks buffered between the transfer thread and the reader.
const CHANNEL_DEPTH: usize = 32;

/// Longest a body read blocks before reporting `Interrupted`.
pub const READ_POLL: Duration = Duration::from_millis(200);

/// Timeouts applied to every transfer.
#[derive(Debug, Clone, Copy)]
pub struct CurlOptions {
    pub connect_timeout: Duration,
    /// Abort when throughput stays below this many bytes/s ...
    pub low_speed_limit: u32,
    /// ... for this long.
    pub low_speed_time: Duration,
}

impl Default for CurlOptions {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl CurlOptions {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs),
            low_speed_limit: cfg.low_speed_limit_bytes,
            low_speed_time: Duration::from_secs(cfg.low_speed_time_secs),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CurlConnectionFactory {
    opts: CurlOptions,
}

impl CurlConnectionFactory {
    pub fn new(opts: CurlOptions) -> Self {
        Self { opts }
    }

    fn build_easy(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        range: Option<ByteRange>,
    ) -> Result<Easy, curl::Error> {
        let mut easy = Easy::new();
        easy.url(url)?;
        easy.progress(true)?;
        easy.follow_location(true)?;
        easy.connect_timeout(self.opts.connect_timeout)?;
        easy.low_speed_limit(self.opts.low_speed_limit)?;
        easy.low_speed_time(self.opts.low_speed_time)?;
        if let Some(range) = range {
            easy.range(&range.spec())?;
        }
        if !headers.is_empty() {
            let mut list = List::new();
            for (k, v) in headers {
                list.append(&format!("{}: {}", k.trim(), v.trim()))?;
            }
            easy.http_headers(list)?;
        }
        Ok(easy)
    }
}

enum Message {
    Head(ResponseHead),
    Data(Vec<u8>),
    Done(Result<(), curl::Error>),
}

impl ConnectionFactory for CurlConnectionFactory {
    fn open(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        range: Option<ByteRange>,
    ) -> Result<Response, TransportError> {
        let easy = self.build_easy(url, headers, range)?;
        let (tx, rx) = mpsc::sync_channel(CHANNEL_DEPTH);
        let abort = Arc::new(AtomicBool::new(false));
        {
            let abort = Arc::clone(&abort);
            std::thread::Builder::new()
                .name("segdl-transfer".to_string())
                .spawn(move || run_transfer(easy, tx, &abort))?;
        }

        match rx.recv() {
            Ok(Message::Head(head)) => {
                if !(200..300).contains(&head.status) {
                    return Err(TransportError::Http(head.status));
                }
                tracing::debug!(url, status = head.status, ?range, "connection opened");
                let body = ChannelReader::new(rx, abort);
                Ok(Response::from_head(head, Box::new(body)))
            }
            Ok(Message::Done(Err(e))) => Err(TransportError::Curl(e)),
            Ok(_) | Err(_) => Err(TransportError::Closed),
        }
    }
}

fn run_transfer(mut easy: Easy, tx: SyncSender<Message>, abort: &AtomicBool) {
    let lines: RefCell<Vec<String>> = RefCell::new(Vec::new());
    let head_sent = Cell::new(false);
    let send_head = || -> bool {
        head_sent.set(true);
        let head = ResponseHead::parse(&lines.borrow());
        tx.send(Message::Head(head)).is_ok()
    };

    let result = perform_streaming(&mut easy, &lines, abort, &|data| {
        if abort.load(Ordering::SeqCst) {
            return false;
        }
        if !head_sent.get() && !send_head() {
            return false;
        }
        tx.send(Message::Data(data.to_vec())).is_ok()
    });
    if abort.load(Ordering::SeqCst) {
        tracing::debug!("transfer aborted by reader");
        return;
    }

    if result.is_ok() && !head_sent.get() && !send_head() {
        return;
    }
    let _ = tx.send(Message::Done(result));
}

/// Run the transfer, collecting header lines of the final response and
/// passing body chunks to `on_data`. `on_data` returning false or `abort`
/// being raised ends the transfer.
fn perform_streaming(
    easy: &mut Easy,
    lines: &RefCell<Vec<String>>,
    abort: &AtomicBool,
    on_data: &dyn Fn(&[u8]) -> bool,
) -> Result<(), curl::Error> {
    let mut transfer = easy.transfer();
    transfer.header_function(|data| {
        let line = String::from_utf8_lossy(data).trim_end().to_string();
        let mut lines = lines.borrow_mut();
        if line.starts_with("HTTP/") {
            lines.clear();
        }
        lines.push(line);
        true
    })?;
    transfer.write_function(|data| Ok(if on_data(data) { data.len() } else { 0 }))?;
    transfer.progress_function(|_, _, _, _| !abort.load(Ordering::SeqCst))?;
    transfer.perform()
}

/// Reader over the transfer thread's body chunks. Dropping it aborts the
/// transfer.
struct ChannelReader {
    rx: Receiver<Message>,
    abort: Arc<AtomicBool>,
    buf: Vec<u8>,
    pos: usize,
    done: bool,
}

impl ChannelReader {
    fn new(rx: Receiver<Message>, abort: Arc<AtomicBool>) -> Self {
        Self {
            rx,
            abort,
            buf: Vec::new(),
            pos: 0,
            done: false,
        }
    }
}

impl Drop for ChannelReader {
    fn drop(&mut self) {
        self.abort.store(true, Ordering::SeqCst);
    }
}

impl Read for ChannelReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.buf.len() {
            if self.done {
                return Ok(0);
            }
            match self.rx.recv_timeout(READ_POLL) {
                Ok(Message::Data(chunk)) => {
                    self.buf = chunk;
                    self.pos = 0;
                }
                Ok(Message::Head(_)) => {}
                Ok(Message::Done(Ok(()))) => self.done = true,
                Ok(Message::Done(Err(e))) => {
                    self.done = true;
                    return Err(io::Error::new(io::ErrorKind::Other, e));
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(
                        io::ErrorKind::Interrupted,
                        "no data yet",
                    ));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.done = true;
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "transfer thread exited without completing",
                    ));
                }
            }
        }
        let n = out.len().min(self.buf.len() - self.pos);
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(messages: Vec<Message>) -> ChannelReader {
        let (tx, rx) = mpsc::sync_channel(messages.len().max(1));
        for m in messages {
            tx.send(m).unwrap();
        }
        ChannelReader::new(rx, Arc::new(AtomicBool::new(false)))
    }

    #[test]
    fn channel_reader_concatenates_chunks() {
        let mut r = reader(vec![
            Message::Data(b"hello ".to_vec()),
            Message::Data(b"world".to_vec()),
            Message::Done(Ok(())),
        ]);
        let mut out = String::new();
        r.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello world");
    }

    #[test]
    fn channel_reader_errors_when_sender_vanishes() {
        let mut r = reader(vec![Message::Data(b"abc".to_vec())]);
        let mut out = Vec::new();
        let err = r.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(out, b"abc");
    }

    #[test]
    fn idle_channel_read_is_interrupted() {
        let (tx, rx) = mpsc::sync_channel(1);
        let mut r = ChannelReader::new(rx, Arc::new(AtomicBool::new(false)));
        let mut out = [0u8; 8];
        let started = std::time::Instant::now();
        let err = r.read(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
        assert!(started.elapsed() < READ_POLL * 5);

        tx.send(Message::Data(b"late".to_vec())).unwrap();
        assert_eq!(r.read(&mut out).unwrap(), 4);
        assert_eq!(&out[..4], b"late");
    }

    #[test]
    fn dropping_reader_raises_abort() {
        let (_tx, rx) = mpsc::sync_channel::<Message>(1);
        let abort = Arc::new(AtomicBool::new(false));
        drop(ChannelReader::new(rx, Arc::clone(&abort)));
        assert!(abort.load(Ordering::SeqCst));
    }

    #[test]
    fn options_follow_config() {
        let cfg = EngineConfig {
            connect_timeout_secs: 5,
            low_speed_limit_bytes: 10,
            low_speed_time_secs: 7,
            ..EngineConfig::default()
        };
        let o = CurlOptions::from_config(&cfg);
        assert_eq!(o.connect_timeout, Duration::from_secs(5));
        assert_eq!(o.low_speed_limit, 10);
        assert_eq!(o.low_speed_time, Duration::from_secs(7));
    }

    #[test]
    fn unreachable_host_is_curl_error() {
        let f = CurlConnectionFactory::new(CurlOptions {
            connect_timeout: Duration::from_secs(2),
            ..CurlOptions::default()
        });
        let err = f
            .open("http://127.0.0.1:1/nothing", &HashMap::new(), None)
            .unwrap_err();
        assert!(matches!(err, TransportError::Curl(_)));
    }
}
