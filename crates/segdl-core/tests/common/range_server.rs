//! Minimal HTTP/1.1 server supporting Range GET for curl-backed tests.
//!
//! Serves a single static body at `/file.bin`; every other path is a 404.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RangeServerOptions {
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    /// Send an `ETag` header.
    pub etag: bool,
    /// Send only this many body bytes, then keep the connection open
    /// without sending anything more.
    pub stall_after: Option<usize>,
}

impl Default for RangeServerOptions {
    fn default() -> Self {
        Self {
            support_ranges: true,
            etag: true,
            stall_after: None,
        }
    }
}

/// Starts a server in a background thread serving `body`. Returns the file
/// URL (e.g. "http://127.0.0.1:12345/file.bin"). Runs until the process exits.
pub fn start(body: Vec<u8>) -> String {
    start_with_options(body, RangeServerOptions::default())
}

pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            thread::spawn(move || handle(stream, &body, opts));
        }
    });
    format!("http://127.0.0.1:{port}/file.bin")
}

fn handle(mut stream: TcpStream, body: &[u8], opts: RangeServerOptions) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(request) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let (method, path, range) = parse_request(request);
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
        return;
    }
    if path != "/file.bin" {
        let _ = stream.write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");
        return;
    }

    let total = body.len() as u64;
    let mut headers = String::new();
    if opts.etag {
        headers.push_str("ETag: \"segdl-test\"\r\n");
    }
    let (status, slice) = match range.filter(|_| opts.support_ranges) {
        Some((start, end_incl)) => {
            let end_incl = end_incl.min(total.saturating_sub(1));
            if start > end_incl {
                headers.push_str(&format!("Content-Range: bytes */{total}\r\n"));
                ("416 Range Not Satisfiable", &body[0..0])
            } else {
                headers.push_str("Accept-Ranges: bytes\r\n");
                headers.push_str(&format!("Content-Range: bytes {start}-{end_incl}/{total}\r\n"));
                ("206 Partial Content", &body[start as usize..=end_incl as usize])
            }
        }
        None => ("200 OK", body),
    };
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Length: {}\r\n{headers}\r\n",
        slice.len()
    );
    let _ = stream.write_all(response.as_bytes());
    match opts.stall_after {
        Some(n) if n < slice.len() => {
            let _ = stream.write_all(&slice[..n]);
            let _ = stream.flush();
            thread::sleep(Duration::from_secs(60));
        }
        _ => {
            let _ = stream.write_all(slice);
        }
    }
}

/// Returns (method, path, optional (start, end_inclusive) for `Range: bytes=X-Y`).
fn parse_request(request: &str) -> (&str, &str, Option<(u64, u64)>) {
    let mut lines = request.lines();
    let mut first = lines.next().unwrap_or("").split_whitespace();
    let method = first.next().unwrap_or("");
    let path = first.next().unwrap_or("");
    let mut range = None;
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if !name.trim().eq_ignore_ascii_case("range") {
            continue;
        }
        let value = value.trim();
        if let Some(spec) = value.strip_prefix("bytes=") {
            if let Some((a, b)) = spec.split_once('-') {
                let start = a.trim().parse::<u64>().unwrap_or(0);
                let end = b.trim();
                let end_incl = if end.is_empty() {
                    u64::MAX
                } else {
                    end.parse::<u64>().unwrap_or(0)
                };
                range = Some((start, end_incl));
            }
        }
    }
    (method, path, range)
}
