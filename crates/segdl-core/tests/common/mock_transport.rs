//! Scripted in-memory connection factory.
//!
//! Serves registered bodies, honouring or ignoring range requests per
//! resource, and can hold streams after a number of bytes until released so
//! tests can act while transfers are in flight.

use std::collections::HashMap;
use std::io::{self, Read};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use segdl_core::transport::ResponseHead;
use segdl_core::{ByteRange, ConnectionFactory, Response, TransportError};

const CHUNK: usize = 1024;

#[derive(Debug, Clone, Copy)]
pub enum RangeMode {
    Honour,
    Ignore,
    /// Honour the first n range requests, then answer with the full body.
    HonourFirst(usize),
}

#[derive(Debug, Clone)]
pub struct Resource {
    pub body: Arc<Vec<u8>>,
    pub ranges: RangeMode,
    /// Total length reported instead of the real one.
    pub advertised_len: Option<u64>,
    /// Each stream serves at most this many bytes while the gate is closed.
    pub hold_after: Option<usize>,
    pub etag: Option<String>,
}

impl Resource {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body: Arc::new(body),
            ranges: RangeMode::Honour,
            advertised_len: None,
            hold_after: None,
            etag: Some("\"v1\"".to_string()),
        }
    }

    pub fn ranges(mut self, mode: RangeMode) -> Self {
        self.ranges = mode;
        self
    }

    pub fn advertise(mut self, len: u64) -> Self {
        self.advertised_len = Some(len);
        self
    }

    pub fn hold_after(mut self, bytes: usize) -> Self {
        self.hold_after = Some(bytes);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opened {
    pub url: String,
    pub range: Option<ByteRange>,
}

#[derive(Debug, Default)]
struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    fn is_open(&self) -> bool {
        *self.open.lock().unwrap()
    }

    fn set(&self, open: bool) {
        *self.open.lock().unwrap() = open;
        self.cv.notify_all();
    }

    fn wait_briefly(&self) {
        let guard = self.open.lock().unwrap();
        if !*guard {
            let _ = self.cv.wait_timeout(guard, Duration::from_millis(5)).unwrap();
        }
    }
}

#[derive(Debug, Default)]
pub struct MockTransport {
    resources: Mutex<HashMap<String, Resource>>,
    log: Mutex<Vec<Opened>>,
    gate: Arc<Gate>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, resource: Resource) {
        self.resources
            .lock()
            .unwrap()
            .insert(url.to_string(), resource);
    }

    /// Let held streams continue.
    pub fn release(&self) {
        self.gate.set(true);
    }

    pub fn hold(&self) {
        self.gate.set(false);
    }

    pub fn opened(&self, url: &str) -> Vec<Option<ByteRange>> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.url == url)
            .map(|o| o.range)
            .collect()
    }
}

impl ConnectionFactory for MockTransport {
    fn open(
        &self,
        url: &str,
        _headers: &HashMap<String, String>,
        range: Option<ByteRange>,
    ) -> Result<Response, TransportError> {
        let range_requests = {
            let mut log = self.log.lock().unwrap();
            log.push(Opened {
                url: url.to_string(),
                range,
            });
            log.iter()
                .filter(|o| o.url == url && o.range.is_some())
                .count()
        };
        let res = self
            .resources
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or(TransportError::Http(404))?;
        let total = res.body.len() as u64;
        let reported = res.advertised_len.unwrap_or(total);
        let honour = match res.ranges {
            RangeMode::Honour => true,
            RangeMode::Ignore => false,
            RangeMode::HonourFirst(n) => range_requests <= n,
        };

        let (status, start, end) = match range {
            Some(r) if honour => {
                let last = r.end.unwrap_or(u64::MAX).min(total.saturating_sub(1));
                if r.start > last {
                    return Err(TransportError::Http(416));
                }
                (206, r.start, last + 1)
            }
            _ => (200, 0, total),
        };
        let head = ResponseHead {
            status,
            content_length: Some(if status == 206 { end - start } else { reported }),
            content_range_total: (status == 206).then_some(reported),
            etag: res.etag.as_ref().map(|e| e.trim_matches('"').to_string()),
            last_modified: None,
        };
        let body = MockBody {
            data: Arc::clone(&res.body),
            pos: start as usize,
            end: end as usize,
            served: 0,
            hold_after: res.hold_after,
            gate: Arc::clone(&self.gate),
        };
        Ok(Response::from_head(head, Box::new(body)))
    }
}

struct MockBody {
    data: Arc<Vec<u8>>,
    pos: usize,
    end: usize,
    served: usize,
    hold_after: Option<usize>,
    gate: Arc<Gate>,
}

impl Read for MockBody {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.end {
            return Ok(0);
        }
        let mut limit = CHUNK;
        if let Some(hold) = self.hold_after {
            if !self.gate.is_open() {
                if self.served >= hold {
                    self.gate.wait_briefly();
                    return Err(io::Error::new(io::ErrorKind::Interrupted, "held"));
                }
                limit = limit.min(hold - self.served);
            }
        }
        let n = out.len().min(limit).min(self.end - self.pos);
        out[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        self.served += n;
        Ok(n)
    }
}
