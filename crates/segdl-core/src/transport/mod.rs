//! Connection factory seam between the engine and the network.
//!
//! The engine never speaks HTTP itself: stages ask a [`ConnectionFactory`]
//! for a byte stream for url + headers + optional range, and learn from the
//! [`Response`] whether the server honoured the range. The default factory
//! is libcurl-backed ([`CurlConnectionFactory`]).

mod curl;
mod headers;

pub use self::curl::{CurlConnectionFactory, CurlOptions};
pub use headers::{parse_content_range_total, ResponseHead};

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use thiserror::Error;

/// Inclusive byte range, as in an HTTP `Range: bytes=start-end` header.
/// `end == None` means "to the end of the resource".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    pub fn new(start: u64, end: Option<u64>) -> Self {
        Self { start, end }
    }

    /// Open-ended range starting at `start`.
    pub fn from(start: u64) -> Self {
        Self { start, end: None }
    }

    /// Number of bytes covered, when bounded.
    pub fn len(&self) -> Option<u64> {
        self.end.map(|e| e.saturating_sub(self.start) + 1)
    }

    /// Value for curl's `range` option / the part after `bytes=`.
    pub fn spec(&self) -> String {
        match self.end {
            Some(end) => format!("{}-{}", self.start, end),
            None => format!("{}-", self.start),
        }
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes={}", self.spec())
    }
}

/// An open response: metadata plus a blocking body stream.
pub struct Response {
    pub status: u32,
    /// True if the server answered a range request with partial content (206).
    pub partial: bool,
    /// Total size of the resource (from `Content-Range` for 206, otherwise
    /// `Content-Length`).
    pub total_length: Option<u64>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// Dropping the body aborts the transfer.
    pub body: Box<dyn Read + Send>,
}

impl Response {
    /// Build a response from parsed response headers.
    pub fn from_head(head: ResponseHead, body: Box<dyn Read + Send>) -> Self {
        let partial = head.status == 206;
        let total_length = if partial {
            head.content_range_total
        } else {
            head.content_length
        };
        Self {
            status: head.status,
            partial,
            total_length,
            etag: head.etag,
            last_modified: head.last_modified,
            body,
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("partial", &self.partial)
            .field("total_length", &self.total_length)
            .field("etag", &self.etag)
            .field("last_modified", &self.last_modified)
            .finish_non_exhaustive()
    }
}

/// Transport failure opening or reading a connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("curl: {0}")]
    Curl(#[from] ::curl::Error),

    /// Non-2xx response status.
    #[error("HTTP {0}")]
    Http(u32),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    /// The transfer ended before response headers arrived.
    #[error("connection closed before response headers")]
    Closed,
}

/// Opens byte streams for the engine. Implementations block; the engine
/// calls them from blocking worker threads.
pub trait ConnectionFactory: Send + Sync + 'static {
    fn open(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        range: Option<ByteRange>,
    ) -> Result<Response, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_range_formats() {
        assert_eq!(ByteRange::new(0, Some(99)).to_string(), "bytes=0-99");
        assert_eq!(ByteRange::from(150).to_string(), "bytes=150-");
        assert_eq!(ByteRange::new(100, Some(199)).len(), Some(100));
        assert_eq!(ByteRange::from(5).len(), None);
    }

    #[test]
    fn response_total_from_content_range_when_partial() {
        let head = ResponseHead {
            status: 206,
            content_length: Some(100),
            content_range_total: Some(400),
            etag: Some("v1".to_string()),
            last_modified: None,
        };
        let r = Response::from_head(head, Box::new(std::io::empty()));
        assert!(r.partial);
        assert_eq!(r.total_length, Some(400));

        let head = ResponseHead {
            status: 200,
            content_length: Some(400),
            content_range_total: None,
            etag: None,
            last_modified: None,
        };
        let r = Response::from_head(head, Box::new(std::io::empty()));
        assert!(!r.partial);
        assert_eq!(r.total_length, Some(400));
    }
}
