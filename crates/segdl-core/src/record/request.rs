//! Download request: the caller-supplied template for a download.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Segment count used when the caller does not choose one.
pub const DEFAULT_SEGMENT_COUNT: usize = 3;

/// What to download and where to put it. Kept bound to the record so a
/// paused download can be resumed with the same settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub path: PathBuf,
    pub tag: Option<String>,
    /// Number of byte-range segments; at least 1.
    pub segment_count: usize,
    pub headers: HashMap<String, String>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            path: path.into(),
            tag: None,
            segment_count: DEFAULT_SEGMENT_COUNT,
            headers: HashMap::new(),
        }
    }

    /// Request that saves into `dir` under a name derived from the url path
    /// (last non-empty segment, percent-decoded), or `download.bin`.
    pub fn into_dir(url: impl Into<String>, dir: &Path) -> Self {
        let url = url.into();
        let name = file_name_from_url(&url);
        let path = dir.join(name);
        Self::new(url, path)
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn segments(mut self, count: usize) -> Self {
        self.segment_count = count.max(1);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Name used when the url path yields nothing usable.
const DEFAULT_FILENAME: &str = "download.bin";

fn file_name_from_url(raw: &str) -> String {
    let Ok(parsed) = url::Url::parse(raw) else {
        return DEFAULT_FILENAME.to_string();
    };
    let segment = parsed.path().split('/').filter(|s| !s.is_empty()).last();
    match segment {
        Some(s) if s != "." && s != ".." => s.replace('\\', "_"),
        _ => DEFAULT_FILENAME.to_string(),
    }
}
