//! Parse HTTP response header lines into a ResponseHead.

/// Status and the headers the engine cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u32,
    pub content_length: Option<u64>,
    /// Total length from `Content-Range: bytes a-b/total`.
    pub content_range_total: Option<u64>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl ResponseHead {
    /// Parse collected header lines. When redirects were followed, only the
    /// lines after the last status line count.
    pub fn parse(lines: &[String]) -> Self {
        let start = lines
            .iter()
            .rposition(|l| l.starts_with("HTTP/"))
            .unwrap_or(0);
        let mut head = ResponseHead::default();
        for line in &lines[start..] {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with("HTTP/") {
                head.status = line
                    .split_whitespace()
                    .nth(1)
                    .and_then(|c| c.parse().ok())
                    .unwrap_or(0);
                continue;
            }
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                head.content_length = value.parse::<u64>().ok();
            } else if name.eq_ignore_ascii_case("content-range") {
                head.content_range_total = parse_content_range_total(value);
            } else if name.eq_ignore_ascii_case("etag") {
                head.etag = Some(value.trim_matches('"').to_string());
            } else if name.eq_ignore_ascii_case("last-modified") {
                head.last_modified = Some(value.to_string());
            }
        }
        head
    }
}

/// Total from a `Content-Range` value (`bytes 0-99/400` → 400). `*` → None.
pub fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.trim().rsplit_once('/')?;
    total.trim().parse::<u64>().ok()
}
