use crate::error::ErrorCode;
use crate::record::{DownloadRecord, DownloadStatus};

/// Snapshot broadcast on percentage changes and terminal transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub url: String,
    pub completed_size: u64,
    pub content_length: Option<u64>,
    pub status: DownloadStatus,
    pub error_code: ErrorCode,
    pub bytes_per_sec: u64,
}

impl ProgressEvent {
    pub fn from_record(record: &DownloadRecord, bytes_per_sec: u64) -> Self {
        Self {
            url: record.url.clone(),
            completed_size: record.completed_size,
            content_length: record.content_length,
            status: record.status,
            error_code: record.error_code,
            bytes_per_sec,
        }
    }

    /// Floor percentage; `None` while the length is unknown.
    pub fn percent(&self) -> Option<u8> {
        match self.content_length {
            Some(total) if total > 0 => {
                Some((self.completed_size.min(total) * 100 / total) as u8)
            }
            _ => None,
        }
    }

    /// Seconds left at the current rate.
    pub fn eta_secs(&self) -> Option<u64> {
        let total = self.content_length?;
        if self.bytes_per_sec == 0 {
            return None;
        }
        Some(total.saturating_sub(self.completed_size) / self.bytes_per_sec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_and_eta() {
        let mut r = DownloadRecord::new("https://a/x", "/tmp/x", None);
        r.content_length = Some(1000);
        r.completed_size = 250;
        let ev = ProgressEvent::from_record(&r, 250);
        assert_eq!(ev.percent(), Some(25));
        assert_eq!(ev.eta_secs(), Some(3));
        let idle = ProgressEvent::from_record(&r, 0);
        assert_eq!(idle.eta_secs(), None);
    }
}
