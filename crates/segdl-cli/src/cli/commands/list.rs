//! `segdl list` – show known downloads.

use anyhow::Result;
use segdl_core::{DownloadRecord, RecordStore};

use super::open_store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFilter {
    All,
    Finished,
    Unfinished,
}

impl ListFilter {
    pub fn from_flags(finished: bool, unfinished: bool) -> Self {
        match (finished, unfinished) {
            (true, _) => ListFilter::Finished,
            (false, true) => ListFilter::Unfinished,
            (false, false) => ListFilter::All,
        }
    }

    fn keeps(self, record: &DownloadRecord) -> bool {
        match self {
            ListFilter::All => true,
            ListFilter::Finished => record.finished,
            ListFilter::Unfinished => !record.finished,
        }
    }
}

pub async fn run_list(tag: Option<&str>, filter: ListFilter) -> Result<()> {
    let store = open_store().await?;
    let records = match tag {
        Some(tag) => store.list_by_tag(tag).await?,
        None => store.list().await?,
    };
    store.close().await?;

    let records: Vec<DownloadRecord> = records.into_iter().filter(|r| filter.keeps(r)).collect();
    if records.is_empty() {
        println!("No downloads.");
        return Ok(());
    }
    println!("{:<9} {:>5} {:<6} {:<12} {}", "STATUS", "%", "ERROR", "SIZE", "URL");
    for r in records {
        let percent = r
            .percent()
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        let size = r
            .content_length
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let error = if r.error_code.is_none() {
            "-".to_string()
        } else {
            r.error_code.as_i32().to_string()
        };
        println!(
            "{:<9} {:>5} {:<6} {:<12} {}",
            r.status.as_str(),
            percent,
            error,
            size,
            r.url
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_from_flags() {
        assert_eq!(ListFilter::from_flags(false, false), ListFilter::All);
        assert_eq!(ListFilter::from_flags(true, false), ListFilter::Finished);
        assert_eq!(ListFilter::from_flags(false, true), ListFilter::Unfinished);
    }

    #[test]
    fn filter_keeps_by_finished_flag() {
        let mut r = DownloadRecord::new("https://example.com/a", "/tmp/a", None);
        assert!(ListFilter::Unfinished.keeps(&r));
        assert!(!ListFilter::Finished.keeps(&r));
        r.finished = true;
        assert!(ListFilter::Finished.keeps(&r));
        assert!(ListFilter::All.keeps(&r));
    }
}
