//! `segdl get <url>...` – download and report progress.

use anyhow::{bail, Result};
use segdl_core::{DownloadRequest, DownloadStatus, EngineConfig, ProgressEvent, Scheduler};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

use super::open_store;

pub async fn run_get(
    cfg: EngineConfig,
    urls: &[String],
    dir: &Path,
    segments: Option<usize>,
    tag: Option<&str>,
) -> Result<()> {
    let store = open_store().await?;
    let segments = segments.unwrap_or(cfg.default_segment_count);
    let scheduler = Scheduler::builder(cfg).store(Arc::new(store)).start();
    let mut events = scheduler.subscribe();

    for url in urls {
        let mut request = DownloadRequest::into_dir(url.as_str(), dir).segments(segments);
        if let Some(tag) = tag {
            request = request.tag(tag);
        }
        scheduler.submit(request).await?;
    }

    let mut pending = Pending::new(urls);
    // Catches terminal events lost to a lag before the task had ended.
    let mut recheck = tokio::time::interval(RECHECK_INTERVAL);
    while !pending.is_empty() {
        tokio::select! {
            ev = events.recv() => match ev {
                Ok(ev) => {
                    if pending.observe(&ev) {
                        println!("{}", format_progress(&ev));
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::debug!(skipped = n, "progress events lagged, rechecking");
                    for ev in pending.reconcile(&scheduler).await? {
                        println!("{}", format_progress(&ev));
                    }
                }
                Err(RecvError::Closed) => break,
            },
            _ = recheck.tick() => {
                for ev in pending.reconcile(&scheduler).await? {
                    println!("{}", format_progress(&ev));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!("interrupted, stopping downloads");
                break;
            }
        }
    }

    scheduler.shutdown().await?;
    if pending.failed > 0 {
        bail!("{} download(s) did not finish", pending.failed);
    }
    Ok(())
}

const RECHECK_INTERVAL: Duration = Duration::from_secs(2);

/// Urls still waiting for a terminal status.
pub(crate) struct Pending<'a> {
    urls: HashSet<&'a str>,
    failed: usize,
}

impl<'a> Pending<'a> {
    pub(crate) fn new(urls: &'a [String]) -> Self {
        Self {
            urls: urls.iter().map(String::as_str).collect(),
            failed: 0,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Whether `ev` concerns a pending url; settles it on a terminal status.
    pub(crate) fn observe(&mut self, ev: &ProgressEvent) -> bool {
        if !self.urls.contains(ev.url.as_str()) {
            return false;
        }
        if ev.status.is_terminal() {
            self.urls.remove(ev.url.as_str());
            if ev.status != DownloadStatus::Finished {
                self.failed += 1;
            }
        }
        true
    }

    /// Settle pending urls whose task has ended, from their current
    /// records. Returns the events for the urls settled here.
    pub(crate) async fn reconcile(&mut self, scheduler: &Scheduler) -> Result<Vec<ProgressEvent>> {
        let mut settled = Vec::new();
        let urls: Vec<&'a str> = self.urls.iter().copied().collect();
        for url in urls {
            if scheduler.is_active(url) {
                continue;
            }
            match scheduler.get(url).await? {
                Some(record) if record.status.is_terminal() => {
                    let ev = ProgressEvent::from_record(&record, 0);
                    self.observe(&ev);
                    settled.push(ev);
                }
                Some(_) => {}
                None => {
                    tracing::warn!(url, "record disappeared while downloading");
                    self.urls.remove(url);
                    self.failed += 1;
                }
            }
        }
        Ok(settled)
    }
}

/// One progress line: percent, bytes, status, then speed and ETA while running.
pub(crate) fn format_progress(ev: &ProgressEvent) -> String {
    let percent = ev
        .percent()
        .map(|p| format!("{p:>3}%"))
        .unwrap_or_else(|| "  -%".to_string());
    let total = ev
        .content_length
        .map(|t| t.to_string())
        .unwrap_or_else(|| "?".to_string());
    let mut line = format!(
        "{percent} {}/{total} {}",
        ev.completed_size,
        ev.status.as_str()
    );
    if ev.status == DownloadStatus::Running {
        line.push_str(&format!(" {}/s", human_bytes(ev.bytes_per_sec)));
        if let Some(eta) = ev.eta_secs() {
            line.push_str(&format!(" eta {eta}s"));
        }
    }
    if !ev.error_code.is_none() {
        line.push_str(&format!(" error {}", ev.error_code.as_i32()));
    }
    line.push(' ');
    line.push_str(&ev.url);
    line
}

fn human_bytes(n: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
