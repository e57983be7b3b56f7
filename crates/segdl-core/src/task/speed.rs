//! Sliding-window byte rate.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

/// Bytes per second over the most recent window of samples.
#[derive(Debug)]
pub struct ThroughputMonitor {
    window: Duration,
    samples: VecDeque<(Instant, u64)>,
    in_window: u64,
}

impl Default for ThroughputMonitor {
    fn default() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }
}

impl ThroughputMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window: window.max(Duration::from_millis(1)),
            samples: VecDeque::new(),
            in_window: 0,
        }
    }

    pub fn record(&mut self, bytes: u64) {
        self.record_at(Instant::now(), bytes);
    }

    pub fn record_at(&mut self, now: Instant, bytes: u64) {
        self.samples.push_back((now, bytes));
        self.in_window += bytes;
        self.expire(now);
    }

    pub fn bytes_per_sec(&mut self) -> u64 {
        self.bytes_per_sec_at(Instant::now())
    }

    pub fn bytes_per_sec_at(&mut self, now: Instant) -> u64 {
        self.expire(now);
        (self.in_window as f64 / self.window.as_secs_f64()) as u64
    }

    fn expire(&mut self, now: Instant) {
        while let Some(&(at, bytes)) = self.samples.front() {
            if now.saturating_duration_since(at) <= self.window {
                break;
            }
            self.samples.pop_front();
            self.in_window -= bytes;
        }
    }
}
