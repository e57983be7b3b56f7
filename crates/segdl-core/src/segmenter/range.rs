//! Segment type and range planning.

use crate::transport::ByteRange;

/// One planned segment: byte range [start, end) (half-open) of the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub index: usize,
    /// Start offset (inclusive).
    pub start: u64,
    /// End offset (exclusive).
    pub end: u64,
}

impl Segment {
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Range still to fetch when `done` bytes of this segment are already on
    /// disk; `None` once the segment is complete.
    pub fn remaining(&self, done: u64) -> Option<ByteRange> {
        if done >= self.len() {
            return None;
        }
        Some(ByteRange::new(self.start + done, Some(self.end - 1)))
    }
}

/// Builds a segment plan for a given total size and segment count.
///
/// Segments are as equal as possible; the first `total % n` segments are one
/// byte longer. The count is capped at `total_size` so no segment is empty.
/// Returns an empty vec if `total_size` or `segment_count` is 0.
pub fn plan_segments(total_size: u64, segment_count: usize) -> Vec<Segment> {
    if total_size == 0 || segment_count == 0 {
        return Vec::new();
    }

    let count = (segment_count as u64).min(total_size);
    let base = total_size / count;
    let remainder = total_size % count;

    let mut out = Vec::with_capacity(count as usize);
    let mut offset = 0u64;
    for i in 0..count {
        let len = base + u64::from(i < remainder);
        out.push(Segment {
            index: i as usize,
            start: offset,
            end: offset + len,
        });
        offset += len;
    }
    out
}
