//! Byte-range planning for segmented downloads.
//!
//! Splits a resource of known length into N contiguous segments; each
//! segment is fetched into its own file and resumed from that file's length.

mod range;

pub use range::{plan_segments, Segment};
