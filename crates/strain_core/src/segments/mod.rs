//! Data-quality segment bookkeeping.
//!
//! This module provides:
//! - `Segment` / `SegmentList` interval algebra over integer GPS seconds
//! - Decoding of DQ bitmasks and channels into index slices and segments
//! - Segment queries against an injected data-quality source
//!
//! # Example
//!
//! ```
//! use strain_core::segments::{channel_to_slices, DqChannel};
//!
//! let channel = DqChannel::Raw(vec![1, 1, 0, 1, 1, 1]);
//! let slices = channel_to_slices(&channel, None).unwrap();
//! assert_eq!(slices, vec![0..2, 3..6]);
//! ```

mod channel;
mod query;
mod types;

pub use channel::{
    channel_to_segments, channel_to_slices, channel_to_strain_slices, decode_dq_mask, DqChannel,
    NamedChannels, DEFAULT_CHANNEL_KEY, DQ_SHORT_NAMES,
};
pub use query::{get_segments, ChannelArchive, DataQualitySource, DqBlock};
pub use types::{Segment, SegmentError, SegmentList, SegmentResult};
