//! Segment queries against a data-quality source.

use std::collections::BTreeMap;

use tracing::debug;

use super::channel::{channel_to_segments, DqChannel, NamedChannels};
use super::types::{Segment, SegmentError, SegmentList, SegmentResult};

/// Source of raw data-quality intervals.
///
/// Implementations may return intervals unsorted, overlapping, or extending
/// past the query window; [`get_segments`] normalises them.
pub trait DataQualitySource: Send + Sync {
    /// Intervals within `[start, stop)` tagged with `flag` for `instrument`.
    ///
    /// Unknown instruments or flags must be reported as
    /// [`SegmentError::UnknownInstrument`] / [`SegmentError::UnknownFlag`].
    fn raw_intervals(
        &self,
        start: i64,
        stop: i64,
        instrument: &str,
        flag: &str,
    ) -> SegmentResult<Vec<Segment>>;
}

/// Query the segments where `flag` is set for `instrument` in `[start, stop)`.
///
/// The result is sorted, coalesced and clipped to the query window. A query
/// with no matching interval yields an empty list.
pub fn get_segments(
    source: &dyn DataQualitySource,
    start: i64,
    stop: i64,
    instrument: &str,
    flag: &str,
) -> SegmentResult<SegmentList> {
    if start >= stop {
        return Err(SegmentError::InvalidRange { start, stop });
    }

    let raw = source.raw_intervals(start, stop, instrument, flag)?;
    let raw_count = raw.len();
    let segments = SegmentList::from_segments(raw).clip(start, stop);

    debug!(
        instrument,
        flag,
        start,
        stop,
        raw_count,
        segments = segments.len(),
        "Resolved data-quality segments"
    );

    Ok(segments)
}

/// One contiguous stretch of decoded data-quality channels.
#[derive(Debug, Clone)]
pub struct DqBlock {
    /// GPS time of the first sample.
    pub gps_start: i64,
    /// DQ sample rate in Hz (1 Hz for GWOSC files).
    pub sample_rate: u32,
    /// Per-flag channels.
    pub channels: NamedChannels,
}

impl DqBlock {
    /// GPS second just past the last sample.
    pub fn gps_stop(&self) -> i64 {
        let samples = self
            .channels
            .names()
            .filter_map(|name| self.channels.get(name))
            .map(<[u32]>::len)
            .max()
            .unwrap_or(0);
        let rate = self.sample_rate.max(1) as usize;
        self.gps_start + samples.div_ceil(rate) as i64
    }

    fn overlaps(&self, start: i64, stop: i64) -> bool {
        self.gps_start < stop && self.gps_stop() > start
    }
}

/// In-memory data-quality source built from decoded channel blocks.
///
/// Stands in for the file archive a loader would scan: each instrument owns
/// a list of blocks and intervals are derived from the requested flag's
/// channel in every block overlapping the query.
#[derive(Debug, Clone, Default)]
pub struct ChannelArchive {
    blocks: BTreeMap<String, Vec<DqBlock>>,
}

impl ChannelArchive {
    /// Create an empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a block for `instrument`.
    pub fn add_block(&mut self, instrument: impl Into<String>, block: DqBlock) {
        self.blocks.entry(instrument.into()).or_default().push(block);
    }

    /// Instruments with at least one block.
    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.blocks.keys().map(String::as_str)
    }
}

impl DataQualitySource for ChannelArchive {
    fn raw_intervals(
        &self,
        start: i64,
        stop: i64,
        instrument: &str,
        flag: &str,
    ) -> SegmentResult<Vec<Segment>> {
        let blocks = self
            .blocks
            .get(instrument)
            .ok_or_else(|| SegmentError::UnknownInstrument(instrument.to_string()))?;

        if !blocks.iter().any(|b| b.channels.contains(flag)) {
            return Err(SegmentError::UnknownFlag {
                instrument: instrument.to_string(),
                flag: flag.to_string(),
            });
        }

        let mut intervals = Vec::new();
        for block in blocks.iter().filter(|b| b.overlaps(start, stop)) {
            let Some(samples) = block.channels.get(flag) else {
                continue;
            };
            let channel = DqChannel::Raw(samples.to_vec());
            let list = channel_to_segments(&channel, block.sample_rate, block.gps_start, None)?;
            intervals.extend(list.iter().copied());
        }

        Ok(intervals)
    }
}
