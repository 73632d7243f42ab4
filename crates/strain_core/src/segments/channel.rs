//! Data-quality channel decoding.
//!
//! A DQ channel is a dense per-sample array where a non-zero value marks a
//! "good" sample. Loaders hand out either a single channel or a map of named
//! flag channels; [`DqChannel`] makes that distinction explicit instead of
//! inspecting the value at runtime.

use std::collections::BTreeMap;
use std::ops::Range;

use super::types::{Segment, SegmentError, SegmentList, SegmentResult};

/// Key selected from a [`NamedChannels`] map when no flag is given.
pub const DEFAULT_CHANNEL_KEY: &str = "DEFAULT";

/// Bit short names of the GWOSC data-quality mask, in bit order.
pub const DQ_SHORT_NAMES: [&str; 7] = [
    "DATA",
    "CBC_CAT1",
    "CBC_CAT2",
    "CBC_CAT3",
    "BURST_CAT1",
    "BURST_CAT2",
    "BURST_CAT3",
];

/// Flag name → per-sample channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamedChannels {
    channels: BTreeMap<String, Vec<u32>>,
}

impl NamedChannels {
    /// Create an empty channel map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a channel.
    pub fn insert(&mut self, name: impl Into<String>, channel: Vec<u32>) {
        self.channels.insert(name.into(), channel);
    }

    /// Look up a channel by flag name.
    pub fn get(&self, name: &str) -> Option<&[u32]> {
        self.channels.get(name).map(Vec::as_slice)
    }

    /// Look up a channel, failing with [`SegmentError::MissingChannel`].
    pub fn require(&self, name: &str) -> SegmentResult<&[u32]> {
        self.get(name)
            .ok_or_else(|| SegmentError::MissingChannel(name.to_string()))
    }

    /// Whether a flag is present.
    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Flag names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    /// Number of flags.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Check if the map holds no flags.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Alias an existing flag as the `"DEFAULT"` channel.
    pub fn with_default(mut self, flag: &str) -> SegmentResult<Self> {
        let channel = self.require(flag)?.to_vec();
        self.channels.insert(DEFAULT_CHANNEL_KEY.to_string(), channel);
        Ok(self)
    }
}

impl<S: Into<String>> FromIterator<(S, Vec<u32>)> for NamedChannels {
    fn from_iter<I: IntoIterator<Item = (S, Vec<u32>)>>(iter: I) -> Self {
        Self {
            channels: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Either a single raw DQ channel or a map of named flag channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DqChannel {
    /// One channel, used as-is.
    Raw(Vec<u32>),
    /// Named channels; selection needs a flag key or a `"DEFAULT"` entry.
    Named(NamedChannels),
}

impl DqChannel {
    /// Resolve the sample array to scan.
    ///
    /// `flag_key` is ignored for [`DqChannel::Raw`]. For a named map it
    /// selects that flag, and without it the `"DEFAULT"` entry is required.
    pub fn select(&self, flag_key: Option<&str>) -> SegmentResult<&[u32]> {
        match self {
            DqChannel::Raw(samples) => Ok(samples),
            DqChannel::Named(map) => map.require(flag_key.unwrap_or(DEFAULT_CHANNEL_KEY)),
        }
    }
}

impl From<Vec<u32>> for DqChannel {
    fn from(samples: Vec<u32>) -> Self {
        DqChannel::Raw(samples)
    }
}

impl From<NamedChannels> for DqChannel {
    fn from(map: NamedChannels) -> Self {
        DqChannel::Named(map)
    }
}

/// Convert a DQ channel into index slices of contiguous non-zero samples.
///
/// Slices are half-open and returned in ascending order, one per maximal
/// run. Index slices do not depend on the sample rate; use
/// [`channel_to_strain_slices`] to index a strain array or
/// [`channel_to_segments`] to get GPS segments.
pub fn channel_to_slices(
    channel: &DqChannel,
    flag_key: Option<&str>,
) -> SegmentResult<Vec<Range<usize>>> {
    let samples = channel.select(flag_key)?;
    Ok(nonzero_runs(samples))
}

/// Convert a one-sample-per-second DQ channel into slices of a strain series
/// sampled at `fs` Hz.
///
/// Each good DQ second `i` covers strain samples `i * fs .. (i + 1) * fs`, so
/// the returned ranges index the strain array the DQ channel was recorded
/// alongside.
pub fn channel_to_strain_slices(
    channel: &DqChannel,
    fs: u32,
    flag_key: Option<&str>,
) -> SegmentResult<Vec<Range<usize>>> {
    if fs == 0 {
        return Err(SegmentError::InvalidSampleRate(fs));
    }
    let rate = fs as usize;

    Ok(channel_to_slices(channel, flag_key)?
        .into_iter()
        .map(|run| run.start * rate..run.end * rate)
        .collect())
}

/// Convert a DQ channel sampled at `fs` Hz, starting at `gps_start`, into a
/// [`SegmentList`] of whole GPS seconds.
///
/// Run starts are floored and run ends ceiled to the enclosing second.
pub fn channel_to_segments(
    channel: &DqChannel,
    fs: u32,
    gps_start: i64,
    flag_key: Option<&str>,
) -> SegmentResult<SegmentList> {
    if fs == 0 {
        return Err(SegmentError::InvalidSampleRate(fs));
    }
    let rate = fs as usize;

    let segments = channel_to_slices(channel, flag_key)?
        .into_iter()
        .map(|run| {
            Segment::new(
                gps_start + (run.start / rate) as i64,
                gps_start + run.end.div_ceil(rate) as i64,
            )
        })
        .collect::<SegmentResult<Vec<_>>>()?;

    Ok(SegmentList::from_segments(segments))
}

/// Split a DQ bitmask into one 0/1 channel per named bit.
///
/// Bit `i` of each mask sample becomes the channel named `short_names[i]`.
pub fn decode_dq_mask<S: AsRef<str>>(mask: &[u32], short_names: &[S]) -> NamedChannels {
    short_names
        .iter()
        .take(u32::BITS as usize)
        .enumerate()
        .map(|(bit, name)| {
            let channel: Vec<u32> = mask.iter().map(|&m| (m >> bit) & 1).collect();
            (name.as_ref().to_string(), channel)
        })
        .collect()
}

/// Single pass over the samples; a zero always closes the current run.
fn nonzero_runs(samples: &[u32]) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut run_start: Option<usize> = None;

    for (idx, &value) in samples.iter().enumerate() {
        match (value != 0, run_start) {
            (true, None) => run_start = Some(idx),
            (false, Some(start)) => {
                runs.push(start..idx);
                run_start = None;
            }
            _ => {}
        }
    }

    if let Some(start) = run_start {
        runs.push(start..samples.len());
    }

    runs
}
