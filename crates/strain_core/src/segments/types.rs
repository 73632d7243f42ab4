//! Segment and segment-list types.

use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize};

/// A half-open `[start, stop)` interval of integer GPS seconds.
///
/// `start < stop` always holds. Deserialization goes through [`Segment::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Segment {
    start: i64,
    stop: i64,
}

impl<'de> Deserialize<'de> for Segment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct RawSegment {
            start: i64,
            stop: i64,
        }

        let raw = RawSegment::deserialize(deserializer)?;
        Segment::new(raw.start, raw.stop).map_err(de::Error::custom)
    }
}

impl Segment {
    /// Create a segment, rejecting empty or inverted intervals.
    pub fn new(start: i64, stop: i64) -> SegmentResult<Self> {
        if start >= stop {
            return Err(SegmentError::InvalidSegment { start, stop });
        }
        Ok(Self { start, stop })
    }

    /// First GPS second covered.
    pub fn start(&self) -> i64 {
        self.start
    }

    /// First GPS second no longer covered.
    pub fn stop(&self) -> i64 {
        self.stop
    }

    /// Length of the segment in seconds.
    pub fn duration(&self) -> i64 {
        self.stop - self.start
    }

    /// Whether `gps` falls inside the segment.
    pub fn contains(&self, gps: i64) -> bool {
        gps >= self.start && gps < self.stop
    }

    /// Overlap of two segments, if any.
    pub fn intersection(&self, other: &Segment) -> Option<Segment> {
        let start = self.start.max(other.start);
        let stop = self.stop.min(other.stop);
        (start < stop).then_some(Segment { start, stop })
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.stop)
    }
}

/// Sorted list of disjoint segments.
///
/// Every constructor sorts its input and coalesces overlapping or touching
/// segments, so `segments[i].stop < segments[i + 1].start` always holds.
/// There is no API to mutate a list in place, and deserialization also goes
/// through [`SegmentList::from_segments`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Segment>", into = "Vec<Segment>")]
pub struct SegmentList {
    segments: Vec<Segment>,
}

impl SegmentList {
    /// Create an empty segment list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list from arbitrary (unsorted, possibly overlapping) segments.
    pub fn from_segments(segments: impl IntoIterator<Item = Segment>) -> Self {
        let mut segments: Vec<Segment> = segments.into_iter().collect();
        segments.sort_unstable();

        let mut merged: Vec<Segment> = Vec::with_capacity(segments.len());
        for seg in segments {
            match merged.last_mut() {
                Some(last) if seg.start <= last.stop => {
                    last.stop = last.stop.max(seg.stop);
                }
                _ => merged.push(seg),
            }
        }

        Self { segments: merged }
    }

    /// Parse the plain-text segment file layout.
    ///
    /// Each non-comment line holds either `start stop` or
    /// `id start stop duration`. Lines starting with `#` and blank lines are
    /// skipped.
    pub fn parse(text: &str) -> SegmentResult<Self> {
        let mut segments = Vec::new();

        for (idx, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let line_no = idx + 1;
            let fields: Vec<&str> = line.split_whitespace().collect();
            let (start, stop) = match fields.as_slice() {
                [start, stop] => (*start, *stop),
                [_id, start, stop, _duration] => (*start, *stop),
                _ => {
                    return Err(SegmentError::Parse {
                        line: line_no,
                        message: format!("expected 2 or 4 columns, found {}", fields.len()),
                    })
                }
            };

            let start = parse_gps(start, line_no)?;
            let stop = parse_gps(stop, line_no)?;
            segments.push(Segment::new(start, stop)?);
        }

        Ok(Self::from_segments(segments))
    }

    /// The segments, in ascending order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Check if the list holds no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Iterate over the segments in ascending order.
    pub fn iter(&self) -> std::slice::Iter<'_, Segment> {
        self.segments.iter()
    }

    /// Total number of seconds covered.
    pub fn total_duration(&self) -> i64 {
        self.segments.iter().map(Segment::duration).sum()
    }

    /// Whether any segment contains `gps`.
    pub fn contains(&self, gps: i64) -> bool {
        // First segment whose stop is past gps is the only candidate.
        let idx = self.segments.partition_point(|s| s.stop <= gps);
        self.segments.get(idx).is_some_and(|s| s.contains(gps))
    }

    /// Restrict the list to `[start, stop)`.
    pub fn clip(&self, start: i64, stop: i64) -> SegmentList {
        let Ok(window) = Segment::new(start, stop) else {
            return SegmentList::new();
        };
        Self {
            segments: self
                .segments
                .iter()
                .filter_map(|s| s.intersection(&window))
                .collect(),
        }
    }

    /// Times covered by both lists.
    pub fn intersection(&self, other: &SegmentList) -> SegmentList {
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);

        while i < self.segments.len() && j < other.segments.len() {
            let a = self.segments[i];
            let b = other.segments[j];
            if let Some(overlap) = a.intersection(&b) {
                out.push(overlap);
            }
            if a.stop <= b.stop {
                i += 1;
            } else {
                j += 1;
            }
        }

        Self { segments: out }
    }

    /// Times covered by either list.
    pub fn union(&self, other: &SegmentList) -> SegmentList {
        Self::from_segments(self.segments.iter().chain(other.segments.iter()).copied())
    }
}

impl From<Vec<Segment>> for SegmentList {
    fn from(segments: Vec<Segment>) -> Self {
        Self::from_segments(segments)
    }
}

impl From<SegmentList> for Vec<Segment> {
    fn from(list: SegmentList) -> Self {
        list.segments
    }
}

impl<'a> IntoIterator for &'a SegmentList {
    type Item = &'a Segment;
    type IntoIter = std::slice::Iter<'a, Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}

fn parse_gps(field: &str, line: usize) -> SegmentResult<i64> {
    // Segment files occasionally carry GPS times as "1126259446.0".
    if let Ok(v) = field.parse::<i64>() {
        return Ok(v);
    }
    match field.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 => Ok(v as i64),
        _ => Err(SegmentError::Parse {
            line,
            message: format!("invalid GPS time '{}'", field),
        }),
    }
}

/// Error types for segment and data-quality operations.
#[derive(Debug, thiserror::Error)]
pub enum SegmentError {
    /// The data-quality source has no record of this instrument.
    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    /// The instrument exists but does not carry this flag.
    #[error("Unknown flag '{flag}' for instrument {instrument}")]
    UnknownFlag { instrument: String, flag: String },

    /// A named channel map lacks the requested key.
    #[error("Missing channel: '{0}'")]
    MissingChannel(String),

    /// A segment with `start >= stop`.
    #[error("Invalid segment [{start}, {stop})")]
    InvalidSegment { start: i64, stop: i64 },

    /// A query range with `start >= stop`.
    #[error("Invalid query range [{start}, {stop})")]
    InvalidRange { start: i64, stop: i64 },

    /// Sample rate of zero.
    #[error("Invalid data-quality sample rate: {0} Hz")]
    InvalidSampleRate(u32),

    /// Malformed segment text.
    #[error("Segment parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Failure reported by an external data-quality source.
    #[error("Data-quality source error: {0}")]
    Source(String),
}

impl SegmentError {
    /// Whether this is a failed lookup of an instrument, flag or channel key.
    pub fn is_lookup(&self) -> bool {
        matches!(
            self,
            SegmentError::UnknownInstrument(_)
                | SegmentError::UnknownFlag { .. }
                | SegmentError::MissingChannel(_)
        )
    }
}

/// Type alias for segment results.
pub type SegmentResult<T> = Result<T, SegmentError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: i64, stop: i64) -> Segment {
        Segment::new(start, stop).unwrap()
    }

    #[test]
    fn segment_rejects_empty_interval() {
        assert!(matches!(
            Segment::new(10, 10),
            Err(SegmentError::InvalidSegment { start: 10, stop: 10 })
        ));
        assert!(Segment::new(11, 10).is_err());
    }

    #[test]
    fn from_segments_sorts_and_merges() {
        let list = SegmentList::from_segments(vec![seg(20, 30), seg(0, 5), seg(3, 8), seg(8, 10)]);
        assert_eq!(list.segments(), &[seg(0, 10), seg(20, 30)]);
        assert_eq!(list.total_duration(), 20);
    }

    #[test]
    fn contains_respects_half_open_bounds() {
        let list = SegmentList::from_segments(vec![seg(0, 10), seg(20, 30)]);
        assert!(list.contains(0));
        assert!(list.contains(9));
        assert!(!list.contains(10));
        assert!(list.contains(25));
        assert!(!list.contains(30));
        assert!(!list.contains(-1));
    }

    #[test]
    fn clip_trims_to_window() {
        let list = SegmentList::from_segments(vec![seg(0, 10), seg(20, 30), seg(40, 50)]);
        let clipped = list.clip(5, 25);
        assert_eq!(clipped.segments(), &[seg(5, 10), seg(20, 25)]);
        assert!(list.clip(10, 20).is_empty());
    }

    #[test]
    fn intersection_and_union() {
        let a = SegmentList::from_segments(vec![seg(0, 10), seg(20, 30)]);
        let b = SegmentList::from_segments(vec![seg(5, 25)]);

        assert_eq!(a.intersection(&b).segments(), &[seg(5, 10), seg(20, 25)]);
        assert_eq!(a.union(&b).segments(), &[seg(0, 30)]);
    }

    #[test]
    fn parse_accepts_two_and_four_columns() {
        let text = "# seg start stop duration\n\
                    0 1126259446 1126259460 14\n\
                    \n\
                    1126259470 1126259478\n";
        let list = SegmentList::parse(text).unwrap();
        assert_eq!(
            list.segments(),
            &[seg(1126259446, 1126259460), seg(1126259470, 1126259478)]
        );
    }

    #[test]
    fn parse_reports_line_number() {
        let err = SegmentList::parse("0 10\n1 2 3\n").unwrap_err();
        assert!(matches!(err, SegmentError::Parse { line: 2, .. }));
    }

    #[test]
    fn deserialized_list_is_sorted_and_merged() {
        let list: SegmentList = serde_json::from_str(
            r#"[{"start":30,"stop":40},{"start":0,"stop":50},{"start":60,"stop":70}]"#,
        )
        .unwrap();
        assert_eq!(list.segments(), &[seg(0, 50), seg(60, 70)]);

        let json = serde_json::to_string(&list).unwrap();
        assert_eq!(json, r#"[{"start":0,"stop":50},{"start":60,"stop":70}]"#);
    }

    #[test]
    fn deserialize_rejects_empty_or_inverted_segments() {
        assert!(serde_json::from_str::<Segment>(r#"{"start":7,"stop":7}"#).is_err());
        assert!(serde_json::from_str::<Segment>(r#"{"start":10,"stop":0}"#).is_err());
        assert!(serde_json::from_str::<SegmentList>(
            r#"[{"start":30,"stop":40},{"start":7,"stop":7}]"#
        )
        .is_err());

        let ok: Segment = serde_json::from_str(r#"{"start":3,"stop":9}"#).unwrap();
        assert_eq!((ok.start(), ok.stop()), (3, 9));
    }

    #[test]
    fn lookup_errors_are_classified() {
        assert!(SegmentError::MissingChannel("DEFAULT".into()).is_lookup());
        assert!(SegmentError::UnknownInstrument("V1".into()).is_lookup());
        assert!(!SegmentError::InvalidRange { start: 1, stop: 0 }.is_lookup());
    }
}
