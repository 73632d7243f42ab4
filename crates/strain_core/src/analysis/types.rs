//! Core types for strain analysis.

use serde::{Deserialize, Serialize};

/// Detection statistics for one detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorResult {
    /// Peak matched-filter SNR inside the search window.
    #[serde(rename = "SNRmax")]
    pub snr_max: f64,
    /// Time of the peak (series time plus template offset), in seconds.
    pub time_of_peak: f64,
    /// Complex SNR phase at the peak, in radians.
    pub phase: f64,
    /// Factor applied to the unit-distance template to match the data
    /// (`snr_max / sigma`).
    pub amplitude_scale: f64,
    /// Template normalisation `sqrt(<h|h>)`.
    pub sigma: f64,
    /// Effective distance `sigma / snr_max`.
    pub effective_distance: f64,
    /// Horizon distance `sigma / reference_snr`.
    pub horizon: f64,
}

/// Event being analysed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventInfo {
    /// Event name (e.g. "GW150914").
    pub name: String,
    /// Putative event time, on the same clock as the `times` array.
    pub time: f64,
}

impl EventInfo {
    /// Create event info.
    pub fn new(name: impl Into<String>, time: f64) -> Self {
        Self {
            name: name.into(),
            time,
        }
    }
}

/// Error types for analysis operations.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// A parameter or sample value is out of range.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Input that would make the statistic non-finite (all-zero, NaN, ...).
    #[error("Degenerate input: {0}")]
    DegenerateInput(String),

    /// Arrays that must line up do not.
    #[error("Length mismatch for {what}: expected {expected}, got {actual}")]
    LengthMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    /// PSD estimate queried outside the frequencies it covers.
    #[error("PSD does not cover {frequency:.3} Hz")]
    PsdCoverage { frequency: f64 },

    /// PSD estimate returned a non-positive or non-finite density.
    #[error("Invalid PSD value {value} at {frequency:.3} Hz")]
    InvalidPsd { frequency: f64, value: f64 },

    /// Filter design or coefficients are unusable.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
}

/// Type alias for analysis results.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Fail unless every sample is finite.
pub(crate) fn ensure_finite(samples: &[f64], what: &str) -> AnalysisResult<()> {
    match samples.iter().position(|x| !x.is_finite()) {
        Some(idx) => Err(AnalysisError::DegenerateInput(format!(
            "{} has non-finite sample at index {}",
            what, idx
        ))),
        None => Ok(()),
    }
}

/// Fail unless `actual == expected`.
pub(crate) fn ensure_len(what: &str, expected: usize, actual: usize) -> AnalysisResult<()> {
    if expected != actual {
        return Err(AnalysisError::LengthMismatch {
            what: what.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detector_result_serializes_snrmax_key() {
        let result = DetectorResult {
            snr_max: 12.5,
            time_of_peak: 1.0,
            phase: 0.3,
            amplitude_scale: 2.0,
            sigma: 6.25,
            effective_distance: 0.5,
            horizon: 0.78,
        };
        let json = serde_json::to_value(result).unwrap();
        assert_eq!(json["SNRmax"], 12.5);
        assert!(json.get("snr_max").is_none());
    }

    #[test]
    fn ensure_finite_reports_index() {
        let err = ensure_finite(&[0.0, 1.0, f64::NAN], "strain").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Degenerate input: strain has non-finite sample at index 2"
        );
        assert!(ensure_finite(&[0.0, 1.0], "strain").is_ok());
    }

    #[test]
    fn ensure_len_mismatch_message() {
        let err = ensure_len("template", 4, 3).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Length mismatch for template: expected 4, got 3"
        );
    }
}
