//! Power spectral density estimates.
//!
//! [`PsdEstimate`] is what whitening and matched filtering consume: a
//! one-sided density as a function of non-negative frequency. Estimates
//! return `None` outside the range they cover so callers can fail before
//! dividing by a made-up value.

use super::transform::{to_complex, SpectralTransform};
use super::types::{AnalysisError, AnalysisResult};
use super::window::{apply_window, tukey};

/// Relative slack allowed at the edges of a tabulated PSD.
const EDGE_TOLERANCE: f64 = 1e-9;

/// One-sided noise power spectral density.
pub trait PsdEstimate: Send + Sync {
    /// Density at `frequency` (Hz), or `None` outside coverage.
    fn density(&self, frequency: f64) -> Option<f64>;
}

/// The same density at every frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantPsd(pub f64);

impl PsdEstimate for ConstantPsd {
    fn density(&self, frequency: f64) -> Option<f64> {
        (frequency >= 0.0).then_some(self.0)
    }
}

/// Behaviour of an [`InterpolatedPsd`] outside its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Extrapolation {
    /// Out-of-range frequencies are not covered.
    #[default]
    None,
    /// Hold the first/last tabulated value.
    Clamp,
    /// Extend the first/last interpolation segment.
    Linear,
}

/// Linear interpolation over a tabulated PSD.
#[derive(Debug, Clone, PartialEq)]
pub struct InterpolatedPsd {
    frequencies: Vec<f64>,
    values: Vec<f64>,
    extrapolation: Extrapolation,
}

impl InterpolatedPsd {
    /// Build from matching frequency/value tables.
    ///
    /// Frequencies must be finite and strictly increasing, with at least
    /// two points.
    pub fn new(frequencies: Vec<f64>, values: Vec<f64>) -> AnalysisResult<Self> {
        if frequencies.len() != values.len() {
            return Err(AnalysisError::LengthMismatch {
                what: "PSD table".to_string(),
                expected: frequencies.len(),
                actual: values.len(),
            });
        }
        if frequencies.len() < 2 {
            return Err(AnalysisError::InvalidInput(
                "PSD table needs at least two points".to_string(),
            ));
        }
        if frequencies.iter().any(|f| !f.is_finite())
            || frequencies.windows(2).any(|w| w[1] <= w[0])
        {
            return Err(AnalysisError::InvalidInput(
                "PSD frequencies must be finite and strictly increasing".to_string(),
            ));
        }

        Ok(Self {
            frequencies,
            values,
            extrapolation: Extrapolation::None,
        })
    }

    /// Set the extrapolation mode.
    pub fn with_extrapolation(mut self, extrapolation: Extrapolation) -> Self {
        self.extrapolation = extrapolation;
        self
    }

    /// Tabulated frequencies.
    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    /// Tabulated densities.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    fn lerp(&self, lo: usize, frequency: f64) -> f64 {
        let (f0, f1) = (self.frequencies[lo], self.frequencies[lo + 1]);
        let (v0, v1) = (self.values[lo], self.values[lo + 1]);
        v0 + (v1 - v0) * (frequency - f0) / (f1 - f0)
    }
}

impl PsdEstimate for InterpolatedPsd {
    fn density(&self, frequency: f64) -> Option<f64> {
        if !frequency.is_finite() {
            return None;
        }

        let last = self.frequencies.len() - 1;
        let first_f = self.frequencies[0];
        let last_f = self.frequencies[last];
        let slack = EDGE_TOLERANCE * last_f.abs().max(1.0);

        if frequency < first_f || frequency > last_f {
            let near_edge = frequency >= first_f - slack && frequency <= last_f + slack;
            return match (self.extrapolation, near_edge) {
                (Extrapolation::Clamp, _) | (Extrapolation::None, true) => Some(if frequency < first_f {
                    self.values[0]
                } else {
                    self.values[last]
                }),
                (Extrapolation::Linear, _) => Some(if frequency < first_f {
                    self.lerp(0, frequency)
                } else {
                    self.lerp(last - 1, frequency)
                }),
                (Extrapolation::None, false) => None,
            };
        }

        // Index of the segment [f_lo, f_lo+1] holding the frequency.
        let upper = self.frequencies.partition_point(|&f| f <= frequency);
        let lo = upper.saturating_sub(1).min(last - 1);
        Some(self.lerp(lo, frequency))
    }
}

/// Welch averaged-periodogram settings.
#[derive(Debug, Clone, PartialEq)]
pub struct WelchConfig {
    /// Samples per segment. Shorter data is zero-padded to this length.
    pub segment_len: usize,
    /// Samples shared by consecutive segments.
    pub overlap: usize,
    /// Tukey taper fraction applied to each segment.
    pub window_alpha: f64,
}

impl WelchConfig {
    /// Segments of `segment_secs` seconds at `fs` with 50% overlap.
    pub fn for_duration(segment_secs: f64, fs: f64, window_alpha: f64) -> Self {
        let segment_len = ((segment_secs * fs).round() as usize).max(2);
        Self {
            segment_len,
            overlap: segment_len / 2,
            window_alpha,
        }
    }
}

impl Default for WelchConfig {
    fn default() -> Self {
        Self {
            segment_len: 4096,
            overlap: 2048,
            window_alpha: 0.25,
        }
    }
}

/// Welch estimate of the one-sided PSD of `data` sampled at `fs` Hz.
///
/// Each windowed segment's periodogram is scaled to a density
/// (`|X|^2 / (fs * sum(w^2))`), doubled on bins with a negative-frequency
/// twin, and the segments are averaged. The returned table covers
/// `0..=fs/2` on a `fs / segment_len` grid with no extrapolation.
pub fn welch(
    data: &[f64],
    fs: f64,
    config: &WelchConfig,
    transform: &dyn SpectralTransform,
) -> AnalysisResult<InterpolatedPsd> {
    if !(fs.is_finite() && fs > 0.0) {
        return Err(AnalysisError::InvalidInput(format!(
            "sample rate must be positive, got {}",
            fs
        )));
    }
    let nfft = config.segment_len;
    if nfft < 2 || config.overlap >= nfft {
        return Err(AnalysisError::InvalidInput(format!(
            "Welch segment of {} samples with overlap {}",
            nfft, config.overlap
        )));
    }
    if data.is_empty() {
        return Err(AnalysisError::InvalidInput("empty data for PSD".to_string()));
    }

    let padded;
    let data = if data.len() < nfft {
        padded = {
            let mut v = data.to_vec();
            v.resize(nfft, 0.0);
            v
        };
        &padded[..]
    } else {
        data
    };

    let window = tukey(nfft, config.window_alpha);
    let window_power: f64 = window.iter().map(|w| w * w).sum();
    let scale = 1.0 / (fs * window_power);
    let step = nfft - config.overlap;
    let num_segments = (data.len() - config.overlap) / step;
    let num_bins = nfft / 2 + 1;

    let mut accum = vec![0.0; num_bins];
    for seg in 0..num_segments {
        let start = seg * step;
        let mut buffer = to_complex(&apply_window(&data[start..start + nfft], &window));
        transform.forward(&mut buffer);
        for (acc, bin) in accum.iter_mut().zip(&buffer) {
            *acc += bin.norm_sqr();
        }
    }

    // DC and (for even lengths) Nyquist have no twin.
    let doubled_end = if nfft % 2 == 0 { num_bins - 1 } else { num_bins };
    let values: Vec<f64> = accum
        .iter()
        .enumerate()
        .map(|(k, &p)| {
            let one_sided = if k > 0 && k < doubled_end { 2.0 } else { 1.0 };
            p * scale * one_sided / num_segments as f64
        })
        .collect();

    let frequencies: Vec<f64> = (0..num_bins).map(|k| k as f64 * fs / nfft as f64).collect();
    InterpolatedPsd::new(frequencies, values)
}
