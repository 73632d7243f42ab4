//! Zero-phase filtering for strain conditioning.
//!
//! Two designs share the [`ZeroPhaseFilter`] seam:
//! - [`TransferFunction`]: `b`/`a` coefficients (e.g. a Butterworth
//!   band-pass designed here) run forward and backward with odd-extended
//!   edges and steady-state initial conditions, matching scipy's `filtfilt`.
//! - [`BiquadCascade`]: a Butterworth response factored into biquad
//!   sections from the `biquad` crate, run forward and backward.

use std::f64::consts::PI;

use biquad::{Biquad, Coefficients, DirectForm2Transposed, Type};
use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};

use super::types::{ensure_finite, AnalysisError, AnalysisResult};

/// A filter applied forward and backward, cancelling its phase response.
pub trait ZeroPhaseFilter: Send + Sync {
    /// Filter `samples`, returning a series of the same length.
    fn filtfilt(&self, samples: &[f64]) -> AnalysisResult<Vec<f64>>;
}

/// Rational transfer function `B(z) / A(z)`, normalised so `a[0] == 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferFunction {
    /// Numerator, zero-padded to the length of `a`.
    b: Vec<f64>,
    /// Denominator, zero-padded to the length of `b`.
    a: Vec<f64>,
}

impl TransferFunction {
    /// Build from numerator and denominator coefficients.
    pub fn new(b: Vec<f64>, a: Vec<f64>) -> AnalysisResult<Self> {
        if b.is_empty() || a.is_empty() {
            return Err(AnalysisError::InvalidFilter(
                "coefficient arrays must not be empty".to_string(),
            ));
        }
        if b.iter().chain(&a).any(|c| !c.is_finite()) {
            return Err(AnalysisError::InvalidFilter(
                "coefficients must be finite".to_string(),
            ));
        }
        let a0 = a[0];
        if a0 == 0.0 {
            return Err(AnalysisError::InvalidFilter(
                "leading denominator coefficient is zero".to_string(),
            ));
        }

        let len = b.len().max(a.len());
        let mut b: Vec<f64> = b.iter().map(|c| c / a0).collect();
        let mut a: Vec<f64> = a.iter().map(|c| c / a0).collect();
        b.resize(len, 0.0);
        a.resize(len, 0.0);
        Ok(Self { b, a })
    }

    /// Digital Butterworth band-pass of the given prototype order.
    ///
    /// The result has `2 * order` poles. Cutoffs are the -3 dB points and
    /// must satisfy `0 < low_hz < high_hz < fs / 2`.
    pub fn butter_bandpass(order: usize, low_hz: f64, high_hz: f64, fs: f64) -> AnalysisResult<Self> {
        let nyquist = fs / 2.0;
        if order == 0 {
            return Err(AnalysisError::InvalidFilter("order must be at least 1".to_string()));
        }
        if !(fs.is_finite() && low_hz > 0.0 && low_hz < high_hz && high_hz < nyquist) {
            return Err(AnalysisError::InvalidFilter(format!(
                "band {}-{} Hz is not inside (0, {}) Hz",
                low_hz, high_hz, nyquist
            )));
        }

        // Pre-warp for a bilinear transform with sample rate 2 (Nyquist = 1).
        const BILINEAR_2FS: f64 = 4.0;
        let warp = |hz: f64| BILINEAR_2FS * (PI * (hz / nyquist) / 2.0).tan();
        let (w_low, w_high) = (warp(low_hz), warp(high_hz));
        let bandwidth = w_high - w_low;
        let center_sq = w_low * w_high;

        // Analog low-pass prototype poles on the left half of the unit circle.
        let n = order as f64;
        let prototype = (0..order).map(|k| {
            let m = -n + 1.0 + 2.0 * k as f64;
            -Complex::from_polar(1.0, PI * m / (2.0 * n))
        });

        // Low-pass to band-pass: each prototype pole splits in two.
        let mut analog_poles = Vec::with_capacity(2 * order);
        for p in prototype {
            let scaled = p * (bandwidth / 2.0);
            let root = (scaled * scaled - center_sq).sqrt();
            analog_poles.push(scaled + root);
            analog_poles.push(scaled - root);
        }

        // Bilinear transform. Band-pass zeros: `order` at s = 0 (z = 1) and
        // `order` at infinity (z = -1).
        let digital_poles: Vec<Complex<f64>> = analog_poles
            .iter()
            .map(|&p| (BILINEAR_2FS + p) / (BILINEAR_2FS - p))
            .collect();
        let mut digital_zeros = vec![Complex::new(1.0, 0.0); order];
        digital_zeros.extend(std::iter::repeat(Complex::new(-1.0, 0.0)).take(order));

        let pole_product: Complex<f64> = analog_poles.iter().map(|&p| BILINEAR_2FS - p).product();
        let gain = (bandwidth.powi(order as i32) * BILINEAR_2FS.powi(order as i32) / pole_product).re;

        let b: Vec<f64> = poly_from_roots(&digital_zeros).iter().map(|c| c.re * gain).collect();
        let a: Vec<f64> = poly_from_roots(&digital_poles).iter().map(|c| c.re).collect();
        Self::new(b, a)
    }

    /// Numerator coefficients.
    pub fn numerator(&self) -> &[f64] {
        &self.b
    }

    /// Denominator coefficients.
    pub fn denominator(&self) -> &[f64] {
        &self.a
    }

    /// Number of delay elements.
    pub fn order(&self) -> usize {
        self.b.len() - 1
    }

    /// Causal filtering from rest.
    pub fn lfilter(&self, samples: &[f64]) -> Vec<f64> {
        self.run(samples, vec![0.0; self.order()])
    }

    /// Initial state for a step response already in steady state.
    ///
    /// Scaling the state by the first input sample suppresses the start-up
    /// transient of a signal that begins at that level.
    pub fn lfilter_zi(&self) -> AnalysisResult<Vec<f64>> {
        let order = self.order();
        if order == 0 {
            return Ok(Vec::new());
        }

        // (I - companion(a)^T) zi = b[1..] - a[1..] * b[0]
        let mut matrix = vec![vec![0.0; order]; order];
        for (i, row) in matrix.iter_mut().enumerate() {
            row[i] += 1.0;
            row[0] += self.a[i + 1];
            if i + 1 < order {
                row[i + 1] -= 1.0;
            }
        }
        let rhs: Vec<f64> = (1..=order).map(|i| self.b[i] - self.a[i] * self.b[0]).collect();

        solve_linear(matrix, rhs).ok_or_else(|| {
            AnalysisError::InvalidFilter("filter has no steady state (pole at z = 1)".to_string())
        })
    }

    /// Direct form II transposed with explicit state.
    fn run(&self, samples: &[f64], mut state: Vec<f64>) -> Vec<f64> {
        let order = self.order();
        samples
            .iter()
            .map(|&x| {
                let y = self.b[0] * x + state.first().copied().unwrap_or(0.0);
                for i in 0..order {
                    let carry = if i + 1 < order { state[i + 1] } else { 0.0 };
                    state[i] = self.b[i + 1] * x + carry - self.a[i + 1] * y;
                }
                y
            })
            .collect()
    }

    /// Number of samples mirrored onto each edge before filtering.
    fn pad_len(&self) -> usize {
        3 * self.b.len()
    }
}

impl ZeroPhaseFilter for TransferFunction {
    fn filtfilt(&self, samples: &[f64]) -> AnalysisResult<Vec<f64>> {
        let edge = self.pad_len();
        if samples.len() <= edge {
            return Err(AnalysisError::InvalidInput(format!(
                "filtfilt needs more than {} samples, got {}",
                edge,
                samples.len()
            )));
        }
        ensure_finite(samples, "filter input")?;

        let zi = self.lfilter_zi()?;
        let extended = odd_extend(samples, edge);

        let x0 = extended[0];
        let forward = self.run(&extended, zi.iter().map(|z| z * x0).collect());

        let reversed: Vec<f64> = forward.into_iter().rev().collect();
        let y0 = reversed[0];
        let backward = self.run(&reversed, zi.iter().map(|z| z * y0).collect());

        Ok(backward
            .into_iter()
            .rev()
            .skip(edge)
            .take(samples.len())
            .collect())
    }
}

/// Point-symmetric extension of `edge` samples on both ends.
fn odd_extend(samples: &[f64], edge: usize) -> Vec<f64> {
    let n = samples.len();
    let (first, last) = (samples[0], samples[n - 1]);

    let mut out = Vec::with_capacity(n + 2 * edge);
    out.extend((1..=edge).rev().map(|i| 2.0 * first - samples[i]));
    out.extend_from_slice(samples);
    out.extend((1..=edge).map(|i| 2.0 * last - samples[n - 1 - i]));
    out
}

/// Coefficients of `prod(x - r)`, highest power first.
fn poly_from_roots(roots: &[Complex<f64>]) -> Vec<Complex<f64>> {
    let mut coeffs = vec![Complex::new(1.0, 0.0)];
    for &root in roots {
        coeffs.push(Complex::new(0.0, 0.0));
        for i in (1..coeffs.len()).rev() {
            let prev = coeffs[i - 1];
            coeffs[i] -= root * prev;
        }
    }
    coeffs
}

/// Gaussian elimination with partial pivoting.
fn solve_linear(mut matrix: Vec<Vec<f64>>, mut rhs: Vec<f64>) -> Option<Vec<f64>> {
    let n = rhs.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| matrix[i][col].abs().total_cmp(&matrix[j][col].abs()))?;
        if matrix[pivot][col].abs() < 1e-14 {
            return None;
        }
        matrix.swap(col, pivot);
        rhs.swap(col, pivot);

        let pivot_row = matrix[col].clone();
        let pivot_rhs = rhs[col];
        for row in col + 1..n {
            let factor = matrix[row][col] / pivot_row[col];
            for (k, value) in matrix[row].iter_mut().enumerate().skip(col) {
                *value -= factor * pivot_row[k];
            }
            rhs[row] -= factor * pivot_rhs;
        }
    }

    let mut solution = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| matrix[row][k] * solution[k]).sum();
        solution[row] = (rhs[row] - tail) / matrix[row][row];
    }
    Some(solution)
}

/// Band shape of a [`BiquadCascade`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterBand {
    /// Low-pass filter (removes high frequencies).
    LowPass,
    /// Band-pass filter (isolates a frequency range).
    #[default]
    BandPass,
    /// High-pass filter (removes low frequencies).
    HighPass,
}

/// Butterworth filter realised as cascaded second-order sections.
///
/// Each section carries one conjugate pole pair of the prototype, so the
/// cascade is -3 dB at the cutoff for any order.
#[derive(Debug, Clone)]
pub struct BiquadCascade {
    sections: Vec<Coefficients<f64>>,
}

impl BiquadCascade {
    /// Build a cascade for the given band.
    ///
    /// `order` is split into second-order sections (rounded up). A
    /// band-pass is a high-pass at `low_hz` followed by a low-pass at
    /// `high_hz`, each carrying half the order.
    pub fn new(
        band: FilterBand,
        fs: f64,
        low_hz: f64,
        high_hz: f64,
        order: usize,
    ) -> AnalysisResult<Self> {
        let sections = match band {
            FilterBand::LowPass => butterworth_sections(SectionKind::LowPass, fs, high_hz, order)?,
            FilterBand::HighPass => butterworth_sections(SectionKind::HighPass, fs, low_hz, order)?,
            FilterBand::BandPass => {
                if low_hz >= high_hz {
                    return Err(AnalysisError::InvalidFilter(format!(
                        "band-pass low cutoff {} Hz is not below high cutoff {} Hz",
                        low_hz, high_hz
                    )));
                }
                let half = order.div_ceil(2);
                let mut sections = butterworth_sections(SectionKind::HighPass, fs, low_hz, half)?;
                sections.extend(butterworth_sections(SectionKind::LowPass, fs, high_hz, half)?);
                sections
            }
        };
        Ok(Self { sections })
    }

    /// Band-pass cascade.
    pub fn bandpass(fs: f64, low_hz: f64, high_hz: f64, order: usize) -> AnalysisResult<Self> {
        Self::new(FilterBand::BandPass, fs, low_hz, high_hz, order)
    }

    /// Low-pass cascade.
    pub fn lowpass(fs: f64, cutoff_hz: f64, order: usize) -> AnalysisResult<Self> {
        Self::new(FilterBand::LowPass, fs, 0.0, cutoff_hz, order)
    }

    /// High-pass cascade.
    pub fn highpass(fs: f64, cutoff_hz: f64, order: usize) -> AnalysisResult<Self> {
        Self::new(FilterBand::HighPass, fs, cutoff_hz, 0.0, order)
    }

    /// Number of second-order sections.
    pub fn num_sections(&self) -> usize {
        self.sections.len()
    }

    /// Run every section once over `samples`, in place.
    fn apply_sections(&self, samples: &mut [f64]) {
        for coeffs in &self.sections {
            // Fresh state per section and per pass.
            let mut filter = DirectForm2Transposed::<f64>::new(*coeffs);
            for sample in samples.iter_mut() {
                *sample = filter.run(*sample);
            }
        }
    }
}

impl ZeroPhaseFilter for BiquadCascade {
    fn filtfilt(&self, samples: &[f64]) -> AnalysisResult<Vec<f64>> {
        ensure_finite(samples, "filter input")?;

        let mut result = samples.to_vec();
        self.apply_sections(&mut result);
        result.reverse();
        self.apply_sections(&mut result);
        result.reverse();
        Ok(result)
    }
}

#[derive(Debug, Clone, Copy)]
enum SectionKind {
    LowPass,
    HighPass,
}

/// Quality factors of the conjugate pole pairs of an order `2 * num_sections`
/// Butterworth prototype.
fn butterworth_qs(num_sections: usize) -> impl Iterator<Item = f64> {
    let order = (2 * num_sections) as f64;
    (0..num_sections).map(move |k| 1.0 / (2.0 * ((2 * k + 1) as f64 * PI / (2.0 * order)).sin()))
}

/// `order / 2` (at least one) sections, one per Butterworth pole pair.
fn butterworth_sections(
    kind: SectionKind,
    fs: f64,
    cutoff_hz: f64,
    order: usize,
) -> AnalysisResult<Vec<Coefficients<f64>>> {
    if !(cutoff_hz > 0.0 && cutoff_hz < fs / 2.0) {
        return Err(AnalysisError::InvalidFilter(format!(
            "cutoff {} Hz is not inside (0, {}) Hz",
            cutoff_hz,
            fs / 2.0
        )));
    }

    let filter_type = match kind {
        SectionKind::LowPass => Type::LowPass,
        SectionKind::HighPass => Type::HighPass,
    };

    // biquad's `from_params` maps f0 to pi * f0 / (2 fs); the normalized
    // form takes f0 relative to Nyquist, which lands the cutoff at f0.
    let normalized = cutoff_hz / (fs / 2.0);

    butterworth_qs(order.div_ceil(2).max(1))
        .map(|q| {
            Coefficients::<f64>::from_normalized_params(filter_type, normalized, q)
                .map_err(|e| AnalysisError::InvalidFilter(format!("{:?}", e)))
        })
        .collect()
}
