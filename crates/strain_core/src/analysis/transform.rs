//! Discrete Fourier transform seam.
//!
//! Whitening and matched filtering only need a forward and an inverse
//! complex transform. Keeping that behind [`SpectralTransform`] lets the
//! numeric code run against any backend; [`RustFftTransform`] is the
//! default.

use parking_lot::Mutex;
use rustfft::{num_complex::Complex, FftPlanner};

/// Forward/inverse DFT over a complex buffer, in place.
///
/// Neither direction is normalised: `inverse(forward(x)) == n * x`, the same
/// convention as `rustfft`.
pub trait SpectralTransform: Send + Sync {
    /// Forward transform.
    fn forward(&self, buffer: &mut [Complex<f64>]);

    /// Inverse transform.
    fn inverse(&self, buffer: &mut [Complex<f64>]);
}

/// `rustfft` backend with a cached planner.
pub struct RustFftTransform {
    planner: Mutex<FftPlanner<f64>>,
}

impl RustFftTransform {
    /// Create a transform with an empty plan cache.
    pub fn new() -> Self {
        Self {
            planner: Mutex::new(FftPlanner::new()),
        }
    }
}

impl Default for RustFftTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectralTransform for RustFftTransform {
    fn forward(&self, buffer: &mut [Complex<f64>]) {
        if buffer.is_empty() {
            return;
        }
        let fft = self.planner.lock().plan_fft_forward(buffer.len());
        fft.process(buffer);
    }

    fn inverse(&self, buffer: &mut [Complex<f64>]) {
        if buffer.is_empty() {
            return;
        }
        let ifft = self.planner.lock().plan_fft_inverse(buffer.len());
        ifft.process(buffer);
    }
}

/// Lift real samples into a complex buffer.
pub fn to_complex(samples: &[f64]) -> Vec<Complex<f64>> {
    samples.iter().map(|&x| Complex::new(x, 0.0)).collect()
}

/// Frequencies of the one-sided spectrum of `n` samples spaced `dt` apart.
///
/// Bins `0..=n/2`, i.e. `k / (n * dt)`.
pub fn rfft_frequencies(n: usize, dt: f64) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    let df = 1.0 / (n as f64 * dt);
    (0..=n / 2).map(|k| k as f64 * df).collect()
}

/// Signed frequencies of every bin of an `n`-point transform.
///
/// Positive frequencies first, then negative, like an FFT output.
pub fn fft_frequencies(n: usize, dt: f64) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    let df = 1.0 / (n as f64 * dt);
    let positive = (n - 1) / 2 + 1;
    (0..n)
        .map(|k| {
            if k < positive {
                k as f64 * df
            } else {
                -((n - k) as f64) * df
            }
        })
        .collect()
}

/// Index of the one-sided bin that holds the magnitude of bin `k`.
pub(crate) fn folded_bin(k: usize, n: usize) -> usize {
    if k <= n / 2 {
        k
    } else {
        n - k
    }
}
