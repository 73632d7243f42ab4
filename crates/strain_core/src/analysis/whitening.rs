//! Spectral whitening.
//!
//! Divides each frequency bin by the expected noise amplitude so that, for
//! data matching the PSD, every bin carries unit-variance noise. Phases are
//! untouched, which keeps signal timing intact.

use tracing::trace;

use super::psd::PsdEstimate;
use super::transform::{folded_bin, rfft_frequencies, to_complex, RustFftTransform, SpectralTransform};
use super::types::{ensure_finite, AnalysisError, AnalysisResult};

/// Whiten `series` sampled every `dt` seconds against `psd`.
///
/// Uses a fresh [`RustFftTransform`]; see [`whiten_with`] to supply one.
pub fn whiten(series: &[f64], psd: &dyn PsdEstimate, dt: f64) -> AnalysisResult<Vec<f64>> {
    whiten_with(series, psd, dt, &RustFftTransform::new())
}

/// Whiten `series` using the given transform backend.
///
/// Bin `k` (frequency `k / (n dt)`) is divided by `sqrt(psd / (2 dt))`, the
/// single-sided density normalised to the series duration. The PSD is
/// checked at every required frequency before anything is divided. The
/// output has the same length as the input.
pub fn whiten_with(
    series: &[f64],
    psd: &dyn PsdEstimate,
    dt: f64,
    transform: &dyn SpectralTransform,
) -> AnalysisResult<Vec<f64>> {
    if !(dt.is_finite() && dt > 0.0) {
        return Err(AnalysisError::InvalidInput(format!(
            "sample spacing must be positive, got {}",
            dt
        )));
    }
    ensure_finite(series, "series")
        .map_err(|e| AnalysisError::InvalidInput(e.to_string()))?;

    let n = series.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    let gains = whitening_gains(n, dt, psd)?;

    let mut spectrum = to_complex(series);
    transform.forward(&mut spectrum);
    for (k, bin) in spectrum.iter_mut().enumerate() {
        *bin *= gains[folded_bin(k, n)];
    }
    transform.inverse(&mut spectrum);

    let scale = 1.0 / n as f64;
    trace!(samples = n, "Whitened series");
    Ok(spectrum.iter().map(|c| c.re * scale).collect())
}

/// Per-bin gain `1 / sqrt(psd(f) / (2 dt))` over the one-sided grid.
fn whitening_gains(n: usize, dt: f64, psd: &dyn PsdEstimate) -> AnalysisResult<Vec<f64>> {
    rfft_frequencies(n, dt)
        .into_iter()
        .map(|frequency| {
            let value = psd
                .density(frequency)
                .ok_or(AnalysisError::PsdCoverage { frequency })?;
            if !(value.is_finite() && value > 0.0) {
                return Err(AnalysisError::InvalidPsd { frequency, value });
            }
            Ok((2.0 * dt / value).sqrt())
        })
        .collect()
}
