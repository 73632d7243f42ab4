//! Strain analysis module for gravitational-wave event detection.
//!
//! This module provides spectral conditioning of detector strain and a
//! matched-filter search for a known waveform template.
//!
//! # Architecture
//!
//! The pipeline consists of pure functions over borrowed sample slices:
//!
//! 1. **Transform** (`transform`): Forward/inverse DFT behind the
//!    `SpectralTransform` trait, backed by `rustfft`.
//!
//! 2. **PSD Estimation** (`psd`, `window`): Constant, tabulated and Welch
//!    estimates of the one-sided noise density.
//!
//! 3. **Whitening** (`whitening`): Divide each bin by the expected noise
//!    amplitude.
//!
//! 4. **Filtering** (`filtering`): Zero-phase band-pass, either a Butterworth
//!    transfer function or a cascade of biquads.
//!
//! 5. **Matched Filter** (`matched_filter`): Noise-weighted correlation with
//!    a complex template, peak search near the event and best-fit template
//!    reconstruction.
//!
//! # Usage
//!
//! ```ignore
//! use strain_core::analysis::{
//!     matched_filter_analysis, whiten, TransferFunction, TracingObserver,
//! };
//!
//! let bandpass = TransferFunction::butter_bandpass(4, 20.0, 300.0, fs)?;
//! let (results, template_l1, template_h1) = matched_filter_analysis(
//!     &strain_h1, &strain_l1, &times, &plus, &cross, 0.0, fs,
//!     event_time, "GW150914", &white_h1, &white_l1,
//!     &bandpass, 1.0, &whiten, 1.0 / fs, Some(&TracingObserver),
//! )?;
//!
//! println!("H1 SNR: {:.1}", results["H1"].snr_max);
//! ```

pub mod filtering;
pub mod matched_filter;
pub mod psd;
pub mod transform;
pub mod types;
pub mod whitening;
pub mod window;

pub use filtering::{BiquadCascade, FilterBand, TransferFunction, ZeroPhaseFilter};
pub use matched_filter::{
    matched_filter_analysis, AnalysisObserver, Conditioning, DetectorAnalysis, DetectorInput,
    MatchedFilter, MatchedFilterConfig, MatchedFilterOutput, TemplatePair, TracingObserver,
    WhitenFn, DEFAULT_PSD_SEGMENT_SECS, DEFAULT_REFERENCE_SNR, DEFAULT_SEARCH_WINDOW_SECS,
};
pub use psd::{welch, ConstantPsd, Extrapolation, InterpolatedPsd, PsdEstimate, WelchConfig};
pub use transform::{fft_frequencies, rfft_frequencies, RustFftTransform, SpectralTransform};
pub use types::{AnalysisError, AnalysisResult, DetectorResult, EventInfo};
pub use whitening::{whiten, whiten_with};
pub use window::tukey;
