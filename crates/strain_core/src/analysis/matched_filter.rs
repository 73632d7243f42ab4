//! Matched-filter detection engine.
//!
//! Cross-correlates detector strain against a complex template in the
//! frequency domain, weighted by the strain's own noise PSD, and reports the
//! peak signal-to-noise ratio near a putative event. The best-fit template
//! is also rebuilt in the time domain, whitened and band-passed the same way
//! as the data so the two can be compared directly.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use rustfft::num_complex::Complex;
use serde::Serialize;
use tracing::{debug, info};

use super::filtering::ZeroPhaseFilter;
use super::psd::{welch, Extrapolation, InterpolatedPsd, PsdEstimate, WelchConfig};
use super::transform::{fft_frequencies, RustFftTransform, SpectralTransform};
use super::types::{ensure_finite, ensure_len, AnalysisError, AnalysisResult, DetectorResult, EventInfo};
use super::window::tukey;

/// Default Welch segment length in seconds.
pub const DEFAULT_PSD_SEGMENT_SECS: f64 = 4.0;

/// Default half-width of the peak search window in seconds.
pub const DEFAULT_SEARCH_WINDOW_SECS: f64 = 5.0;

/// SNR at which the horizon distance is quoted.
pub const DEFAULT_REFERENCE_SNR: f64 = 8.0;

/// Whitening callback: `(series, psd, dt) -> whitened series`.
///
/// [`whiten`](super::whitening::whiten) has this shape.
pub type WhitenFn = dyn Fn(&[f64], &dyn PsdEstimate, f64) -> AnalysisResult<Vec<f64>> + Send + Sync;

/// Numeric settings of the matched filter.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedFilterConfig {
    /// Welch segment length for the data PSD, in seconds.
    pub psd_segment_secs: f64,
    /// Fraction of each Welch segment shared with the next.
    pub psd_overlap_fraction: f64,
    /// Tukey fraction of the Welch segment window.
    pub psd_window_alpha: f64,
    /// Tukey fraction of the window applied to data and template.
    pub data_window_alpha: f64,
    /// Peak search covers `event_time +/- search_window_secs`.
    pub search_window_secs: f64,
    /// SNR used for the horizon distance.
    pub reference_snr: f64,
}

impl Default for MatchedFilterConfig {
    fn default() -> Self {
        Self {
            psd_segment_secs: DEFAULT_PSD_SEGMENT_SECS,
            psd_overlap_fraction: 0.5,
            psd_window_alpha: 0.25,
            data_window_alpha: 0.125,
            search_window_secs: DEFAULT_SEARCH_WINDOW_SECS,
            reference_snr: DEFAULT_REFERENCE_SNR,
        }
    }
}

impl MatchedFilterConfig {
    fn validate(&self) -> AnalysisResult<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.psd_segment_secs) {
            return Err(AnalysisError::InvalidInput(format!(
                "psd_segment_secs must be positive, got {}",
                self.psd_segment_secs
            )));
        }
        if !(0.0..1.0).contains(&self.psd_overlap_fraction) {
            return Err(AnalysisError::InvalidInput(format!(
                "psd_overlap_fraction must be in [0, 1), got {}",
                self.psd_overlap_fraction
            )));
        }
        if !positive(self.search_window_secs) {
            return Err(AnalysisError::InvalidInput(format!(
                "search_window_secs must be positive, got {}",
                self.search_window_secs
            )));
        }
        if !positive(self.reference_snr) {
            return Err(AnalysisError::InvalidInput(format!(
                "reference_snr must be positive, got {}",
                self.reference_snr
            )));
        }
        Ok(())
    }

    /// Welch settings for data sampled at `fs`.
    fn welch_config(&self, fs: f64) -> WelchConfig {
        let segment_len = ((self.psd_segment_secs * fs).round() as usize).max(2);
        let overlap = ((self.psd_overlap_fraction * segment_len as f64).round() as usize)
            .min(segment_len - 1);
        WelchConfig {
            segment_len,
            overlap,
            window_alpha: self.psd_window_alpha,
        }
    }
}

/// Plus/cross template polarizations.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplatePair {
    plus: Vec<f64>,
    cross: Vec<f64>,
    offset_secs: f64,
}

impl TemplatePair {
    /// Pair two equal-length, finite polarizations.
    ///
    /// `offset_secs` is added to the series time of the SNR peak when
    /// reporting it, e.g. the distance from the template's end to its
    /// merger.
    pub fn new(plus: Vec<f64>, cross: Vec<f64>, offset_secs: f64) -> AnalysisResult<Self> {
        if plus.is_empty() {
            return Err(AnalysisError::InvalidInput("template is empty".to_string()));
        }
        ensure_len("template cross polarization", plus.len(), cross.len())?;
        ensure_finite(&plus, "template plus polarization")?;
        ensure_finite(&cross, "template cross polarization")?;
        if !offset_secs.is_finite() {
            return Err(AnalysisError::InvalidInput(format!(
                "template offset must be finite, got {}",
                offset_secs
            )));
        }
        Ok(Self {
            plus,
            cross,
            offset_secs,
        })
    }

    pub fn len(&self) -> usize {
        self.plus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plus.is_empty()
    }

    pub fn plus(&self) -> &[f64] {
        &self.plus
    }

    pub fn cross(&self) -> &[f64] {
        &self.cross
    }

    pub fn offset_secs(&self) -> f64 {
        self.offset_secs
    }

    /// `plus + i * cross`, tapered by `window`.
    fn windowed_complex(&self, window: &[f64]) -> Vec<Complex<f64>> {
        self.plus
            .iter()
            .zip(&self.cross)
            .zip(window)
            .map(|((&p, &c), &w)| Complex::new(p * w, c * w))
            .collect()
    }

    /// `Re(h * e^{i phase}) = plus cos(phase) - cross sin(phase)`.
    fn phase_shifted(&self, phase: f64) -> Vec<f64> {
        let (sin, cos) = phase.sin_cos();
        self.plus
            .iter()
            .zip(&self.cross)
            .map(|(&p, &c)| p * cos - c * sin)
            .collect()
    }

    fn has_power(&self) -> bool {
        self.plus.iter().chain(&self.cross).any(|&x| x != 0.0)
    }
}

/// Strain from one detector.
#[derive(Debug, Clone, Copy)]
pub struct DetectorInput<'a> {
    /// Detector label, e.g. "H1".
    pub label: &'a str,
    /// Raw strain.
    pub strain: &'a [f64],
    /// The same strain already whitened and band-passed by the caller.
    pub whitened_bp: &'a [f64],
}

/// Caller-supplied conditioning applied to the best-fit template.
pub struct Conditioning<'a> {
    /// Whitening function, called with the data PSD.
    pub whiten: &'a WhitenFn,
    /// Zero-phase band-pass.
    pub bandpass: &'a dyn ZeroPhaseFilter,
    /// Divisor applied after band-passing. Must be finite and non-zero.
    pub normalization: f64,
    /// Sample spacing handed to `whiten`. Must equal `1 / fs`.
    pub dt: f64,
}

/// Everything computed for one detector.
#[derive(Debug, Clone, Serialize)]
pub struct DetectorAnalysis {
    pub label: String,
    #[serde(flatten)]
    pub result: DetectorResult,
    /// Best-fit template, whitened, band-passed and normalised.
    #[serde(skip)]
    pub template: Vec<f64>,
    /// `|SNR|` time series, aligned with `times`.
    #[serde(skip)]
    pub snr: Vec<f64>,
    /// Caller's whitened, band-passed strain.
    #[serde(skip)]
    pub whitened_bp: Vec<f64>,
    /// Welch PSD of the strain.
    #[serde(skip)]
    pub psd: InterpolatedPsd,
}

/// Finished analysis of one event.
#[derive(Debug, Clone, Serialize)]
pub struct MatchedFilterOutput {
    pub event: EventInfo,
    pub detectors: Vec<DetectorAnalysis>,
}

impl MatchedFilterOutput {
    /// Results keyed by detector label.
    pub fn results(&self) -> BTreeMap<String, DetectorResult> {
        self.detectors
            .iter()
            .map(|d| (d.label.clone(), d.result))
            .collect()
    }

    pub fn detector(&self, label: &str) -> Option<&DetectorAnalysis> {
        self.detectors.iter().find(|d| d.label == label)
    }

    /// Best-fit template for `label`.
    pub fn template(&self, label: &str) -> Option<&[f64]> {
        self.detector(label).map(|d| d.template.as_slice())
    }

    /// Like [`template`](Self::template), but a missing detector is an error.
    pub fn require_template(&self, label: &str) -> AnalysisResult<&[f64]> {
        self.template(label).ok_or_else(|| {
            AnalysisError::InvalidInput(format!(
                "no {} output for event {}",
                label, self.event.name
            ))
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Receives the finished output, e.g. to plot it.
pub trait AnalysisObserver {
    fn observe(&self, output: &MatchedFilterOutput);
}

/// Logs a one-line summary per detector.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl AnalysisObserver for TracingObserver {
    fn observe(&self, output: &MatchedFilterOutput) {
        for detector in &output.detectors {
            info!(
                event = %output.event.name,
                detector = %detector.label,
                snr = detector.result.snr_max,
                time = detector.result.time_of_peak,
                "Matched-filter result"
            );
        }
    }
}

/// Matched-filter engine.
pub struct MatchedFilter {
    config: MatchedFilterConfig,
    transform: Box<dyn SpectralTransform>,
}

impl MatchedFilter {
    /// Engine backed by [`RustFftTransform`].
    pub fn new(config: MatchedFilterConfig) -> Self {
        Self::with_transform(config, Box::new(RustFftTransform::new()))
    }

    pub fn with_transform(config: MatchedFilterConfig, transform: Box<dyn SpectralTransform>) -> Self {
        Self { config, transform }
    }

    pub fn config(&self) -> &MatchedFilterConfig {
        &self.config
    }

    /// Analyse every detector against `template` around `event`.
    ///
    /// All series must share the length of `times`. The observer, if any,
    /// is called once with the finished output.
    #[allow(clippy::too_many_arguments)]
    pub fn analyze(
        &self,
        detectors: &[DetectorInput<'_>],
        times: &[f64],
        template: &TemplatePair,
        fs: f64,
        event: &EventInfo,
        conditioning: &Conditioning<'_>,
        observer: Option<&dyn AnalysisObserver>,
    ) -> AnalysisResult<MatchedFilterOutput> {
        self.config.validate()?;
        if !(fs.is_finite() && fs > 0.0) {
            return Err(AnalysisError::InvalidInput(format!(
                "sample rate must be positive, got {}",
                fs
            )));
        }
        if (conditioning.dt * fs - 1.0).abs() > 1e-9 {
            return Err(AnalysisError::InvalidInput(format!(
                "dt {} does not match sample rate {} Hz",
                conditioning.dt, fs
            )));
        }
        if !(conditioning.normalization.is_finite() && conditioning.normalization != 0.0) {
            return Err(AnalysisError::InvalidInput(format!(
                "normalization must be finite and non-zero, got {}",
                conditioning.normalization
            )));
        }
        if !event.time.is_finite() {
            return Err(AnalysisError::InvalidInput(format!(
                "event time must be finite, got {}",
                event.time
            )));
        }
        ensure_finite(times, "times")?;
        ensure_len("template", times.len(), template.len())?;
        if !template.has_power() {
            return Err(AnalysisError::DegenerateInput("template is all zero".to_string()));
        }

        let detectors = detectors
            .iter()
            .map(|input| self.analyze_detector(input, times, template, fs, event, conditioning))
            .collect::<AnalysisResult<Vec<_>>>()?;

        let output = MatchedFilterOutput {
            event: event.clone(),
            detectors,
        };
        if let Some(observer) = observer {
            observer.observe(&output);
        }
        Ok(output)
    }

    fn analyze_detector(
        &self,
        input: &DetectorInput<'_>,
        times: &[f64],
        template: &TemplatePair,
        fs: f64,
        event: &EventInfo,
        conditioning: &Conditioning<'_>,
    ) -> AnalysisResult<DetectorAnalysis> {
        let label = input.label;
        let n = times.len();
        ensure_len(&format!("{} strain", label), n, input.strain.len())?;
        ensure_len(&format!("{} whitened strain", label), n, input.whitened_bp.len())?;
        ensure_finite(input.strain, &format!("{} strain", label))?;
        if input.strain.iter().all(|&x| x == 0.0) {
            return Err(AnalysisError::DegenerateInput(format!(
                "{} strain is all zero",
                label
            )));
        }

        let psd = welch(input.strain, fs, &self.config.welch_config(fs), self.transform.as_ref())?
            .with_extrapolation(Extrapolation::Clamp);

        // Noise power at every (signed) bin of the full-length transform.
        let frequencies = fft_frequencies(n, 1.0 / fs);
        let power = frequencies
            .iter()
            .map(|f| match psd.density(f.abs()) {
                Some(p) if p.is_finite() && p > 0.0 => Ok(p),
                _ => Err(AnalysisError::DegenerateInput(format!(
                    "{} PSD has no power at {:.3} Hz",
                    label,
                    f.abs()
                ))),
            })
            .collect::<AnalysisResult<Vec<f64>>>()?;
        let df = fs / n as f64;

        // Taper both, then transform with the continuous-FT scaling (1/fs).
        let window = tukey(n, self.config.data_window_alpha);
        let mut data_fft: Vec<Complex<f64>> = input
            .strain
            .iter()
            .zip(&window)
            .map(|(&x, &w)| Complex::new(x * w, 0.0))
            .collect();
        let mut template_fft = template.windowed_complex(&window);
        self.transform.forward(&mut data_fft);
        self.transform.forward(&mut template_fft);
        let inv_fs = 1.0 / fs;

        let mut optimal: Vec<Complex<f64>> = data_fft
            .iter()
            .zip(&template_fft)
            .zip(&power)
            .map(|((&d, &h), &p)| (d * inv_fs) * (h * inv_fs).conj() / p)
            .collect();

        let sigma_sq: f64 = template_fft
            .iter()
            .zip(&power)
            .map(|(&h, &p)| (h * inv_fs).norm_sqr() / p * df)
            .sum();
        let sigma = sigma_sq.sqrt();
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(AnalysisError::DegenerateInput(format!(
                "{} template normalisation is {}",
                label, sigma
            )));
        }

        // 2 * ifft(optimal) * fs, with the 1/n the transform leaves out.
        self.transform.inverse(&mut optimal);
        let scale = 2.0 * fs / n as f64 / sigma;
        let snr_complex: Vec<Complex<f64>> = optimal.iter().map(|&c| c * scale).collect();

        // Shift so the peak marks where the template ends in the data.
        let half = n / 2;
        let snr_complex = roll(&snr_complex, half as isize);
        let snr: Vec<f64> = snr_complex.iter().map(|c| c.norm()).collect();

        let offset = template.offset_secs();
        let window_secs = self.config.search_window_secs;
        let peak = (0..n)
            .filter(|&i| (times[i] + offset - event.time).abs() <= window_secs)
            .max_by(|&a, &b| snr[a].total_cmp(&snr[b]))
            .ok_or_else(|| {
                AnalysisError::InvalidInput(format!(
                    "no samples within {} s of event time {}",
                    window_secs, event.time
                ))
            })?;

        let snr_max = snr[peak];
        if !(snr_max.is_finite() && snr_max > 0.0) {
            return Err(AnalysisError::DegenerateInput(format!(
                "{} peak SNR is {}",
                label, snr_max
            )));
        }
        let time_of_peak = times[peak] + offset;
        let phase = snr_complex[peak].arg();
        let amplitude_scale = snr_max / sigma;
        let effective_distance = sigma / snr_max;
        let horizon = sigma / self.config.reference_snr;

        info!(
            "For detector {}, maximum at {:.4} with SNR = {:.1}, D_eff = {:.2}, horizon = {:.1} Mpc",
            label, time_of_peak, snr_max, effective_distance, horizon
        );

        let template_out = self.best_fit_template(
            template,
            phase,
            peak as isize - half as isize,
            amplitude_scale,
            &psd,
            conditioning,
        )?;
        debug!(detector = label, peak, phase = phase * 180.0 / PI, "Built best-fit template");

        Ok(DetectorAnalysis {
            label: label.to_string(),
            result: DetectorResult {
                snr_max,
                time_of_peak,
                phase,
                amplitude_scale,
                sigma,
                effective_distance,
                horizon,
            },
            template: template_out,
            snr,
            whitened_bp: input.whitened_bp.to_vec(),
            psd,
        })
    }

    /// Phase-aligned, time-shifted, scaled template conditioned like the data.
    fn best_fit_template(
        &self,
        template: &TemplatePair,
        phase: f64,
        shift: isize,
        amplitude_scale: f64,
        psd: &InterpolatedPsd,
        conditioning: &Conditioning<'_>,
    ) -> AnalysisResult<Vec<f64>> {
        let aligned: Vec<f64> = roll(&template.phase_shifted(phase), shift)
            .into_iter()
            .map(|x| x * amplitude_scale)
            .collect();

        let psd: &dyn PsdEstimate = psd;
        let whitened = (conditioning.whiten)(&aligned, psd, conditioning.dt)?;
        let filtered = conditioning.bandpass.filtfilt(&whitened)?;
        ensure_len("conditioned template", aligned.len(), filtered.len())?;

        let norm = conditioning.normalization;
        Ok(filtered.into_iter().map(|x| x / norm).collect())
    }
}

impl Default for MatchedFilter {
    fn default() -> Self {
        Self::new(MatchedFilterConfig::default())
    }
}

/// Two-detector analysis returning `(results, template_l1, template_h1)`.
///
/// `template_offset` is in seconds. Runs a default [`MatchedFilter`] over
/// `H1` then `L1`.
#[allow(clippy::too_many_arguments)]
pub fn matched_filter_analysis(
    strain_h1: &[f64],
    strain_l1: &[f64],
    times: &[f64],
    template_plus: &[f64],
    template_cross: &[f64],
    template_offset: f64,
    fs: f64,
    event_time: f64,
    event_name: &str,
    whitened_bp_h1: &[f64],
    whitened_bp_l1: &[f64],
    bandpass: &dyn ZeroPhaseFilter,
    normalization: f64,
    whiten_fn: &WhitenFn,
    dt: f64,
    observer: Option<&dyn AnalysisObserver>,
) -> AnalysisResult<(BTreeMap<String, DetectorResult>, Vec<f64>, Vec<f64>)> {
    let template = TemplatePair::new(template_plus.to_vec(), template_cross.to_vec(), template_offset)?;
    let detectors = [
        DetectorInput {
            label: "H1",
            strain: strain_h1,
            whitened_bp: whitened_bp_h1,
        },
        DetectorInput {
            label: "L1",
            strain: strain_l1,
            whitened_bp: whitened_bp_l1,
        },
    ];
    let conditioning = Conditioning {
        whiten: whiten_fn,
        bandpass,
        normalization,
        dt,
    };

    let output = MatchedFilter::default().analyze(
        &detectors,
        times,
        &template,
        fs,
        &EventInfo::new(event_name, event_time),
        &conditioning,
        observer,
    )?;

    let template_h1 = output.require_template("H1")?.to_vec();
    let template_l1 = output.require_template("L1")?.to_vec();
    Ok((output.results(), template_l1, template_h1))
}

/// Circular shift: `out[(i + shift) mod n] = values[i]`.
fn roll<T: Copy>(values: &[T], shift: isize) -> Vec<T> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    let split = n - shift.rem_euclid(n as isize) as usize;
    let mut out = Vec::with_capacity(n);
    out.extend_from_slice(&values[split..]);
    out.extend_from_slice(&values[..split]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::filtering::TransferFunction;
    use crate::analysis::psd::tests::gaussian_noise;
    use crate::analysis::transform::tests::DirectDft;
    use crate::analysis::whitening::whiten;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const FS: f64 = 1024.0;

    /// `linspace(0, 2, 2 fs)`.
    fn times() -> Vec<f64> {
        let n = 2 * FS as usize;
        (0..n).map(|i| 2.0 * i as f64 / (n - 1) as f64).collect()
    }

    fn sine_template(t: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let plus = t.iter().map(|&x| (2.0 * PI * 50.0 * x).sin()).collect();
        let cross = t.iter().map(|&x| (2.0 * PI * 50.0 * x).cos()).collect();
        (plus, cross)
    }

    fn noisy(signal: &[f64], seed: u64) -> Vec<f64> {
        let noise = gaussian_noise(signal.len(), seed);
        signal.iter().zip(&noise).map(|(s, n)| s + 0.1 * n).collect()
    }

    fn bandpass() -> TransferFunction {
        TransferFunction::butter_bandpass(4, 20.0, 300.0, FS).unwrap()
    }

    #[derive(Default)]
    struct CountingObserver {
        calls: AtomicUsize,
    }

    impl AnalysisObserver for CountingObserver {
        fn observe(&self, output: &MatchedFilterOutput) {
            assert_eq!(output.detectors.len(), 2);
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn synthetic_pair_gives_finite_snr() {
        crate::logging::init_test_tracing();
        let t = times();
        let (plus, cross) = sine_template(&t);
        let strain_h1 = noisy(&plus, 1);
        let strain_l1 = noisy(&plus, 2);
        let filter = bandpass();

        let (results, template_l1, template_h1) = matched_filter_analysis(
            &strain_h1,
            &strain_l1,
            &t,
            &plus,
            &cross,
            0.0,
            FS,
            1.0,
            "test_event",
            &strain_h1,
            &strain_l1,
            &filter,
            1.0,
            &whiten,
            1.0 / FS,
            None,
        )
        .unwrap();

        assert!(results.contains_key("H1"));
        assert!(results.contains_key("L1"));
        for result in results.values() {
            assert!(result.snr_max.is_finite());
            assert!(result.snr_max > 0.0);
            assert!(result.sigma > 0.0);
            assert!((result.effective_distance * result.snr_max - result.sigma).abs() < 1e-9 * result.sigma);
            assert!((result.horizon * DEFAULT_REFERENCE_SNR - result.sigma).abs() < 1e-9 * result.sigma);
            assert!((0.0..=2.0).contains(&result.time_of_peak));
        }
        assert_eq!(template_l1.len(), t.len());
        assert_eq!(template_h1.len(), t.len());
        assert!(template_h1.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn observer_sees_output_once() {
        let t = times();
        let (plus, cross) = sine_template(&t);
        let strain = noisy(&plus, 3);
        let filter = bandpass();
        let observer = CountingObserver::default();

        matched_filter_analysis(
            &strain, &strain, &t, &plus, &cross, 0.0, FS, 1.0, "obs", &strain, &strain, &filter, 1.0,
            &whiten, 1.0 / FS, Some(&observer),
        )
        .unwrap();
        assert_eq!(observer.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn all_zero_stream_is_degenerate() {
        let t = times();
        let (plus, cross) = sine_template(&t);
        let zeros = vec![0.0; t.len()];
        let strain = noisy(&plus, 4);
        let filter = bandpass();

        let err = matched_filter_analysis(
            &strain, &zeros, &t, &plus, &cross, 0.0, FS, 1.0, "zero", &strain, &zeros, &filter, 1.0,
            &whiten, 1.0 / FS, None,
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::DegenerateInput(_)));
    }

    #[test]
    fn all_zero_template_is_degenerate() {
        let t = times();
        let zeros = vec![0.0; t.len()];
        let strain = noisy(&zeros, 5);
        let filter = bandpass();

        let err = matched_filter_analysis(
            &strain, &strain, &t, &zeros, &zeros, 0.0, FS, 1.0, "flat", &strain, &strain, &filter, 1.0,
            &whiten, 1.0 / FS, None,
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::DegenerateInput(_)));
    }

    #[test]
    fn length_mismatch_is_reported() {
        let t = times();
        let (plus, cross) = sine_template(&t);
        let strain = noisy(&plus, 6);
        let short = &strain[..100];
        let filter = bandpass();

        let err = matched_filter_analysis(
            &strain, short, &t, &plus, &cross, 0.0, FS, 1.0, "short", &strain, short, &filter, 1.0,
            &whiten, 1.0 / FS, None,
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::LengthMismatch { .. }));
    }

    #[test]
    fn bad_scalars_are_rejected() {
        let t = times();
        let (plus, cross) = sine_template(&t);
        let strain = noisy(&plus, 7);
        let filter = bandpass();
        let run = |normalization: f64, event_time: f64, dt: f64| {
            matched_filter_analysis(
                &strain, &strain, &t, &plus, &cross, 0.0, FS, event_time, "bad", &strain, &strain,
                &filter, normalization, &whiten, dt, None,
            )
        };

        assert!(matches!(run(0.0, 1.0, 1.0 / FS), Err(AnalysisError::InvalidInput(_))));
        assert!(matches!(run(f64::NAN, 1.0, 1.0 / FS), Err(AnalysisError::InvalidInput(_))));
        assert!(matches!(run(1.0, 1.0, 0.5), Err(AnalysisError::InvalidInput(_))));
        // Event far outside the data leaves the search window empty.
        assert!(matches!(run(1.0, 100.0, 1.0 / FS), Err(AnalysisError::InvalidInput(_))));
    }

    #[test]
    fn template_offset_shifts_reported_time() {
        let t = times();
        let (plus, cross) = sine_template(&t);
        let strain = noisy(&plus, 8);
        let filter = bandpass();

        let at = |offset: f64| {
            let (results, _, _) = matched_filter_analysis(
                &strain, &strain, &t, &plus, &cross, offset, FS, 1.0 + offset, "offset", &strain,
                &strain, &filter, 1.0, &whiten, 1.0 / FS, None,
            )
            .unwrap();
            results["H1"]
        };
        let base = at(0.0);
        let shifted = at(0.25);
        assert!((shifted.time_of_peak - base.time_of_peak - 0.25).abs() < 1e-9);
        assert!((shifted.snr_max - base.snr_max).abs() < 1e-9);
    }

    #[test]
    fn engine_accepts_other_backends() {
        let n = 256;
        let fs = 128.0;
        let t: Vec<f64> = (0..n).map(|i| i as f64 / fs).collect();
        let plus: Vec<f64> = t.iter().map(|&x| (2.0 * PI * 20.0 * x).sin()).collect();
        let cross: Vec<f64> = t.iter().map(|&x| (2.0 * PI * 20.0 * x).cos()).collect();
        let strain = noisy(&plus, 9);
        let template = TemplatePair::new(plus, cross, 0.0).unwrap();
        let filter = TransferFunction::butter_bandpass(2, 5.0, 50.0, fs).unwrap();
        let conditioning = Conditioning {
            whiten: &whiten,
            bandpass: &filter,
            normalization: 1.0,
            dt: 1.0 / fs,
        };
        let detectors = [DetectorInput {
            label: "V1",
            strain: &strain,
            whitened_bp: &strain,
        }];
        let event = EventInfo::new("virgo", 1.0);

        let fast = MatchedFilter::default()
            .analyze(&detectors, &t, &template, fs, &event, &conditioning, None)
            .unwrap();
        let slow = MatchedFilter::with_transform(MatchedFilterConfig::default(), Box::new(DirectDft))
            .analyze(&detectors, &t, &template, fs, &event, &conditioning, None)
            .unwrap();

        let (a, b) = (fast.results()["V1"], slow.results()["V1"]);
        assert!((a.snr_max - b.snr_max).abs() < 1e-6 * a.snr_max);
        assert!((a.time_of_peak - b.time_of_peak).abs() < 1.5 / fs);
    }

    #[test]
    fn output_serializes_results() {
        let t = times();
        let (plus, cross) = sine_template(&t);
        let strain = noisy(&plus, 10);
        let filter = bandpass();
        let template = TemplatePair::new(plus, cross, 0.0).unwrap();
        let conditioning = Conditioning {
            whiten: &whiten,
            bandpass: &filter,
            normalization: 1.0,
            dt: 1.0 / FS,
        };
        let detectors = [DetectorInput {
            label: "H1",
            strain: &strain,
            whitened_bp: &strain,
        }];

        let output = MatchedFilter::default()
            .analyze(
                &detectors,
                &t,
                &template,
                FS,
                &EventInfo::new("GW-test", 1.0),
                &conditioning,
                Some(&TracingObserver),
            )
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&output.to_json().unwrap()).unwrap();

        assert_eq!(json["event"]["name"], "GW-test");
        assert_eq!(json["detectors"][0]["label"], "H1");
        assert!(json["detectors"][0]["SNRmax"].is_number());
        assert!(json["detectors"][0].get("template").is_none());
        assert_eq!(output.template("H1").map(<[f64]>::len), Some(t.len()));
        assert!(output.template("L1").is_none());
        assert_eq!(output.require_template("H1").unwrap().len(), t.len());
        let err = output.require_template("L1").unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidInput(_)));
        assert!(err.to_string().contains("L1"));
    }

    /// Sine-Gaussian centred on the middle of `t`.
    fn burst_template(t: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let envelope = |x: f64| (-0.5 * ((x - 1.0) / 0.02).powi(2)).exp();
        let plus = t
            .iter()
            .map(|&x| envelope(x) * (2.0 * PI * 100.0 * (x - 1.0)).sin())
            .collect();
        let cross = t
            .iter()
            .map(|&x| envelope(x) * (2.0 * PI * 100.0 * (x - 1.0)).cos())
            .collect();
        (plus, cross)
    }

    #[test]
    fn peak_search_stays_inside_window() {
        let t = times();
        let (plus, cross) = burst_template(&t);
        // Loud burst near 0.4 s, quiet one near 1.5 s.
        let loud = roll(&plus, -614);
        let quiet = roll(&plus, 512);
        let noise = gaussian_noise(t.len(), 11);
        let strain: Vec<f64> = loud
            .iter()
            .zip(&quiet)
            .zip(&noise)
            .map(|((a, b), n)| 20.0 * a + 5.0 * b + 0.1 * n)
            .collect();

        let template = TemplatePair::new(plus, cross, 0.0).unwrap();
        let filter = bandpass();
        let conditioning = Conditioning {
            whiten: &whiten,
            bandpass: &filter,
            normalization: 1.0,
            dt: 1.0 / FS,
        };
        let detectors = [DetectorInput {
            label: "H1",
            strain: &strain,
            whitened_bp: &strain,
        }];
        let run = |event_time: f64, search_window_secs: f64| {
            let config = MatchedFilterConfig {
                psd_segment_secs: 0.25,
                search_window_secs,
                ..MatchedFilterConfig::default()
            };
            MatchedFilter::new(config)
                .analyze(
                    &detectors,
                    &t,
                    &template,
                    FS,
                    &EventInfo::new("window", event_time),
                    &conditioning,
                    None,
                )
                .unwrap()
                .results()["H1"]
        };

        let narrow = run(1.5, 0.2);
        assert!((narrow.time_of_peak - 1.5).abs() <= 0.2);
        assert!((narrow.time_of_peak - 1.5).abs() < 0.02);

        let wide = run(1.0, DEFAULT_SEARCH_WINDOW_SECS);
        assert!((wide.time_of_peak - 0.4).abs() < 0.02);
        assert!(wide.snr_max > 2.0 * narrow.snr_max);
    }

    #[test]
    fn non_finite_strain_is_degenerate() {
        let t = times();
        let (plus, cross) = sine_template(&t);
        let strain_h1 = noisy(&plus, 12);
        let mut strain_l1 = noisy(&plus, 13);
        strain_l1[100] = f64::NAN;
        let filter = bandpass();

        let err = matched_filter_analysis(
            &strain_h1, &strain_l1, &t, &plus, &cross, 0.0, FS, 1.0, "nan", &strain_h1, &strain_h1,
            &filter, 1.0, &whiten, 1.0 / FS, None,
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::DegenerateInput(_)));
        assert!(err.to_string().contains("L1 strain"));
    }

    #[test]
    fn template_pair_validation() {
        assert!(TemplatePair::new(vec![], vec![], 0.0).is_err());
        assert!(matches!(
            TemplatePair::new(vec![1.0, 2.0], vec![1.0], 0.0),
            Err(AnalysisError::LengthMismatch { .. })
        ));
        assert!(TemplatePair::new(vec![1.0], vec![f64::NAN], 0.0).is_err());
        assert!(TemplatePair::new(vec![1.0], vec![1.0], f64::INFINITY).is_err());
    }

    #[test]
    fn phase_shift_combines_polarizations() {
        let pair = TemplatePair::new(vec![1.0, 0.0], vec![0.0, 1.0], 0.0).unwrap();
        let shifted = pair.phase_shifted(PI / 2.0);
        assert!((shifted[0] - 0.0).abs() < 1e-12);
        assert!((shifted[1] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn roll_matches_circular_shift() {
        assert_eq!(roll(&[1, 2, 3, 4, 5], 2), vec![4, 5, 1, 2, 3]);
        assert_eq!(roll(&[1, 2, 3, 4, 5], -1), vec![2, 3, 4, 5, 1]);
        assert_eq!(roll(&[1, 2, 3], 0), vec![1, 2, 3]);
        assert!(roll::<i32>(&[], 3).is_empty());
    }

    #[test]
    fn engine_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MatchedFilter>();
        assert_send_sync::<MatchedFilterOutput>();
    }
}
