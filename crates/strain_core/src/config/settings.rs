//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use serde::{Deserialize, Serialize};

use crate::analysis::{
    AnalysisResult, BiquadCascade, MatchedFilterConfig, TransferFunction, ZeroPhaseFilter,
    DEFAULT_PSD_SEGMENT_SECS, DEFAULT_REFERENCE_SNR, DEFAULT_SEARCH_WINDOW_SECS,
};
use crate::logging::{LogConfig, LogLevel};
use crate::segments::{decode_dq_mask, DqBlock, NamedChannels, SegmentResult, DQ_SHORT_NAMES};

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Matched-filter settings.
    #[serde(default)]
    pub analysis: AnalysisSettings,

    /// Band-pass filter design.
    #[serde(default)]
    pub bandpass: BandpassSettings,

    /// Data-quality decoding.
    #[serde(default)]
    pub data_quality: DataQualitySettings,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default level when `RUST_LOG` is unset.
    #[serde(default)]
    pub level: LogLevel,

    /// Include the event target (module path).
    #[serde(default = "default_true")]
    pub with_target: bool,

    /// Include thread ids.
    #[serde(default)]
    pub with_thread_ids: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            with_target: true,
            with_thread_ids: false,
        }
    }
}

impl LoggingSettings {
    /// Subscriber options for [`crate::logging::init_tracing_with`].
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            with_target: self.with_target,
            with_thread_ids: self.with_thread_ids,
        }
    }
}

/// Matched-filter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Welch segment length in seconds.
    #[serde(default = "default_psd_segment_secs")]
    pub psd_segment_secs: f64,

    /// Overlap between Welch segments as a fraction.
    #[serde(default = "default_psd_overlap")]
    pub psd_overlap_fraction: f64,

    /// Tukey fraction of the Welch window.
    #[serde(default = "default_psd_window_alpha")]
    pub psd_window_alpha: f64,

    /// Tukey fraction of the data/template window.
    #[serde(default = "default_data_window_alpha")]
    pub data_window_alpha: f64,

    /// Half-width of the peak search around the event, in seconds.
    #[serde(default = "default_search_window")]
    pub search_window_secs: f64,

    /// SNR at which horizon distance is quoted.
    #[serde(default = "default_reference_snr")]
    pub reference_snr: f64,

    /// Divisor applied to the conditioned best-fit template.
    #[serde(default = "default_normalization")]
    pub normalization: f64,
}

fn default_psd_segment_secs() -> f64 {
    DEFAULT_PSD_SEGMENT_SECS
}

fn default_psd_overlap() -> f64 {
    0.5
}

fn default_psd_window_alpha() -> f64 {
    0.25
}

fn default_data_window_alpha() -> f64 {
    0.125
}

fn default_search_window() -> f64 {
    DEFAULT_SEARCH_WINDOW_SECS
}

fn default_reference_snr() -> f64 {
    DEFAULT_REFERENCE_SNR
}

fn default_normalization() -> f64 {
    1.0
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            psd_segment_secs: default_psd_segment_secs(),
            psd_overlap_fraction: default_psd_overlap(),
            psd_window_alpha: default_psd_window_alpha(),
            data_window_alpha: default_data_window_alpha(),
            search_window_secs: default_search_window(),
            reference_snr: default_reference_snr(),
            normalization: default_normalization(),
        }
    }
}

impl From<&AnalysisSettings> for MatchedFilterConfig {
    fn from(settings: &AnalysisSettings) -> Self {
        Self {
            psd_segment_secs: settings.psd_segment_secs,
            psd_overlap_fraction: settings.psd_overlap_fraction,
            psd_window_alpha: settings.psd_window_alpha,
            data_window_alpha: settings.data_window_alpha,
            search_window_secs: settings.search_window_secs,
            reference_snr: settings.reference_snr,
        }
    }
}

/// How the band-pass is realised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandpassDesign {
    /// Single Butterworth transfer function, odd-extended `filtfilt`.
    #[default]
    Butterworth,
    /// Cascaded Butterworth biquads.
    BiquadCascade,
}

/// Band-pass configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandpassSettings {
    /// Filter realisation.
    #[serde(default)]
    pub design: BandpassDesign,

    /// Prototype order.
    #[serde(default = "default_bandpass_order")]
    pub order: usize,

    /// Lower -3 dB frequency in Hz.
    #[serde(default = "default_low_hz")]
    pub low_hz: f64,

    /// Upper -3 dB frequency in Hz.
    #[serde(default = "default_high_hz")]
    pub high_hz: f64,
}

fn default_bandpass_order() -> usize {
    4
}

fn default_low_hz() -> f64 {
    20.0
}

fn default_high_hz() -> f64 {
    300.0
}

impl Default for BandpassSettings {
    fn default() -> Self {
        Self {
            design: BandpassDesign::default(),
            order: default_bandpass_order(),
            low_hz: default_low_hz(),
            high_hz: default_high_hz(),
        }
    }
}

impl BandpassSettings {
    /// Build the configured filter for data sampled at `fs` Hz.
    pub fn build(&self, fs: f64) -> AnalysisResult<Box<dyn ZeroPhaseFilter>> {
        let filter: Box<dyn ZeroPhaseFilter> = match self.design {
            BandpassDesign::Butterworth => Box::new(TransferFunction::butter_bandpass(
                self.order,
                self.low_hz,
                self.high_hz,
                fs,
            )?),
            BandpassDesign::BiquadCascade => {
                Box::new(BiquadCascade::bandpass(fs, self.low_hz, self.high_hz, self.order)?)
            }
        };
        Ok(filter)
    }
}

/// Data-quality decoding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataQualitySettings {
    /// Flag aliased as the `"DEFAULT"` channel.
    #[serde(default = "default_flag")]
    pub default_flag: String,

    /// DQ sample rate in Hz.
    #[serde(default = "default_dq_rate")]
    pub sample_rate: u32,

    /// Flag name for each bit of the DQ mask, lowest bit first.
    #[serde(default = "default_short_names")]
    pub short_names: Vec<String>,
}

fn default_flag() -> String {
    "DATA".to_string()
}

fn default_dq_rate() -> u32 {
    1
}

fn default_short_names() -> Vec<String> {
    DQ_SHORT_NAMES.iter().map(|s| s.to_string()).collect()
}

impl Default for DataQualitySettings {
    fn default() -> Self {
        Self {
            default_flag: default_flag(),
            sample_rate: default_dq_rate(),
            short_names: default_short_names(),
        }
    }
}

impl DataQualitySettings {
    /// Split a DQ bitmask into named channels with the default flag aliased.
    pub fn decode(&self, mask: &[u32]) -> SegmentResult<NamedChannels> {
        decode_dq_mask(mask, &self.short_names).with_default(&self.default_flag)
    }

    /// Decode a DQ bitmask starting at `gps_start` into an archive block.
    pub fn block(&self, gps_start: i64, mask: &[u32]) -> SegmentResult<DqBlock> {
        Ok(DqBlock {
            gps_start,
            sample_rate: self.sample_rate,
            channels: self.decode(mask)?,
        })
    }
}

/// Names of config sections for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigSection {
    Logging,
    Analysis,
    Bandpass,
    DataQuality,
}

impl ConfigSection {
    /// All sections, in file order.
    pub const ALL: [ConfigSection; 4] = [
        ConfigSection::Logging,
        ConfigSection::Analysis,
        ConfigSection::Bandpass,
        ConfigSection::DataQuality,
    ];

    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Logging => "logging",
            ConfigSection::Analysis => "analysis",
            ConfigSection::Bandpass => "bandpass",
            ConfigSection::DataQuality => "data_quality",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::{channel_to_slices, get_segments, ChannelArchive, DqChannel};

    #[test]
    fn default_settings_serializes() {
        let settings = Settings::default();
        let toml = toml::to_string_pretty(&settings).unwrap();
        assert!(toml.contains("[logging]"));
        assert!(toml.contains("[analysis]"));
        assert!(toml.contains("[data_quality]"));
        assert!(toml.contains("search_window_secs"));
    }

    #[test]
    fn settings_round_trip() {
        let settings = Settings::default();
        let toml = toml::to_string_pretty(&settings).unwrap();
        let parsed: Settings = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.analysis.reference_snr, settings.analysis.reference_snr);
        assert_eq!(parsed.bandpass.design, settings.bandpass.design);
        assert_eq!(parsed.data_quality.short_names, settings.data_quality.short_names);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let minimal = "[bandpass]\ndesign = \"biquad_cascade\"\nlow_hz = 35.0";
        let parsed: Settings = toml::from_str(minimal).unwrap();
        // Custom values preserved
        assert_eq!(parsed.bandpass.design, BandpassDesign::BiquadCascade);
        assert_eq!(parsed.bandpass.low_hz, 35.0);
        // Defaults applied for missing
        assert_eq!(parsed.bandpass.high_hz, 300.0);
        assert_eq!(parsed.analysis.psd_segment_secs, 4.0);
        assert_eq!(parsed.data_quality.default_flag, "DATA");
        assert_eq!(parsed.logging.level, LogLevel::Info);
    }

    #[test]
    fn analysis_settings_convert_to_config() {
        let settings = AnalysisSettings {
            search_window_secs: 0.5,
            ..AnalysisSettings::default()
        };
        let config = MatchedFilterConfig::from(&settings);
        assert_eq!(config.search_window_secs, 0.5);
        assert_eq!(config.reference_snr, MatchedFilterConfig::default().reference_snr);
    }

    #[test]
    fn bandpass_builds_both_designs() {
        let input: Vec<f64> = (0..512).map(|i| (i as f64 * 0.7).sin()).collect();
        for design in [BandpassDesign::Butterworth, BandpassDesign::BiquadCascade] {
            let settings = BandpassSettings {
                design,
                ..BandpassSettings::default()
            };
            let filter = settings.build(1024.0).unwrap();
            assert_eq!(filter.filtfilt(&input).unwrap().len(), input.len());
        }

        let bad = BandpassSettings {
            high_hz: 900.0,
            ..BandpassSettings::default()
        };
        assert!(bad.build(1024.0).is_err());
    }

    #[test]
    fn data_quality_decode_aliases_default() {
        let settings = DataQualitySettings::default();
        let channels = settings.decode(&[1, 1, 0, 3]).unwrap();
        let slices = channel_to_slices(&DqChannel::Named(channels), None).unwrap();
        assert_eq!(slices, vec![0..2, 3..4]);

        let unknown = DataQualitySettings {
            default_flag: "NOT_A_FLAG".to_string(),
            ..DataQualitySettings::default()
        };
        assert!(unknown.decode(&[1]).is_err());
    }

    #[test]
    fn data_quality_block_feeds_archive() {
        let settings = DataQualitySettings::default();
        let mut archive = ChannelArchive::new();
        archive.add_block("L1", settings.block(1000, &[1, 1, 0, 0, 1]).unwrap());

        let list = get_segments(&archive, 1000, 1005, "L1", "DEFAULT").unwrap();
        let spans: Vec<(i64, i64)> = list.iter().map(|s| (s.start(), s.stop())).collect();
        assert_eq!(spans, vec![(1000, 1002), (1004, 1005)]);
    }

    #[test]
    fn section_table_names() {
        let names: Vec<_> = ConfigSection::ALL.iter().map(|s| s.table_name()).collect();
        assert_eq!(names, vec!["logging", "analysis", "bandpass", "data_quality"]);
    }
}
