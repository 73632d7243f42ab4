//! Configuration management for strain analysis.
//!
//! This module provides:
//! - TOML-based configuration with logical sections
//! - Atomic file writes (write to temp, then rename)
//! - Section-level updates (only changed section is modified)
//! - Validation on load with automatic defaults
//!
//! # Example
//!
//! ```no_run
//! use strain_core::config::{ConfigManager, ConfigSection};
//!
//! // Create manager and load (or create default) config
//! let mut config = ConfigManager::new(".config/strain.toml");
//! config.load_or_create().unwrap();
//!
//! // Read settings
//! println!("Search window: {} s", config.settings().analysis.search_window_secs);
//!
//! // Modify a setting
//! config.settings_mut().bandpass.low_hz = 35.0;
//!
//! // Save just the bandpass section atomically
//! config.update_section(ConfigSection::Bandpass).unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    AnalysisSettings, BandpassDesign, BandpassSettings, ConfigSection, DataQualitySettings,
    LoggingSettings, Settings,
};
