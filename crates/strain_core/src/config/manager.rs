//! Config manager for loading, saving, and atomic updates.
//!
//! Key features:
//! - Atomic writes (write to temp file, then rename)
//! - Section-level updates (only modified section is changed)
//! - Validation on load (unknown sections are dropped on rewrite)
//! - Preserves comments and formatting with toml_edit

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use toml_edit::{DocumentMut, Item};
use tracing::{debug, warn};

use super::settings::{ConfigSection, Settings};

/// Errors that can occur during config operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Failed to parse config for editing: {0}")]
    EditParseError(#[from] toml_edit::TomlError),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Manages analysis configuration.
///
/// Handles loading, saving, and atomic section-level updates.
pub struct ConfigManager {
    /// Path to the config file.
    config_path: PathBuf,
    /// Current settings loaded in memory.
    settings: Settings,
}

impl ConfigManager {
    /// Create a new config manager with the given config file path.
    ///
    /// Does not load the config - call `load()` or `load_or_create()` after.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            settings: Settings::default(),
        }
    }

    /// Get the config file path.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Get a reference to the current settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Get a mutable reference to the current settings.
    ///
    /// Changes made here are only in memory until `save()` or
    /// `update_section()` is called.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Load config from file.
    ///
    /// Returns error if file doesn't exist.
    pub fn load(&mut self) -> ConfigResult<()> {
        if !self.config_path.exists() {
            return Err(ConfigError::NotFound(self.config_path.clone()));
        }

        let content = fs::read_to_string(&self.config_path)?;
        self.settings = toml::from_str(&content)?;
        Ok(())
    }

    /// Load config from file, creating with defaults if it doesn't exist.
    ///
    /// Also validates and cleans up the config, saving if changes were made.
    pub fn load_or_create(&mut self) -> ConfigResult<()> {
        if self.config_path.exists() {
            let content = fs::read_to_string(&self.config_path)?;
            let (settings, was_modified) = self.parse_validate_and_clean(&content)?;
            self.settings = settings;

            if was_modified {
                debug!(path = %self.config_path.display(), "Rewriting config with defaults");
                self.save()?;
            }
        } else {
            self.settings = Settings::default();
            self.save()?;
        }
        Ok(())
    }

    /// Parse config content, reporting whether it differs from the canonical form.
    fn parse_validate_and_clean(&self, content: &str) -> ConfigResult<(Settings, bool)> {
        let doc: DocumentMut = content.parse()?;

        // Missing fields pick up defaults here
        let settings: Settings = toml::from_str(content)?;

        let valid_sections: Vec<&str> = ConfigSection::ALL.iter().map(|s| s.table_name()).collect();
        let unknown: Vec<&str> = doc
            .iter()
            .map(|(key, _)| key)
            .filter(|key| !valid_sections.contains(key))
            .collect();
        if !unknown.is_empty() {
            warn!(sections = ?unknown, "Dropping unknown config sections");
        }

        // Any missing key means the file needs the defaults written out
        let missing_keys = ConfigSection::ALL.iter().try_fold(false, |missing, section| {
            let expected = section_table(&settings, *section)?;
            let present = doc.get(section.table_name()).and_then(Item::as_table);
            Ok::<_, ConfigError>(
                missing
                    || match present {
                        Some(table) => expected.iter().any(|(key, _)| !table.contains_key(key)),
                        None => true,
                    },
            )
        })?;

        Ok((settings, !unknown.is_empty() || missing_keys))
    }

    /// Save the entire config atomically.
    ///
    /// Writes to a temp file first, then renames to ensure atomic write.
    pub fn save(&self) -> ConfigResult<()> {
        let content = self.generate_config_with_comments()?;
        self.atomic_write(&content)?;
        Ok(())
    }

    /// Update a specific section atomically.
    ///
    /// This re-reads the file from disk, updates only the specified section,
    /// and writes back atomically. Other sections keep their on-disk values
    /// and comments.
    pub fn update_section(&mut self, section: ConfigSection) -> ConfigResult<()> {
        let current_content = if self.config_path.exists() {
            fs::read_to_string(&self.config_path)?
        } else {
            String::new()
        };

        let mut doc: DocumentMut = if current_content.is_empty() {
            DocumentMut::new()
        } else {
            current_content.parse()?
        };

        doc[section.table_name()] = Item::Table(section_table(&self.settings, section)?);

        self.atomic_write(&doc.to_string())?;
        Ok(())
    }

    /// Generate config content with helpful comments.
    fn generate_config_with_comments(&self) -> ConfigResult<String> {
        let mut output = String::new();

        output.push_str("# Strain analysis configuration\n");
        output.push_str(
            "# This file is auto-generated. Comments may be preserved on section updates.\n\n",
        );

        for (i, section) in ConfigSection::ALL.iter().enumerate() {
            if i > 0 {
                output.push('\n');
            }
            output.push_str(section_comment(*section));
            output.push_str(&format!("[{}]\n", section.table_name()));
            for line in section_toml(&self.settings, *section)?.lines() {
                output.push_str(line);
                output.push('\n');
            }
        }

        Ok(output)
    }

    /// Write content to config file atomically.
    ///
    /// Writes to a temp file first, then renames.
    fn atomic_write(&self, content: &str) -> io::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Same directory so the rename stays on one filesystem
        let temp_path = self.config_path.with_extension("toml.tmp");

        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }

        fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }
}

/// Serialize one section's fields (without its header).
fn section_toml(settings: &Settings, section: ConfigSection) -> ConfigResult<String> {
    Ok(match section {
        ConfigSection::Logging => toml::to_string_pretty(&settings.logging)?,
        ConfigSection::Analysis => toml::to_string_pretty(&settings.analysis)?,
        ConfigSection::Bandpass => toml::to_string_pretty(&settings.bandpass)?,
        ConfigSection::DataQuality => toml::to_string_pretty(&settings.data_quality)?,
    })
}

/// One section as an editable table.
fn section_table(settings: &Settings, section: ConfigSection) -> ConfigResult<toml_edit::Table> {
    let section_doc: DocumentMut = section_toml(settings, section)?.parse()?;
    Ok(section_doc.as_table().clone())
}

fn section_comment(section: ConfigSection) -> &'static str {
    match section {
        ConfigSection::Logging => "# Logging configuration\n",
        ConfigSection::Analysis => "# Matched-filter settings\n",
        ConfigSection::Bandpass => "# Band-pass applied to whitened data and templates\n",
        ConfigSection::DataQuality => "# Data-quality bitmask decoding\n",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BandpassDesign;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn load_or_create_creates_default() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(".config").join("settings.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        assert!(config_path.exists());
        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[logging]"));
        assert!(content.contains("[data_quality]"));
        assert!(content.starts_with("# Strain analysis configuration"));

        // The generated file parses back to the defaults
        let mut reloaded = ConfigManager::new(&config_path);
        reloaded.load().unwrap();
        assert_eq!(reloaded.settings().analysis.reference_snr, 8.0);
    }

    #[test]
    fn load_or_create_preserves_existing() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("settings.toml");

        fs::write(&config_path, "[analysis]\nsearch_window_secs = 0.5\n").unwrap();

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        assert_eq!(manager.settings().analysis.search_window_secs, 0.5);
        // Missing keys were written back
        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[bandpass]"));
        assert!(content.contains("search_window_secs = 0.5"));
    }

    #[test]
    fn load_or_create_drops_unknown_sections() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("settings.toml");

        fs::write(&config_path, "[plotting]\nenabled = true\n").unwrap();

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        let content = fs::read_to_string(&config_path).unwrap();
        assert!(!content.contains("[plotting]"));
        assert!(content.contains("[analysis]"));
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let mut manager = ConfigManager::new(dir.path().join("absent.toml"));
        assert!(matches!(manager.load(), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn update_section_only_changes_target() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("settings.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        // Hand edit on disk that the in-memory copy does not know about
        let edited = fs::read_to_string(&config_path)
            .unwrap()
            .replace("search_window_secs = 5.0", "search_window_secs = 2.0");
        fs::write(&config_path, edited).unwrap();

        manager.settings_mut().bandpass.design = BandpassDesign::BiquadCascade;
        manager.update_section(ConfigSection::Bandpass).unwrap();

        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("design = \"biquad_cascade\""));
        assert!(content.contains("search_window_secs = 2.0"));
        assert!(content.contains("# Matched-filter settings"));
    }

    #[test]
    fn atomic_write_creates_no_temp_on_success() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("settings.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        let temp_path = config_path.with_extension("toml.tmp");
        assert!(!temp_path.exists());
    }
}
