//! Logging types and configuration.

use serde::{Deserialize, Serialize};

/// Log level for filtering messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum LogLevel {
    /// Trace-level debugging (very verbose).
    Trace,
    /// Debug information.
    Debug,
    /// General information.
    #[default]
    Info,
    /// Warnings.
    Warn,
    /// Errors.
    Error,
}

impl LogLevel {
    /// Convert to tracing level.
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Subscriber options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Default level when `RUST_LOG` is unset.
    pub level: LogLevel,
    /// Show the event target (module path).
    pub with_target: bool,
    /// Show thread ids, useful when detectors run on separate threads.
    pub with_thread_ids: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            with_target: true,
            with_thread_ids: false,
        }
    }
}

impl LogConfig {
    /// Verbose configuration for diagnosing a single analysis.
    pub fn debug() -> Self {
        Self {
            level: LogLevel::Debug,
            ..Self::default()
        }
    }

    /// Everything, including per-series traces.
    pub fn trace() -> Self {
        Self {
            level: LogLevel::Trace,
            with_thread_ids: true,
            ..Self::default()
        }
    }
}
