//! Logging infrastructure for strain analysis.
//!
//! This module provides:
//! - Global `tracing` subscriber setup honouring `RUST_LOG`
//! - Log level and subscriber option types shared with the config
//!
//! Library code only emits `tracing` events; installing a subscriber is
//! left to the application.
//!
//! # Example
//!
//! ```no_run
//! use strain_core::logging::{init_tracing, LogLevel};
//!
//! init_tracing(LogLevel::Info);
//! tracing::info!("Starting analysis");
//! ```

mod types;

pub use types::{LogConfig, LogLevel};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize global tracing subscriber for application-wide logging.
///
/// This sets up a subscriber that:
/// - Respects RUST_LOG environment variable
/// - Falls back to the provided default level
/// - Outputs to stderr with timestamps
///
/// Should be called once at application startup.
pub fn init_tracing(default_level: LogLevel) {
    init_tracing_with(&LogConfig {
        level: default_level,
        ..LogConfig::default()
    });
}

/// Initialize the global subscriber from explicit options.
///
/// Does nothing if a global subscriber is already installed.
pub fn init_tracing_with(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_to_filter_str(config.level)));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(config.with_target)
                .with_thread_ids(config.with_thread_ids),
        )
        .with(filter)
        .try_init();
}

/// Initialize tracing for tests (only logs warnings and above).
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}

/// Convert LogLevel to filter string.
fn level_to_filter_str(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_to_filter_works() {
        assert_eq!(level_to_filter_str(LogLevel::Debug), "debug");
        assert_eq!(level_to_filter_str(LogLevel::Info), "info");
    }

    #[test]
    fn test_tracing_can_be_initialized_twice() {
        init_test_tracing();
        init_test_tracing();
        tracing::warn!("test subscriber installed");
    }
}
