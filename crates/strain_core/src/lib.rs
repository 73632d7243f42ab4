//! Strain Core - analysis library for gravitational-wave detector strain.
//!
//! This crate contains the numeric core with no plotting or file I/O:
//! data-quality segment bookkeeping, spectral whitening, and the
//! matched-filter detection engine. Loaders and plotting front-ends are
//! expected to live elsewhere and hand plain sample slices to this crate.

pub mod analysis;
pub mod config;
pub mod logging;
pub mod segments;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_returns_value() {
        assert!(!version().is_empty());
    }
}
