//! Run configuration.
//!
//! [`PipelineConfig`] can be built in code with `with_*` methods or loaded
//! from a TOML file; every field has a default.
//!
//! ```toml
//! frame_size = 1024
//! boundary_policy = "reject"
//! expected_sample_rate = 22050
//! verify_frames = true
//! parallel = false
//!
//! [spectral]
//! fmin_note = "C3"
//! fmax_note = "C7"
//! n_octaves = 4
//! bins_per_octave = 24
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::grid::BoundaryPolicy;
use crate::spectrum::SpectralConfig;
use crate::Result;

/// Default frame size in samples.
pub const DEFAULT_FRAME_SIZE: usize = 1024;

/// Configuration for a feature extraction run.
///
/// # Example
/// ```
/// use cqtstore::config::PipelineConfig;
/// use cqtstore::grid::BoundaryPolicy;
///
/// let config = PipelineConfig::new()
///     .with_frame_size(2048)
///     .with_boundary_policy(BoundaryPolicy::AllowEmpty)
///     .with_expected_sample_rate(22050);
/// assert_eq!(config.frame_size, 2048);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Samples per frame, also the CQT hop (default: 1024)
    pub frame_size: usize,
    /// Handling of clips too short for one frame pair (default: reject)
    pub boundary_policy: BoundaryPolicy,
    /// Spectral feature layout
    pub spectral: SpectralConfig,
    /// Fail unless the corpus has this sample rate. No resampling is done.
    pub expected_sample_rate: Option<u32>,
    /// Check one random frame per alignment against its source after each
    /// clip (default: true)
    pub verify_frames: bool,
    /// Seed for choosing the checked frame
    pub verify_seed: u64,
    /// Process clips on a worker pool (needs the `parallel` feature)
    pub parallel: bool,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn with_frame_size(mut self, frame_size: usize) -> Self {
        self.frame_size = frame_size;
        self
    }

    pub fn with_boundary_policy(mut self, policy: BoundaryPolicy) -> Self {
        self.boundary_policy = policy;
        self
    }

    pub fn with_spectral(mut self, spectral: SpectralConfig) -> Self {
        self.spectral = spectral;
        self
    }

    pub fn with_expected_sample_rate(mut self, sample_rate: u32) -> Self {
        self.expected_sample_rate = Some(sample_rate);
        self
    }

    pub fn with_verify_frames(mut self, verify: bool) -> Self {
        self.verify_frames = verify;
        self
    }

    pub fn with_verify_seed(mut self, seed: u64) -> Self {
        self.verify_seed = seed;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_FRAME_SIZE,
            boundary_policy: BoundaryPolicy::Reject,
            spectral: SpectralConfig::default(),
            expected_sample_rate: None,
            verify_frames: true,
            verify_seed: 0x5eed,
            parallel: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(PipelineConfig::from_toml_str("").unwrap(), PipelineConfig::default());
    }

    #[test]
    fn test_toml_overrides() {
        let config = PipelineConfig::from_toml_str(
            r#"
            frame_size = 512
            boundary_policy = "allow_empty"
            expected_sample_rate = 22050
            parallel = true

            [spectral]
            fmin_note = "C2"
            fmax_note = "C6"
            "#,
        )
        .unwrap();
        assert_eq!(config.frame_size, 512);
        assert_eq!(config.boundary_policy, BoundaryPolicy::AllowEmpty);
        assert_eq!(config.expected_sample_rate, Some(22050));
        assert!(config.parallel);
        assert!(config.verify_frames);
        assert_eq!(config.spectral.fmin_note, "C2");
        assert_eq!(config.spectral.bins_per_octave, 24);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = PipelineConfig::from_toml_str("frame_length = 512");
        assert!(matches!(result, Err(Error::Toml(_))));
    }
}
