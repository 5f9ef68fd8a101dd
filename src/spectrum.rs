//! Per-frame constant-Q features.
//!
//! The CQT is taken once over a whole waveform (or its half-frame shifted
//! tail) with a hop equal to the frame size, so CQT column `i` is centered on
//! the start of frame `i`. The transform emits one column per hop plus an
//! edge column dominated by zero padding; that last column is dropped and the
//! first `frame_count` columns are kept.

use ndarray::{Array2, s};
use serde::Deserialize;

use crate::convert::note_to_hz;
use crate::cqt::{CqtConfig, CqtKernel};
use crate::frame::Alignment;
use crate::{Error, Result};

/// Octaves spanned by the feature bins.
pub const N_OCTAVES: usize = 4;
/// Quarter-tone resolution.
pub const BINS_PER_OCTAVE: usize = 24;
/// Feature dimensionality, independent of the frame size.
pub const N_BINS: usize = N_OCTAVES * BINS_PER_OCTAVE;

/// Relative tolerance on `fmax / fmin == 2^n_octaves`.
const SPAN_TOLERANCE: f32 = 1e-4;

/// Frequency layout of the spectral features.
///
/// The span is given by note names but is always checked numerically, since
/// octave numbering differs between conventions.
///
/// # Example
/// ```
/// use cqtstore::spectrum::SpectralConfig;
///
/// let config = SpectralConfig::default();
/// let (fmin, fmax) = config.frequency_range().unwrap();
/// assert!((fmax / fmin - 16.0).abs() < 1e-3);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpectralConfig {
    /// Note at the center of the lowest bin (default: C3)
    pub fmin_note: String,
    /// Note one octave-span above `fmin_note` (default: C7)
    pub fmax_note: String,
    /// Octaves between `fmin_note` and `fmax_note` (default: 4)
    pub n_octaves: usize,
    /// Bins per octave (default: 24)
    pub bins_per_octave: usize,
    /// CQT filter scale (default: 1.0)
    pub filter_scale: f32,
}

impl SpectralConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notes(mut self, fmin_note: &str, fmax_note: &str) -> Self {
        self.fmin_note = fmin_note.to_string();
        self.fmax_note = fmax_note.to_string();
        self
    }

    pub fn with_n_octaves(mut self, n_octaves: usize) -> Self {
        self.n_octaves = n_octaves;
        self
    }

    pub fn with_bins_per_octave(mut self, bins_per_octave: usize) -> Self {
        self.bins_per_octave = bins_per_octave;
        self
    }

    pub fn with_filter_scale(mut self, filter_scale: f32) -> Self {
        self.filter_scale = filter_scale;
        self
    }

    pub fn n_bins(&self) -> usize {
        self.n_octaves * self.bins_per_octave
    }

    /// Resolve the note names to `(fmin, fmax)` in Hz.
    ///
    /// # Errors
    /// [`Error::InvalidConfiguration`] if a note does not parse or
    /// `fmax / fmin` is not `2^n_octaves`.
    pub fn frequency_range(&self) -> Result<(f32, f32)> {
        let resolve = |note: &str| {
            note_to_hz(note).ok_or_else(|| Error::config(format!("unrecognized note name {note:?}")))
        };
        let fmin = resolve(&self.fmin_note)?;
        let fmax = resolve(&self.fmax_note)?;

        let expected = 2.0f32.powi(self.n_octaves as i32);
        let ratio = fmax / fmin;
        if ((ratio - expected) / expected).abs() > SPAN_TOLERANCE {
            return Err(Error::config(format!(
                "{} ({fmin:.2} Hz) to {} ({fmax:.2} Hz) spans a ratio of {ratio:.4}, \
                 expected {expected} for {} octaves",
                self.fmin_note, self.fmax_note, self.n_octaves
            )));
        }
        Ok((fmin, fmax))
    }
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            fmin_note: "C3".to_string(),
            fmax_note: "C7".to_string(),
            n_octaves: N_OCTAVES,
            bins_per_octave: BINS_PER_OCTAVE,
            filter_scale: 1.0,
        }
    }
}

/// Computes per-frame CQT magnitudes aligned with the frame grid.
pub struct SpectralExtractor {
    kernel: CqtKernel,
    frame_size: usize,
    n_bins: usize,
    fmin: f32,
    fmax: f32,
}

impl SpectralExtractor {
    /// Plan the transform for clips at `sample_rate` cut into frames of
    /// `frame_size` samples.
    ///
    /// # Errors
    /// [`Error::InvalidConfiguration`] if the frequency span fails its
    /// numeric check, reaches Nyquist, or a size is zero.
    pub fn new(sample_rate: u32, frame_size: usize, config: &SpectralConfig) -> Result<Self> {
        if frame_size == 0 {
            return Err(Error::config("frame_size must be greater than zero"));
        }
        if config.n_octaves == 0 || config.bins_per_octave == 0 {
            return Err(Error::config("n_octaves and bins_per_octave must be positive"));
        }
        let (fmin, fmax) = config.frequency_range()?;
        if fmax >= sample_rate as f32 / 2.0 {
            return Err(Error::config(format!(
                "fmax {fmax:.1} Hz is not below Nyquist for a {sample_rate} Hz corpus"
            )));
        }

        let cqt = CqtConfig::new(sample_rate, frame_size)
            .with_fmin(fmin)
            .with_n_bins(config.n_bins())
            .with_bins_per_octave(config.bins_per_octave)
            .with_filter_scale(config.filter_scale);
        let kernel = CqtKernel::new(&cqt)?;

        Ok(Self {
            kernel,
            frame_size,
            n_bins: config.n_bins(),
            fmin,
            fmax,
        })
    }

    pub fn n_bins(&self) -> usize {
        self.n_bins
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// `(fmin, fmax)` in Hz.
    pub fn frequency_range(&self) -> (f32, f32) {
        (self.fmin, self.fmax)
    }

    /// Features for `frame_count` frames of `waveform` on `alignment`.
    ///
    /// Returns shape `(frame_count, n_bins)`, rows ordered by time. Row `i`
    /// is the CQT column centered on the start of frame `i`.
    ///
    /// # Errors
    /// [`Error::InsufficientSamples`] if the waveform cannot supply
    /// `frame_count` columns plus the dropped edge column, and
    /// [`Error::TransformFailure`] if the transform rejects the input.
    pub fn extract(
        &self,
        waveform: &[f32],
        alignment: Alignment,
        frame_count: usize,
    ) -> Result<Array2<f32>> {
        if frame_count == 0 {
            return Ok(Array2::zeros((0, self.n_bins)));
        }

        let offset = alignment.offset(self.frame_size);
        let required = offset + frame_count * self.frame_size;
        if waveform.len() < required {
            return Err(Error::InsufficientSamples {
                required,
                available: waveform.len(),
            });
        }

        let magnitude = self.kernel.magnitude(&waveform[offset..])?;
        let columns = magnitude.ncols() - 1;
        if columns < frame_count {
            return Err(Error::InsufficientSamples {
                required,
                available: waveform.len(),
            });
        }

        let kept = magnitude.slice(s![.., ..frame_count]);
        Ok(kept.t().as_standard_layout().into_owned())
    }
}
