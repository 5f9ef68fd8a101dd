//! Constant-Q Transform (CQT).
//!
//! Logarithmically spaced frequency bins with a constant number of bins per
//! octave, computed with the pseudo-CQT method: one windowed FFT per hop,
//! sampled at each bin's center frequency.

use std::f32::consts::PI;

use ndarray::Array2;
use num_complex::Complex32;

use crate::convert::cqt_frequencies;
use crate::fft::RealFftPlan;
use crate::{Error, Result};

/// Configuration for the Constant-Q Transform.
///
/// # Example
/// ```
/// use cqtstore::cqt::{CqtConfig, CqtKernel};
///
/// let config = CqtConfig::new(22050, 1024)
///     .with_fmin(130.81)
///     .with_n_bins(96)
///     .with_bins_per_octave(24);
/// let kernel = CqtKernel::new(&config).unwrap();
/// let columns = kernel.magnitude(&vec![0.1f32; 22050]).unwrap();
/// assert_eq!(columns.dim(), (96, 22));
/// ```
#[derive(Debug, Clone)]
pub struct CqtConfig {
    /// Sample rate
    pub sr: u32,
    /// Number of samples between successive CQT columns
    pub hop_length: usize,
    /// Center frequency of the lowest bin
    pub fmin: f32,
    /// Number of frequency bins
    pub n_bins: usize,
    /// Number of bins per octave
    pub bins_per_octave: usize,
    /// Filter scale factor (default: 1.0)
    pub filter_scale: f32,
}

impl CqtConfig {
    /// Create a new CQT configuration with defaults (C1, 7 octaves of
    /// semitones).
    pub fn new(sr: u32, hop_length: usize) -> Self {
        Self {
            sr,
            hop_length,
            fmin: 32.70,
            n_bins: 84,
            bins_per_octave: 12,
            filter_scale: 1.0,
        }
    }

    pub fn with_fmin(mut self, fmin: f32) -> Self {
        self.fmin = fmin;
        self
    }

    pub fn with_n_bins(mut self, n_bins: usize) -> Self {
        self.n_bins = n_bins;
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
}

/// Where each CQT bin reads from the FFT spectrum.
#[derive(Debug, Clone, Copy)]
struct BinTap {
    low: usize,
    high: usize,
    frac: f32,
    scale: f32,
}

/// Precomputed FFT plan, window and bin taps for one [`CqtConfig`].
///
/// Building the kernel is the expensive part; a kernel can then transform any
/// number of signals.
pub struct CqtKernel {
    hop_length: usize,
    n_fft: usize,
    window: Vec<f32>,
    taps: Vec<BinTap>,
    plan: RealFftPlan,
}

impl CqtKernel {
    /// Plan the transform described by `config`.
    ///
    /// # Errors
    /// [`Error::InvalidConfiguration`] for zero bins, zero hop, a
    /// non-positive `fmin`, or a top bin at or above Nyquist.
    pub fn new(config: &CqtConfig) -> Result<Self> {
        if config.n_bins == 0 {
            return Err(Error::config("n_bins must be greater than zero"));
        }
        if config.bins_per_octave == 0 {
            return Err(Error::config("bins_per_octave must be greater than zero"));
        }
        if config.hop_length == 0 {
            return Err(Error::config("hop_length must be greater than zero"));
        }
        if !(config.fmin.is_finite() && config.fmin > 0.0) {
            return Err(Error::config(format!("fmin must be positive, got {}", config.fmin)));
        }

        let freqs = cqt_frequencies(config.n_bins, config.fmin, config.bins_per_octave);
        let nyquist = config.sr as f32 / 2.0;
        let top = freqs[freqs.len() - 1];
        if top >= nyquist {
            return Err(Error::config(format!(
                "highest CQT bin {top:.1} Hz is not below Nyquist ({nyquist:.1} Hz)"
            )));
        }

        // Filter length for each bin; the longest sets the FFT size
        let q = config.filter_scale / (2.0_f32.powf(1.0 / config.bins_per_octave as f32) - 1.0);
        let lengths: Vec<usize> = freqs
            .iter()
            .map(|&f| ((config.sr as f32 * q / f).ceil() as usize).max(1))
            .collect();
        let max_len = lengths.iter().copied().max().unwrap_or(2048);
        let n_fft = max_len.next_power_of_two().max(512);
        let half = n_fft / 2;

        let taps = freqs
            .iter()
            .zip(&lengths)
            .map(|(&freq, &len)| {
                let fft_bin = freq * n_fft as f32 / config.sr as f32;
                let low = (fft_bin.floor() as usize).min(half);
                BinTap {
                    low,
                    high: (low + 1).min(half),
                    frac: fft_bin - low as f32,
                    scale: (n_fft as f32 / len as f32).sqrt(),
                }
            })
            .collect();

        Ok(Self {
            hop_length: config.hop_length,
            n_fft,
            window: hann(n_fft),
            taps,
            plan: RealFftPlan::new(n_fft),
        })
    }

    /// Compute the CQT of `y`.
    ///
    /// Columns are centered: column `t` is the analysis window centered on
    /// sample `t * hop_length`, with zeros outside the signal. The result has
    /// shape `(n_bins, y.len() / hop_length + 1)`.
    ///
    /// # Errors
    /// [`Error::TransformFailure`] if `y` is empty or contains NaN or
    /// infinite samples.
    pub fn transform(&self, y: &[f32]) -> Result<Array2<Complex32>> {
        if y.is_empty() {
            return Err(Error::TransformFailure {
                reason: "audio data is empty".to_string(),
            });
        }
        if let Some(i) = y.iter().position(|v| !v.is_finite()) {
            return Err(Error::TransformFailure {
                reason: format!("non-finite sample at index {i}"),
            });
        }

        let n_frames = y.len() / self.hop_length + 1;
        let half = self.n_fft / 2;
        let mut out = Array2::<Complex32>::zeros((self.taps.len(), n_frames));

        let mut buffer = vec![0.0f32; self.n_fft];
        let mut spectrum = self.plan.make_output_vec();
        let mut scratch = self.plan.make_scratch_vec();

        for frame_idx in 0..n_frames {
            let center = frame_idx * self.hop_length;

            for (i, (buf, &w)) in buffer.iter_mut().zip(&self.window).enumerate() {
                let sample_idx = (center + i).checked_sub(half);
                *buf = match sample_idx {
                    Some(idx) if idx < y.len() => y[idx] * w,
                    _ => 0.0,
                };
            }

            self.plan.forward(&mut buffer, &mut spectrum, &mut scratch)?;

            for (bin_idx, tap) in self.taps.iter().enumerate() {
                let val = if tap.low < half {
                    spectrum[tap.low] * (1.0 - tap.frac) + spectrum[tap.high] * tap.frac
                } else {
                    Complex32::new(0.0, 0.0)
                };
                out[(bin_idx, frame_idx)] = val * tap.scale;
            }
        }

        Ok(out)
    }

    /// Magnitude of [`CqtKernel::transform`].
    pub fn magnitude(&self, y: &[f32]) -> Result<Array2<f32>> {
        Ok(self.transform(y)?.mapv(|c| c.norm()))
    }
}

/// Periodic Hann window.
fn hann(n: usize) -> Vec<f32> {
    let m = n as f32;
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / m).cos())
        .collect()
}
