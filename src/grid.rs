//! Frame grid arithmetic.
//!
//! A clip of `samples_per_clip` samples is cut into frames of `frame_size`
//! samples twice: once starting at sample 0 (the aligned grid) and once
//! starting half a frame later (the shifted grid). Together the two grids
//! give 50% overlap. Both grids are trimmed to the same frame count so the
//! output array can hold them side by side.

use serde::{Deserialize, Serialize};

use crate::frame::Alignment;
use crate::{Error, Result};

/// What to do when a clip is too short to hold a single frame pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// Fail with [`Error::InvalidConfiguration`] before anything is written.
    #[default]
    Reject,
    /// Accept a zero-frame grid; every clip then yields an empty slab.
    AllowEmpty,
}

/// Frame counts derived once per run from corpus metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameGrid {
    /// Samples per frame (`na`).
    pub frame_size: usize,
    /// `N1`: frames on the grid starting at sample 0.
    pub aligned_frame_count: usize,
    /// `N2`: frames on the grid starting at `frame_size / 2`.
    pub shifted_frame_count: usize,
    /// Frames kept per alignment, `min(N1, N2)`.
    pub frame_count: usize,
}

impl FrameGrid {
    /// Compute the grid for clips of `samples_per_clip` samples.
    ///
    /// * `N1 = floor(samples_per_clip / frame_size)`
    /// * `N2 = floor(N1 - 0.5)`, i.e. `N1 - 1` saturating at zero. The
    ///   quotient is taken as an integer first, so a corpus of 660000-sample
    ///   clips with 1024-sample frames gives `N1 = 644`, `N2 = 643`.
    /// * `frame_count = min(N1, N2)`
    ///
    /// # Errors
    /// [`Error::InvalidConfiguration`] when `frame_size` is zero, the clip is
    /// shorter than one frame, or the frame count is zero under
    /// [`BoundaryPolicy::Reject`].
    ///
    /// # Example
    /// ```
    /// use cqtstore::grid::{BoundaryPolicy, FrameGrid};
    ///
    /// let grid = FrameGrid::new(660_000, 1024, BoundaryPolicy::Reject).unwrap();
    /// assert_eq!(grid.aligned_frame_count, 644);
    /// assert_eq!(grid.shifted_frame_count, 643);
    /// assert_eq!(grid.frame_count, 643);
    /// ```
    pub fn new(samples_per_clip: usize, frame_size: usize, policy: BoundaryPolicy) -> Result<Self> {
        if frame_size == 0 {
            return Err(Error::config("frame_size must be greater than zero"));
        }
        if samples_per_clip < frame_size {
            return Err(Error::config(format!(
                "clips of {samples_per_clip} samples are shorter than one frame of {frame_size}"
            )));
        }

        let aligned_frame_count = samples_per_clip / frame_size;
        let shifted_frame_count = aligned_frame_count.saturating_sub(1);
        let frame_count = aligned_frame_count.min(shifted_frame_count);

        if frame_count == 0 && policy == BoundaryPolicy::Reject {
            return Err(Error::config(format!(
                "clips of {samples_per_clip} samples hold no complete frame pair of size {frame_size}"
            )));
        }

        Ok(Self {
            frame_size,
            aligned_frame_count,
            shifted_frame_count,
            frame_count,
        })
    }

    /// Samples a waveform must have for `frame_count` frames on `alignment`.
    pub fn required_samples(&self, alignment: Alignment) -> usize {
        alignment.offset(self.frame_size) + self.frame_count * self.frame_size
    }

    pub fn is_empty(&self) -> bool {
        self.frame_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_corpus_grid() {
        let grid = FrameGrid::new(660_000, 1024, BoundaryPolicy::Reject).unwrap();
        assert_eq!(grid.aligned_frame_count, 644);
        assert_eq!(grid.shifted_frame_count, 643);
        assert_eq!(grid.frame_count, 643);
    }

    #[test]
    fn test_exact_multiple() {
        let grid = FrameGrid::new(8 * 512, 512, BoundaryPolicy::Reject).unwrap();
        assert_eq!(grid.aligned_frame_count, 8);
        assert_eq!(grid.shifted_frame_count, 7);
        assert_eq!(grid.frame_count, 7);
    }

    #[test]
    fn test_zero_frame_size() {
        let result = FrameGrid::new(1000, 0, BoundaryPolicy::Reject);
        assert!(matches!(result, Err(Error::InvalidConfiguration { .. })));
    }

    #[test]
    fn test_clip_shorter_than_frame() {
        let result = FrameGrid::new(100, 1024, BoundaryPolicy::AllowEmpty);
        assert!(matches!(result, Err(Error::InvalidConfiguration { .. })));
    }

    #[test]
    fn test_single_frame_clip_rejected() {
        let result = FrameGrid::new(1024, 1024, BoundaryPolicy::Reject);
        assert!(matches!(result, Err(Error::InvalidConfiguration { .. })));
    }

    #[test]
    fn test_single_frame_clip_allowed_empty() {
        let grid = FrameGrid::new(1024, 1024, BoundaryPolicy::AllowEmpty).unwrap();
        assert_eq!(grid.aligned_frame_count, 1);
        assert_eq!(grid.shifted_frame_count, 0);
        assert_eq!(grid.frame_count, 0);
        assert!(grid.is_empty());
    }

    #[test]
    fn test_required_samples_fit() {
        let grid = FrameGrid::new(5000, 1000, BoundaryPolicy::Reject).unwrap();
        assert_eq!(grid.frame_count, 4);
        assert_eq!(grid.required_samples(Alignment::Aligned), 4000);
        assert_eq!(grid.required_samples(Alignment::Shifted), 4500);
    }
}
