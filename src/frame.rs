//! Slicing waveforms into fixed-length frames.
//!
//! Frames are always laid out row-major: row `i` of the result is the
//! contiguous run of `frame_size` samples starting at
//! `offset + i * frame_size`. Nothing here depends on ndarray's default
//! memory order; shapes are built with an explicit C layout.

use std::fmt;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Which of the two overlapping frame grids a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    /// Frames start at sample 0.
    Aligned,
    /// Frames start half a frame in.
    Shifted,
}

impl Alignment {
    /// Both alignments in store order.
    pub const ALL: [Alignment; 2] = [Alignment::Aligned, Alignment::Shifted];

    /// Sample offset of the first frame for frames of `frame_size`.
    pub fn offset(self, frame_size: usize) -> usize {
        match self {
            Alignment::Aligned => 0,
            Alignment::Shifted => frame_size / 2,
        }
    }

    /// Position along the alignment axis of the feature store.
    pub fn index(self) -> usize {
        match self {
            Alignment::Aligned => 0,
            Alignment::Shifted => 1,
        }
    }
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alignment::Aligned => f.write_str("aligned"),
            Alignment::Shifted => f.write_str("shifted"),
        }
    }
}

/// Borrow `frame_count` frames of `frame_size` samples from `waveform`.
///
/// The view aliases the waveform: row `i` is
/// `waveform[offset + i * frame_size .. offset + (i + 1) * frame_size]`.
/// Trailing samples that do not fill a frame are ignored.
///
/// # Errors
/// [`Error::InvalidConfiguration`] if `frame_size` is zero and
/// [`Error::InsufficientSamples`] if the frames would run past the end of
/// the waveform.
///
/// # Example
/// ```
/// use cqtstore::frame::{frame_view, Alignment};
///
/// let signal: Vec<f32> = (0..10).map(|i| i as f32).collect();
/// let frames = frame_view(&signal, 4, 2, Alignment::Shifted).unwrap();
/// assert_eq!(frames.row(0).to_vec(), vec![2.0, 3.0, 4.0, 5.0]);
/// assert_eq!(frames.row(1).to_vec(), vec![6.0, 7.0, 8.0, 9.0]);
/// ```
pub fn frame_view(
    waveform: &[f32],
    frame_size: usize,
    frame_count: usize,
    alignment: Alignment,
) -> Result<ArrayView2<'_, f32>> {
    if frame_size == 0 {
        return Err(Error::config("frame_size must be greater than zero"));
    }
    let start = alignment.offset(frame_size);
    let required = start + frame_count * frame_size;
    if waveform.len() < required {
        return Err(Error::InsufficientSamples {
            required,
            available: waveform.len(),
        });
    }

    ArrayView2::from_shape((frame_count, frame_size), &waveform[start..required])
        .map_err(|e| Error::shape(format!("({frame_count}, {frame_size})"), e.to_string()))
}

/// Copy `frame_count` frames of `frame_size` samples out of `waveform`.
///
/// The result has shape `(frame_count, frame_size)` in standard layout and is
/// bit-identical to slicing the source at the frame offsets: no padding,
/// windowing or interpolation is applied.
///
/// # Errors
/// See [`frame_view`].
pub fn extract_frames(
    waveform: &[f32],
    frame_size: usize,
    frame_count: usize,
    alignment: Alignment,
) -> Result<Array2<f32>> {
    Ok(frame_view(waveform, frame_size, frame_count, alignment)?.to_owned())
}

/// Check one row of `frames` against a fresh slice of `waveform`.
///
/// Comparison is on bit patterns, so a transposed or reordered frame
/// matrix is caught even when its values look plausible.
///
/// # Errors
/// [`Error::ShapeMismatch`] if `frame_index` is out of range and
/// [`Error::FrameMismatch`] if the row differs from the source.
pub fn verify_frame(
    waveform: &[f32],
    frames: &ArrayView2<'_, f32>,
    frame_index: usize,
    alignment: Alignment,
) -> Result<()> {
    let (frame_count, frame_size) = frames.dim();
    if frame_index >= frame_count {
        return Err(Error::shape(
            format!("frame index < {frame_count}"),
            frame_index.to_string(),
        ));
    }

    let start = alignment.offset(frame_size) + frame_index * frame_size;
    let expected = waveform
        .get(start..start + frame_size)
        .ok_or(Error::InsufficientSamples {
            required: start + frame_size,
            available: waveform.len(),
        })?;

    let matches = frames
        .row(frame_index)
        .iter()
        .zip(expected)
        .all(|(a, b)| a.to_bits() == b.to_bits());

    if matches {
        Ok(())
    } else {
        Err(Error::FrameMismatch {
            frame_index,
            alignment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Vec<f32> {
        (0..n).map(|i| i as f32).collect()
    }

    #[test]
    fn test_aligned_rows_are_contiguous_slices() {
        let y = ramp(20);
        let frames = extract_frames(&y, 4, 4, Alignment::Aligned).unwrap();
        assert_eq!(frames.dim(), (4, 4));
        assert_eq!(frames.row(0).to_vec(), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(frames.row(3).to_vec(), vec![12.0, 13.0, 14.0, 15.0]);
        assert!(frames.is_standard_layout());
    }

    #[test]
    fn test_shifted_rows_start_half_a_frame_in() {
        let y = ramp(20);
        let frames = extract_frames(&y, 4, 3, Alignment::Shifted).unwrap();
        assert_eq!(frames.row(0).to_vec(), vec![2.0, 3.0, 4.0, 5.0]);
        assert_eq!(frames.row(2).to_vec(), vec![10.0, 11.0, 12.0, 13.0]);
    }

    #[test]
    fn test_odd_frame_size_offset_rounds_down() {
        assert_eq!(Alignment::Shifted.offset(5), 2);
        let y = ramp(20);
        let frames = extract_frames(&y, 5, 2, Alignment::Shifted).unwrap();
        assert_eq!(frames.row(0).to_vec(), vec![2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_insufficient_samples() {
        let y = ramp(15);
        let result = extract_frames(&y, 4, 4, Alignment::Shifted);
        assert!(matches!(
            result,
            Err(Error::InsufficientSamples {
                required: 18,
                available: 15
            })
        ));
    }

    #[test]
    fn test_zero_frames() {
        let y = ramp(8);
        let frames = extract_frames(&y, 4, 0, Alignment::Shifted).unwrap();
        assert_eq!(frames.dim(), (0, 4));
    }

    #[test]
    fn test_verify_detects_transposed_frames() {
        let y = ramp(16);
        let frames = extract_frames(&y, 4, 4, Alignment::Aligned).unwrap();
        assert!(verify_frame(&y, &frames.view(), 1, Alignment::Aligned).is_ok());

        let transposed = frames.t().to_owned();
        let result = verify_frame(&y, &transposed.view(), 1, Alignment::Aligned);
        assert!(matches!(
            result,
            Err(Error::FrameMismatch {
                frame_index: 1,
                alignment: Alignment::Aligned
            })
        ));
    }

    #[test]
    fn test_verify_out_of_range_index() {
        let y = ramp(16);
        let frames = extract_frames(&y, 4, 2, Alignment::Aligned).unwrap();
        let result = verify_frame(&y, &frames.view(), 2, Alignment::Aligned);
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }
}
