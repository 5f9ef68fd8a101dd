use cqtstore::frame::{Alignment, extract_frames, frame_view, verify_frame};
use cqtstore::grid::{BoundaryPolicy, FrameGrid};
use proptest::prelude::*;

fn ramp(len: usize) -> Vec<f32> {
    (0..len).map(|i| i as f32 * 0.5 - 3.0).collect()
}

proptest! {
    #[test]
    fn frame_count_is_min_of_both_grids(frame_size in 1usize..4096, extra in 0usize..100_000) {
        let samples = frame_size + extra;
        let grid = FrameGrid::new(samples, frame_size, BoundaryPolicy::AllowEmpty).unwrap();

        prop_assert_eq!(grid.aligned_frame_count, samples / frame_size);
        prop_assert_eq!(grid.shifted_frame_count, samples / frame_size - 1);
        prop_assert_eq!(
            grid.frame_count,
            grid.aligned_frame_count.min(grid.shifted_frame_count)
        );
        prop_assert!(grid.frame_count <= grid.aligned_frame_count);
        prop_assert!(grid.frame_count <= grid.shifted_frame_count);
    }

    #[test]
    fn every_frame_lies_inside_the_clip(frame_size in 2usize..2048, extra in 0usize..20_000) {
        let samples = frame_size + extra;
        let grid = FrameGrid::new(samples, frame_size, BoundaryPolicy::AllowEmpty).unwrap();
        for alignment in Alignment::ALL {
            prop_assert!(grid.required_samples(alignment) <= samples);
        }
    }

    #[test]
    fn rows_equal_direct_slices(frame_size in 1usize..512, frames in 0usize..40, tail in 0usize..600) {
        let y = ramp(frame_size / 2 + frames * frame_size + tail);
        for alignment in Alignment::ALL {
            let out = extract_frames(&y, frame_size, frames, alignment).unwrap();
            prop_assert_eq!(out.dim(), (frames, frame_size));
            let offset = alignment.offset(frame_size);
            for (i, row) in out.rows().into_iter().enumerate() {
                let start = offset + i * frame_size;
                prop_assert_eq!(row.to_vec(), y[start..start + frame_size].to_vec());
                prop_assert!(verify_frame(&y, &out.view(), i, alignment).is_ok());
            }
        }
    }

    #[test]
    fn view_and_copy_agree(frame_size in 1usize..256, frames in 1usize..20) {
        let y = ramp(frame_size / 2 + frames * frame_size);
        for alignment in Alignment::ALL {
            let view = frame_view(&y, frame_size, frames, alignment).unwrap();
            let owned = extract_frames(&y, frame_size, frames, alignment).unwrap();
            prop_assert_eq!(view, owned.view());
        }
    }
}
