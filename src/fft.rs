use std::sync::Arc;

use num_complex::Complex32;
use realfft::{RealFftPlanner, RealToComplex};

use crate::{Error, Result};

/// Forward real-to-complex FFT plan with reusable buffers.
///
/// Planning is done once per size; each [`RealFftPlan::forward`] call then
/// works on caller-owned buffers so a transform loop allocates nothing per
/// frame.
///
/// # Example
/// ```
/// use cqtstore::fft::RealFftPlan;
///
/// let plan = RealFftPlan::new(512);
/// let mut input = vec![1.0f32; 512];
/// let mut output = plan.make_output_vec();
/// let mut scratch = plan.make_scratch_vec();
/// plan.forward(&mut input, &mut output, &mut scratch).unwrap();
/// assert_eq!(output.len(), 257);
/// assert!((output[0].re - 512.0).abs() < 1e-3);
/// ```
pub struct RealFftPlan {
    r2c: Arc<dyn RealToComplex<f32>>,
}

impl RealFftPlan {
    /// Create a plan for transforms of `len` real samples.
    pub fn new(len: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let r2c = planner.plan_fft_forward(len);
        Self { r2c }
    }

    /// Output buffer of `len / 2 + 1` bins.
    pub fn make_output_vec(&self) -> Vec<Complex32> {
        self.r2c.make_output_vec()
    }

    pub fn make_scratch_vec(&self) -> Vec<Complex32> {
        self.r2c.make_scratch_vec()
    }

    /// Transform `input` into `output`. `input` is used as workspace and is
    /// left in an unspecified state.
    ///
    /// # Errors
    /// [`Error::TransformFailure`] if a buffer has the wrong length.
    pub fn forward(
        &self,
        input: &mut [f32],
        output: &mut [Complex32],
        scratch: &mut [Complex32],
    ) -> Result<()> {
        self.r2c
            .process_with_scratch(input, output, scratch)
            .map_err(|e| Error::TransformFailure {
                reason: e.to_string(),
            })
    }
}

#[cfg(feature = "parallel")]
const _: () = {
    fn _assert_send_sync<T: Send + Sync>() {}
    fn _check() {
        _assert_send_sync::<RealFftPlan>();
    }
};
