//! The extraction driver.
//!
//! Per-clip work is the pure function [`process_clip`]: waveform in, four
//! arrays out. [`Pipeline`] owns iteration, reading clips from a
//! [`ClipStore`] and writing slabs to a [`FeatureStore`], with one clip
//! resident per worker. [`extract_features`] wraps the whole run: it
//! validates everything it can before creating output, allocates the store,
//! runs the pipeline and finalizes the store.

use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::clip_store::{ClipStore, CorpusMetadata};
use crate::config::PipelineConfig;
use crate::feature_store::{ClipPayload, FeatureStore, StoreAttributes, StoreLayout};
use crate::frame::{Alignment, extract_frames, verify_frame};
use crate::grid::FrameGrid;
use crate::spectrum::SpectralExtractor;
use crate::{Error, Result};

/// Where a [`Pipeline`] is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Processing { genre: usize, clip: usize },
    Done,
    Failed { genre: usize, clip: usize },
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => f.write_str("idle"),
            PipelineState::Processing { genre, clip } => {
                write!(f, "processing genre {genre} clip {clip}")
            }
            PipelineState::Done => f.write_str("done"),
            PipelineState::Failed { genre, clip } => {
                write!(f, "failed at genre {genre} clip {clip}")
            }
        }
    }
}

/// Everything derived from corpus metadata and configuration before any
/// output exists.
pub struct Plan {
    pub grid: FrameGrid,
    pub spectral: SpectralExtractor,
    pub layout: StoreLayout,
}

impl Plan {
    /// Validate `config` against `metadata` and plan the run.
    ///
    /// # Errors
    /// [`Error::InvalidConfiguration`] for a sample-rate mismatch, an
    /// unusable frame grid, or a bad spectral layout.
    pub fn new(metadata: &CorpusMetadata, config: &PipelineConfig) -> Result<Self> {
        metadata.validate()?;
        if let Some(expected) = config.expected_sample_rate {
            if expected != metadata.sample_rate {
                return Err(Error::config(format!(
                    "corpus sample rate is {} Hz, expected {expected} Hz; resample upstream",
                    metadata.sample_rate
                )));
            }
        }

        let grid = FrameGrid::new(
            metadata.samples_per_clip,
            config.frame_size,
            config.boundary_policy,
        )?;
        let spectral =
            SpectralExtractor::new(metadata.sample_rate, config.frame_size, &config.spectral)?;
        let layout = StoreLayout {
            genre_count: metadata.genre_count,
            clips_per_genre: metadata.clips_per_genre,
            frame_count: grid.frame_count,
            frame_size: grid.frame_size,
            n_bins: spectral.n_bins(),
        };

        Ok(Self {
            grid,
            spectral,
            layout,
        })
    }
}

/// Seed for the frame check of clip `(genre, clip)`.
fn clip_seed(seed: u64, genre: usize, clip: usize) -> u64 {
    seed ^ (((genre as u64) << 32) | clip as u64)
}

/// Turn one waveform into its frame and feature arrays.
///
/// With `verify_seed` set, one frame per alignment, chosen by a generator
/// seeded from it, is compared against a direct slice of `waveform`.
///
/// # Errors
/// [`Error::InsufficientSamples`] for a short waveform,
/// [`Error::FrameMismatch`] if the frame check fails,
/// [`Error::TransformFailure`] from the spectral transform and
/// [`Error::ShapeMismatch`] if the transform returns the wrong row count.
pub fn process_clip(
    waveform: &[f32],
    grid: &FrameGrid,
    spectral: &SpectralExtractor,
    verify_seed: Option<u64>,
) -> Result<ClipPayload> {
    let mut rng = verify_seed.map(StdRng::seed_from_u64);
    let (aligned_frames, aligned_spectrum) =
        alignment_arrays(waveform, grid, spectral, Alignment::Aligned, rng.as_mut())?;
    let (shifted_frames, shifted_spectrum) =
        alignment_arrays(waveform, grid, spectral, Alignment::Shifted, rng.as_mut())?;
    Ok(ClipPayload {
        aligned_frames,
        shifted_frames,
        aligned_spectrum,
        shifted_spectrum,
    })
}

fn alignment_arrays(
    waveform: &[f32],
    grid: &FrameGrid,
    spectral: &SpectralExtractor,
    alignment: Alignment,
    rng: Option<&mut StdRng>,
) -> Result<(Array2<f32>, Array2<f32>)> {
    let frames = extract_frames(waveform, grid.frame_size, grid.frame_count, alignment)?;
    if let Some(rng) = rng
        && grid.frame_count > 0
    {
        let index = rng.gen_range(0..grid.frame_count);
        verify_frame(waveform, &frames.view(), index, alignment)?;
    }

    let spectrum = spectral.extract(waveform, alignment, grid.frame_count)?;
    if spectrum.nrows() != grid.frame_count {
        return Err(Error::shape(
            format!("{} {alignment} spectral rows", grid.frame_count),
            spectrum.nrows().to_string(),
        ));
    }
    Ok((frames, spectrum))
}

/// Drives extraction over every clip of a corpus.
pub struct Pipeline<'a> {
    clips: &'a ClipStore,
    store: &'a FeatureStore,
    plan: Plan,
    verify_seed: Option<u64>,
    parallel: bool,
    state: PipelineState,
}

impl<'a> Pipeline<'a> {
    /// Bind a plan to its input and output stores.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if `store` was allocated for another layout.
    pub fn new(
        clips: &'a ClipStore,
        store: &'a FeatureStore,
        plan: Plan,
        config: &PipelineConfig,
    ) -> Result<Self> {
        if store.layout() != &plan.layout {
            return Err(Error::shape(
                format!("{:?}", plan.layout),
                format!("{:?}", store.layout()),
            ));
        }
        Ok(Self {
            clips,
            store,
            plan,
            verify_seed: config.verify_frames.then_some(config.verify_seed),
            parallel: config.parallel,
            state: PipelineState::Idle,
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Process every clip, stopping at the first failure.
    ///
    /// Returns the number of clips written.
    ///
    /// # Errors
    /// The first error raised by any clip; the state is then
    /// [`PipelineState::Failed`]. Running a pipeline twice is an
    /// [`Error::InvalidConfiguration`].
    pub fn run(&mut self) -> Result<usize> {
        if self.state != PipelineState::Idle {
            return Err(Error::config(format!("pipeline cannot start: {}", self.state)));
        }
        let meta = self.clips.metadata();
        log::info!(
            "extracting {} clips: {} frames of {} samples per alignment, {} spectral bins",
            meta.clip_count(),
            self.plan.grid.frame_count,
            self.plan.grid.frame_size,
            self.plan.layout.n_bins
        );

        if self.parallel {
            #[cfg(feature = "parallel")]
            {
                return self.run_parallel();
            }
            #[cfg(not(feature = "parallel"))]
            log::warn!("built without the `parallel` feature; processing sequentially");
        }
        self.run_sequential()
    }

    fn run_sequential(&mut self) -> Result<usize> {
        let mut processed = 0;
        self.state = PipelineState::Processing { genre: 0, clip: 0 };

        while let PipelineState::Processing { genre, clip } = self.state {
            match self.process_one(genre, clip) {
                Ok(()) => {
                    processed += 1;
                    self.state = self.next_state(genre, clip);
                }
                Err(e) => {
                    log::error!("genre {genre} clip {clip}: {e}");
                    self.state = PipelineState::Failed { genre, clip };
                    return Err(e);
                }
            }
        }

        Ok(processed)
    }

    #[cfg(feature = "parallel")]
    fn run_parallel(&mut self) -> Result<usize> {
        use rayon::prelude::*;

        let meta = self.clips.metadata();
        self.state = PipelineState::Processing { genre: 0, clip: 0 };
        let this = &*self;
        let result = (0..meta.clip_count()).into_par_iter().try_for_each(|index| {
            let (genre, clip) = meta.coordinates(index);
            this.process_one(genre, clip).map_err(|e| (genre, clip, e))
        });

        match result {
            Ok(()) => {
                self.state = PipelineState::Done;
                Ok(meta.clip_count())
            }
            Err((genre, clip, e)) => {
                log::error!("genre {genre} clip {clip}: {e}");
                self.state = PipelineState::Failed { genre, clip };
                Err(e)
            }
        }
    }

    fn next_state(&self, genre: usize, clip: usize) -> PipelineState {
        let meta = self.clips.metadata();
        if clip + 1 < meta.clips_per_genre {
            PipelineState::Processing {
                genre,
                clip: clip + 1,
            }
        } else if genre + 1 < meta.genre_count {
            PipelineState::Processing {
                genre: genre + 1,
                clip: 0,
            }
        } else {
            PipelineState::Done
        }
    }

    fn process_one(&self, genre: usize, clip: usize) -> Result<()> {
        let waveform = self.clips.read_clip(genre, clip)?;
        let seed = self.verify_seed.map(|s| clip_seed(s, genre, clip));
        let payload = process_clip(&waveform, &self.plan.grid, &self.plan.spectral, seed)?;
        self.store.write_slab(genre, clip, &payload)?;
        log::debug!("wrote slab genre {genre} clip {clip}");
        Ok(())
    }
}

/// Outcome of [`extract_features`].
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub grid: FrameGrid,
    pub clips_processed: usize,
    pub attributes: StoreAttributes,
    pub elapsed: Duration,
}

/// Build a feature store at `output` from the clip store at `input`.
///
/// Configuration is validated before `output` is touched. On failure the
/// partially written store is left in place with `complete == false`; use
/// [`FeatureStore::remove`] to clear it before retrying.
///
/// # Errors
/// [`Error::InvalidConfiguration`] if validation fails or `output` already
/// holds a store; otherwise the first error raised while processing.
pub fn extract_features(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<RunSummary> {
    let started = Instant::now();
    let clips = ClipStore::open(input)?;
    let meta = clips.metadata();
    let plan = Plan::new(meta, config)?;
    let grid = plan.grid;

    let (fmin, fmax) = plan.spectral.frequency_range();
    let store = FeatureStore::allocate(
        output,
        plan.layout,
        meta.sample_rate,
        meta.genre_names.clone(),
        (fmin, fmax),
        config.spectral.bins_per_octave,
    )?;

    let clips_processed = Pipeline::new(&clips, &store, plan, config)?.run()?;
    let attributes = store.finish()?;

    let elapsed = started.elapsed();
    log::info!(
        "extracted {clips_processed} clips in {:.1}s",
        elapsed.as_secs_f64()
    );
    Ok(RunSummary {
        grid,
        clips_processed,
        attributes,
        elapsed,
    })
}
