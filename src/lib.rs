//! Genre-grouped audio clips to framed waveforms and constant-Q features.
//!
//! cqtstore reads a corpus of fixed-length clips grouped by genre, cuts each
//! clip into two interleaved grids of fixed-size frames (one aligned to the
//! clip start, one shifted by half a frame), computes a constant-Q magnitude
//! spectrum per frame, and streams both representations into fixed-shape
//! on-disk arrays. Only one clip is held in memory per worker.
//!
//! # Quick Start
//!
//! ```no_run
//! use cqtstore::config::PipelineConfig;
//! use cqtstore::pipeline::extract_features;
//!
//! let config = PipelineConfig::new().with_expected_sample_rate(22050);
//! let summary = extract_features("corpus", "features", &config).unwrap();
//! println!("{} frames per clip", summary.grid.frame_count);
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`grid`] | Aligned/shifted frame counts for a clip length |
//! | [`frame`] | Frame views, extraction and verification |
//! | [`spectrum`] | Per-frame CQT features on the frame grid |
//! | [`cqt`] | Constant-Q transform |
//! | [`fft`] | Real FFT planning |
//! | [`convert`] | Note names, MIDI and frequency conversions |
//! | [`clip_store`] | Read and write the input corpus |
//! | [`feature_store`] | Allocate, fill and read the output arrays |
//! | [`npy`] | Positional access to `.npy` files |
//! | [`pipeline`] | The extraction driver |
//! | [`config`] | Run configuration, loadable from TOML |
//! | [`ingest`] | Build a clip store from audio files |
//! | [`io`] | Audio decoding, WAV writing, test signals |
//! | [`files`] | Audio file discovery |
//!
//! # Output layout
//!
//! A feature store directory holds `raw_frames.npy` with shape
//! `(genres, clips, frames, 2, frame_size)` and `spectral_features.npy` with
//! shape `(genres, clips, frames, 2, n_bins)`, both little-endian `f32` in C
//! order, plus `attributes.json`. Index 0 of axis 3 is the aligned grid and
//! index 1 the shifted grid.
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T>`], which is an alias for
//! `std::result::Result<T, Error>`.
//!
//! # Feature Flags
//!
//! | Flag | Description |
//! |------|-------------|
//! | `parallel` (default) | Process clips on a rayon pool when `PipelineConfig::parallel` is set |

#![deny(unsafe_code)]

pub mod error;
pub use error::{Error, Result};

pub mod clip_store;
pub mod config;
pub mod convert;
pub mod cqt;
pub mod feature_store;
pub mod fft;
pub mod files;
pub mod frame;
pub mod grid;
pub mod ingest;
pub mod io;
pub mod npy;
pub mod pipeline;
pub mod spectrum;
