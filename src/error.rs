use std::path::PathBuf;

use crate::frame::Alignment;

/// Crate-level error type for the cqtstore pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad frame size, sample-rate mismatch or frequency range. Detected
    /// before any output is created.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    /// A waveform is shorter than the frame grid requires.
    #[error("insufficient samples: need {required}, got {available}")]
    InsufficientSamples { required: usize, available: usize },

    /// A payload disagrees with the shape declared for it.
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: String, got: String },

    /// An extracted frame differs from a direct slice of its source.
    #[error("frame {frame_index} ({alignment}) does not match its source samples")]
    FrameMismatch {
        frame_index: usize,
        alignment: Alignment,
    },

    /// The spectral transform rejected its input.
    #[error("spectral transform failed: {reason}")]
    TransformFailure { reason: String },

    /// A store file exists but is not what we expect.
    #[error("malformed store file {}: {reason}", path.display())]
    Format { path: PathBuf, reason: String },

    /// Audio decoding errors.
    #[error(transparent)]
    Audio(#[from] crate::io::AudioError),

    /// File I/O errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    ReadNpy(#[from] ndarray_npy::ReadNpyError),

    #[error(transparent)]
    WriteNpy(#[from] ndarray_npy::WriteNpyError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Error::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    pub(crate) fn shape(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Error::ShapeMismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience Result type for cqtstore operations.
pub type Result<T> = std::result::Result<T, Error>;
