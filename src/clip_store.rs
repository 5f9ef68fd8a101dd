//! The read-only input corpus.
//!
//! A clip store is a directory holding `corpus.json` ([`CorpusMetadata`])
//! and one `<genre>.npy` per genre. Each genre array has shape
//! `(samples_per_clip, clips_per_genre)` and dtype `<f4`, so a clip is a
//! column. Arrays written by [`ClipStoreWriter`] use Fortran order, which
//! makes each clip contiguous on disk; C-ordered arrays are also accepted and
//! read in bounded row chunks.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::ArrayView2;
use ndarray_npy::write_npy;
use serde::{Deserialize, Serialize};

use crate::npy::NpyFile;
use crate::{Error, Result};

/// File name of the corpus metadata inside a clip store.
pub const METADATA_FILE: &str = "corpus.json";

/// Bytes read per chunk when a clip column is strided on disk.
const CHUNK_BYTES: usize = 1 << 22;

/// Shape and naming of the input corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusMetadata {
    pub genre_count: usize,
    pub clips_per_genre: usize,
    pub sample_rate: u32,
    pub samples_per_clip: usize,
    /// Genre names; the index is the genre id.
    pub genre_names: Vec<String>,
}

impl CorpusMetadata {
    /// Build metadata for `genre_names`, deriving `genre_count`.
    pub fn new(
        genre_names: Vec<String>,
        clips_per_genre: usize,
        sample_rate: u32,
        samples_per_clip: usize,
    ) -> Result<Self> {
        let metadata = Self {
            genre_count: genre_names.len(),
            clips_per_genre,
            sample_rate,
            samples_per_clip,
            genre_names,
        };
        metadata.validate()?;
        Ok(metadata)
    }

    /// Check counts are positive and names line up with `genre_count`.
    pub fn validate(&self) -> Result<()> {
        if self.genre_count == 0 || self.clips_per_genre == 0 {
            return Err(Error::config("corpus must contain at least one genre and one clip"));
        }
        if self.sample_rate == 0 || self.samples_per_clip == 0 {
            return Err(Error::config("sample_rate and samples_per_clip must be positive"));
        }
        if self.genre_names.len() != self.genre_count {
            return Err(Error::config(format!(
                "genre_count is {} but {} genre names are listed",
                self.genre_count,
                self.genre_names.len()
            )));
        }
        let mut seen = HashSet::new();
        for name in &self.genre_names {
            if name.is_empty() || name.contains(['/', '\\']) {
                return Err(Error::config(format!("invalid genre name {name:?}")));
            }
            if !seen.insert(name.as_str()) {
                return Err(Error::config(format!("duplicate genre name {name:?}")));
            }
        }
        Ok(())
    }

    /// Total number of (genre, clip) pairs.
    pub fn clip_count(&self) -> usize {
        self.genre_count * self.clips_per_genre
    }

    /// Genre-major `(genre, clip)` coordinates of flat clip index `index`.
    pub fn coordinates(&self, index: usize) -> (usize, usize) {
        (index / self.clips_per_genre, index % self.clips_per_genre)
    }

    fn genre_path(&self, root: &Path, genre: usize) -> PathBuf {
        root.join(format!("{}.npy", self.genre_names[genre]))
    }
}

/// Read handle on a clip store.
///
/// Holds one open file per genre; reading a clip loads only that clip.
#[derive(Debug)]
pub struct ClipStore {
    root: PathBuf,
    metadata: CorpusMetadata,
    genres: Vec<NpyFile>,
}

impl ClipStore {
    /// Open the clip store at `root` and check every genre array against the
    /// metadata.
    ///
    /// # Errors
    /// [`Error::InvalidConfiguration`] for inconsistent metadata and
    /// [`Error::Format`] for arrays of the wrong dtype or shape.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let text = fs::read_to_string(root.join(METADATA_FILE))?;
        let metadata: CorpusMetadata = serde_json::from_str(&text)?;
        metadata.validate()?;

        let expected = [metadata.samples_per_clip, metadata.clips_per_genre];
        let genres = (0..metadata.genre_count)
            .map(|g| {
                let path = metadata.genre_path(&root, g);
                let file = NpyFile::open(&path)?;
                if file.shape() != expected.as_slice() {
                    return Err(Error::format(
                        &path,
                        format!("expected shape {expected:?}, found {:?}", file.shape()),
                    ));
                }
                Ok(file)
            })
            .collect::<Result<Vec<_>>>()?;

        log::debug!(
            "opened clip store {} ({} genres x {} clips)",
            root.display(),
            metadata.genre_count,
            metadata.clips_per_genre
        );

        Ok(Self {
            root,
            metadata,
            genres,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn metadata(&self) -> &CorpusMetadata {
        &self.metadata
    }

    /// Load the waveform of one clip.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if `genre` or `clip` is out of range.
    pub fn read_clip(&self, genre: usize, clip: usize) -> Result<Vec<f32>> {
        let meta = &self.metadata;
        if genre >= meta.genre_count || clip >= meta.clips_per_genre {
            return Err(Error::shape(
                format!("clip within ({}, {})", meta.genre_count, meta.clips_per_genre),
                format!("({genre}, {clip})"),
            ));
        }

        let file = &self.genres[genre];
        let samples = meta.samples_per_clip;
        let clips = meta.clips_per_genre;
        let mut waveform = vec![0.0f32; samples];

        if file.header().fortran_order || clips == 1 {
            file.read_at(clip * samples, &mut waveform)?;
        } else {
            let rows_per_chunk = (CHUNK_BYTES / (4 * clips)).max(1);
            let mut chunk = vec![0.0f32; rows_per_chunk * clips];
            let mut row = 0;
            while row < samples {
                let rows = rows_per_chunk.min(samples - row);
                let buf = &mut chunk[..rows * clips];
                file.read_at(row * clips, buf)?;
                for (dst, src) in waveform[row..row + rows]
                    .iter_mut()
                    .zip(buf.chunks_exact(clips))
                {
                    *dst = src[clip];
                }
                row += rows;
            }
        }

        Ok(waveform)
    }
}

/// Builds a clip store one genre at a time.
#[derive(Debug)]
pub struct ClipStoreWriter {
    root: PathBuf,
    metadata: CorpusMetadata,
    written: Vec<bool>,
}

impl ClipStoreWriter {
    /// Start a new clip store at `root`. The directory must not hold a store
    /// already.
    pub fn create(root: impl AsRef<Path>, metadata: CorpusMetadata) -> Result<Self> {
        metadata.validate()?;
        let root = root.as_ref().to_path_buf();
        if root.join(METADATA_FILE).exists() {
            return Err(Error::config(format!(
                "{} already holds a clip store",
                root.display()
            )));
        }
        fs::create_dir_all(&root)?;
        let written = vec![false; metadata.genre_count];
        Ok(Self {
            root,
            metadata,
            written,
        })
    }

    /// Write all clips of `genre`. `clips` has one row per clip, shape
    /// `(clips_per_genre, samples_per_clip)`; it is stored transposed so each
    /// clip stays contiguous.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if `genre` is out of range or `clips` has the
    /// wrong shape.
    pub fn write_genre(&mut self, genre: usize, clips: ArrayView2<'_, f32>) -> Result<()> {
        if genre >= self.metadata.genre_count {
            return Err(Error::shape(
                format!("genre < {}", self.metadata.genre_count),
                genre.to_string(),
            ));
        }
        let expected = (self.metadata.clips_per_genre, self.metadata.samples_per_clip);
        if clips.dim() != expected {
            return Err(Error::shape(
                format!("{expected:?}"),
                format!("{:?}", clips.dim()),
            ));
        }

        let clips = clips.as_standard_layout();
        write_npy(self.metadata.genre_path(&self.root, genre), &clips.t())?;
        self.written[genre] = true;
        Ok(())
    }

    /// Write the metadata file, completing the store.
    ///
    /// # Errors
    /// [`Error::InvalidConfiguration`] if a genre was never written.
    pub fn finish(self) -> Result<ClipStore> {
        if let Some(missing) = self.written.iter().position(|w| !w) {
            return Err(Error::config(format!(
                "genre {:?} has no clips",
                self.metadata.genre_names[missing]
            )));
        }
        fs::write(
            self.root.join(METADATA_FILE),
            serde_json::to_string_pretty(&self.metadata)?,
        )?;
        ClipStore::open(&self.root)
    }
}
