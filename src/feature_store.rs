//! The write-once output store.
//!
//! A feature store is a directory with two 5-axis `f32` arrays and a JSON
//! attribute file:
//!
//! | File | Shape |
//! |------|-------|
//! | `raw_frames.npy` | `(genres, clips, frames, 2, frame_size)` |
//! | `spectral_features.npy` | `(genres, clips, frames, 2, n_bins)` |
//! | `attributes.json` | [`StoreAttributes`] |
//!
//! Axis 3 is the alignment: index 0 holds aligned frames, index 1 the
//! half-frame shifted ones. Both arrays are allocated zero-filled at their
//! final shape, then filled one (genre, clip) slab at a time. In C order a
//! slab is one contiguous block, so each array receives a single positional
//! write per clip.

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{Array2, Array3, ArrayView2, Axis, Dim, stack};
use ndarray_npy::write_zeroed_npy;
use serde::{Deserialize, Serialize};

use crate::frame::Alignment;
use crate::npy::NpyFile;
use crate::{Error, Result};

pub const RAW_FRAMES_FILE: &str = "raw_frames.npy";
pub const SPECTRAL_FEATURES_FILE: &str = "spectral_features.npy";
pub const ATTRIBUTES_FILE: &str = "attributes.json";

/// Final shape of a feature store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreLayout {
    pub genre_count: usize,
    pub clips_per_genre: usize,
    pub frame_count: usize,
    pub frame_size: usize,
    pub n_bins: usize,
}

impl StoreLayout {
    pub fn raw_shape(&self) -> [usize; 5] {
        [self.genre_count, self.clips_per_genre, self.frame_count, 2, self.frame_size]
    }

    pub fn spectral_shape(&self) -> [usize; 5] {
        [self.genre_count, self.clips_per_genre, self.frame_count, 2, self.n_bins]
    }

    fn slab_index(&self, genre: usize, clip: usize) -> Result<usize> {
        if genre >= self.genre_count || clip >= self.clips_per_genre {
            return Err(Error::shape(
                format!("slab within ({}, {})", self.genre_count, self.clips_per_genre),
                format!("({genre}, {clip})"),
            ));
        }
        Ok(genre * self.clips_per_genre + clip)
    }
}

/// Scalar attributes stored next to the arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreAttributes {
    pub sample_rate: u32,
    pub genre_names: Vec<String>,
    pub layout: StoreLayout,
    pub fmin: f32,
    pub fmax: f32,
    pub bins_per_octave: usize,
    /// Set once every slab has been written and flushed. A store with
    /// `complete == false` is the remains of an aborted run.
    pub complete: bool,
}

/// The four arrays produced for one clip.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipPayload {
    /// `(frame_count, frame_size)`
    pub aligned_frames: Array2<f32>,
    /// `(frame_count, frame_size)`
    pub shifted_frames: Array2<f32>,
    /// `(frame_count, n_bins)`
    pub aligned_spectrum: Array2<f32>,
    /// `(frame_count, n_bins)`
    pub shifted_spectrum: Array2<f32>,
}

impl ClipPayload {
    pub fn frames(&self, alignment: Alignment) -> &Array2<f32> {
        match alignment {
            Alignment::Aligned => &self.aligned_frames,
            Alignment::Shifted => &self.shifted_frames,
        }
    }

    pub fn spectrum(&self, alignment: Alignment) -> &Array2<f32> {
        match alignment {
            Alignment::Aligned => &self.aligned_spectrum,
            Alignment::Shifted => &self.shifted_spectrum,
        }
    }
}

/// Handle on a feature store.
///
/// [`FeatureStore::allocate`] opens a new store for writing;
/// [`FeatureStore::open`] opens a finished one for reading.
#[derive(Debug)]
pub struct FeatureStore {
    root: PathBuf,
    attributes: StoreAttributes,
    raw: NpyFile,
    spectral: NpyFile,
}

impl FeatureStore {
    /// Create the store directory and both arrays at their final shape.
    ///
    /// The arrays start zero-filled. Attributes are written immediately with
    /// `complete` unset; [`FeatureStore::finish`] sets it.
    ///
    /// # Errors
    /// [`Error::InvalidConfiguration`] if `root` already holds a store, or if
    /// `attributes` disagree with `layout`.
    pub fn allocate(
        root: impl AsRef<Path>,
        layout: StoreLayout,
        sample_rate: u32,
        genre_names: Vec<String>,
        frequency_range: (f32, f32),
        bins_per_octave: usize,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if genre_names.len() != layout.genre_count {
            return Err(Error::config(format!(
                "{} genre names for {} genres",
                genre_names.len(),
                layout.genre_count
            )));
        }
        if root.join(ATTRIBUTES_FILE).exists()
            || root.join(RAW_FRAMES_FILE).exists()
            || root.join(SPECTRAL_FEATURES_FILE).exists()
        {
            return Err(Error::config(format!(
                "{} already holds a feature store; remove it first",
                root.display()
            )));
        }

        fs::create_dir_all(&root)?;
        let attributes = StoreAttributes {
            sample_rate,
            genre_names,
            layout,
            fmin: frequency_range.0,
            fmax: frequency_range.1,
            bins_per_octave,
            complete: false,
        };
        write_attributes(&root, &attributes)?;

        write_zeroed_npy::<f32, _>(
            &fs::File::create(root.join(RAW_FRAMES_FILE))?,
            Dim(layout.raw_shape()),
        )?;
        write_zeroed_npy::<f32, _>(
            &fs::File::create(root.join(SPECTRAL_FEATURES_FILE))?,
            Dim(layout.spectral_shape()),
        )?;

        log::info!(
            "allocated feature store {}: raw_frames {:?}, spectral_features {:?}",
            root.display(),
            layout.raw_shape(),
            layout.spectral_shape()
        );

        Self::open_arrays(root, attributes, true)
    }

    /// Open an existing store, complete or not.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let text = fs::read_to_string(root.join(ATTRIBUTES_FILE))?;
        let attributes: StoreAttributes = serde_json::from_str(&text)?;
        Self::open_arrays(root, attributes, false)
    }

    fn open_arrays(root: PathBuf, attributes: StoreAttributes, writable: bool) -> Result<Self> {
        let open = |name: &str, shape: [usize; 5]| -> Result<NpyFile> {
            let path = root.join(name);
            let file = if writable {
                NpyFile::open_rw(&path)?
            } else {
                NpyFile::open(&path)?
            };
            if file.header().fortran_order || file.shape() != shape.as_slice() {
                return Err(Error::format(
                    &path,
                    format!("expected C-ordered shape {shape:?}, found {:?}", file.shape()),
                ));
            }
            Ok(file)
        };
        let layout = attributes.layout;
        let raw = open(RAW_FRAMES_FILE, layout.raw_shape())?;
        let spectral = open(SPECTRAL_FEATURES_FILE, layout.spectral_shape())?;
        Ok(Self {
            root,
            attributes,
            raw,
            spectral,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn attributes(&self) -> &StoreAttributes {
        &self.attributes
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.attributes.layout
    }

    /// Write all four arrays of one clip into slab `(genre, clip)`.
    ///
    /// Every payload is shape-checked before anything touches the disk, so a
    /// rejected payload leaves the slab as it was.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] for out-of-range coordinates or a payload
    /// whose shape disagrees with the layout.
    pub fn write_slab(&self, genre: usize, clip: usize, payload: &ClipPayload) -> Result<()> {
        let layout = self.layout();
        let index = layout.slab_index(genre, clip)?;
        let frames = (layout.frame_count, layout.frame_size);
        let bins = (layout.frame_count, layout.n_bins);
        check_shape("aligned frames", payload.aligned_frames.view(), frames)?;
        check_shape("shifted frames", payload.shifted_frames.view(), frames)?;
        check_shape("aligned spectrum", payload.aligned_spectrum.view(), bins)?;
        check_shape("shifted spectrum", payload.shifted_spectrum.view(), bins)?;

        let raw = interleave(payload.aligned_frames.view(), payload.shifted_frames.view())?;
        let spectral = interleave(payload.aligned_spectrum.view(), payload.shifted_spectrum.view())?;

        self.raw.write_at(index * raw.len(), slab_slice(&raw)?)?;
        self.spectral.write_at(index * spectral.len(), slab_slice(&spectral)?)?;
        Ok(())
    }

    /// Read slab `(genre, clip)` back as `(raw, spectral)` arrays of shape
    /// `(frame_count, 2, frame_size)` and `(frame_count, 2, n_bins)`.
    pub fn read_slab(&self, genre: usize, clip: usize) -> Result<(Array3<f32>, Array3<f32>)> {
        let layout = self.layout();
        let index = layout.slab_index(genre, clip)?;
        let read = |file: &NpyFile, width: usize| -> Result<Array3<f32>> {
            let mut slab = Array3::<f32>::zeros((layout.frame_count, 2, width));
            let len = slab.len();
            let out = slab
                .as_slice_mut()
                .ok_or_else(|| Error::shape("standard layout slab", "strided slab"))?;
            file.read_at(index * len, out)?;
            Ok(slab)
        };
        Ok((
            read(&self.raw, layout.frame_size)?,
            read(&self.spectral, layout.n_bins)?,
        ))
    }

    /// Flush both arrays and mark the store complete.
    ///
    /// Consumes the handle, so a store is finished at most once.
    pub fn finish(mut self) -> Result<StoreAttributes> {
        self.raw.sync()?;
        self.spectral.sync()?;
        self.attributes.complete = true;
        write_attributes(&self.root, &self.attributes)?;
        log::info!("feature store {} complete", self.root.display());
        Ok(self.attributes)
    }

    /// Delete the store at `root`. This is the explicit step for clearing a
    /// previous or aborted run; nothing removes output implicitly.
    ///
    /// Only the store's own files are removed. The directory itself is
    /// removed if it is then empty. Missing files are not an error.
    pub fn remove(root: impl AsRef<Path>) -> Result<()> {
        let root = root.as_ref();
        for name in [ATTRIBUTES_FILE, RAW_FRAMES_FILE, SPECTRAL_FEATURES_FILE] {
            match fs::remove_file(root.join(name)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if root.is_dir() && fs::read_dir(root)?.next().is_none() {
            fs::remove_dir(root)?;
        }
        log::info!("removed feature store {}", root.display());
        Ok(())
    }
}

fn write_attributes(root: &Path, attributes: &StoreAttributes) -> Result<()> {
    fs::write(
        root.join(ATTRIBUTES_FILE),
        serde_json::to_string_pretty(attributes)?,
    )?;
    Ok(())
}

fn check_shape(name: &str, array: ArrayView2<'_, f32>, expected: (usize, usize)) -> Result<()> {
    if array.dim() != expected {
        return Err(Error::shape(
            format!("{name} {expected:?}"),
            format!("{:?}", array.dim()),
        ));
    }
    Ok(())
}

/// Stack aligned and shifted rows into `(frames, 2, width)`.
fn interleave<'a>(aligned: ArrayView2<'a, f32>, shifted: ArrayView2<'a, f32>) -> Result<Array3<f32>> {
    stack(Axis(1), &[aligned, shifted]).map_err(|e| Error::shape("stackable pair", e.to_string()))
}

fn slab_slice(slab: &Array3<f32>) -> Result<&[f32]> {
    slab.as_slice()
        .ok_or_else(|| Error::shape("standard layout slab", "strided slab"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array5;
    use ndarray_npy::read_npy;

    fn layout() -> StoreLayout {
        StoreLayout {
            genre_count: 2,
            clips_per_genre: 3,
            frame_count: 4,
            frame_size: 8,
            n_bins: 5,
        }
    }

    fn allocate(root: &Path) -> FeatureStore {
        FeatureStore::allocate(
            root,
            layout(),
            22050,
            vec!["blues".into(), "jazz".into()],
            (130.81, 2093.0),
            24,
        )
        .unwrap()
    }

    fn payload(seed: f32) -> ClipPayload {
        ClipPayload {
            aligned_frames: Array2::from_shape_fn((4, 8), |(f, s)| seed + (f * 8 + s) as f32),
            shifted_frames: Array2::from_shape_fn((4, 8), |(f, s)| -seed - (f * 8 + s) as f32),
            aligned_spectrum: Array2::from_shape_fn((4, 5), |(f, b)| seed * 0.5 + (f * 5 + b) as f32),
            shifted_spectrum: Array2::from_shape_fn((4, 5), |(f, b)| seed * 0.25 + (f * 5 + b) as f32),
        }
    }

    #[test]
    fn test_allocate_shapes_and_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("features");
        let store = allocate(&root);
        assert!(!store.attributes().complete);
        drop(store);

        let raw: Array5<f32> = read_npy(root.join(RAW_FRAMES_FILE)).unwrap();
        assert_eq!(raw.shape(), &[2, 3, 4, 2, 8]);
        assert!(raw.iter().all(|&v| v == 0.0));
        let spectral: Array5<f32> = read_npy(root.join(SPECTRAL_FEATURES_FILE)).unwrap();
        assert_eq!(spectral.shape(), &[2, 3, 4, 2, 5]);
    }

    #[test]
    fn test_write_slab_lands_in_its_region() {
        let dir = tempfile::tempdir().unwrap();
        let store = allocate(dir.path());
        let p = payload(100.0);
        store.write_slab(1, 2, &p).unwrap();
        store.finish().unwrap();

        let raw: Array5<f32> = read_npy(dir.path().join(RAW_FRAMES_FILE)).unwrap();
        let spectral: Array5<f32> = read_npy(dir.path().join(SPECTRAL_FEATURES_FILE)).unwrap();
        for f in 0..4 {
            for s in 0..8 {
                assert_eq!(raw[(1, 2, f, 0, s)], p.aligned_frames[(f, s)]);
                assert_eq!(raw[(1, 2, f, 1, s)], p.shifted_frames[(f, s)]);
            }
            for b in 0..5 {
                assert_eq!(spectral[(1, 2, f, 0, b)], p.aligned_spectrum[(f, b)]);
                assert_eq!(spectral[(1, 2, f, 1, b)], p.shifted_spectrum[(f, b)]);
            }
        }
        // Neighbouring slabs are untouched
        assert!(raw.slice(ndarray::s![1, 1, .., .., ..]).iter().all(|&v| v == 0.0));
        assert!(raw.slice(ndarray::s![0, .., .., .., ..]).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_read_slab_matches_payload() {
        let dir = tempfile::tempdir().unwrap();
        let store = allocate(dir.path());
        let p = payload(7.0);
        store.write_slab(0, 1, &p).unwrap();

        let (raw, spectral) = store.read_slab(0, 1).unwrap();
        assert_eq!(raw.dim(), (4, 2, 8));
        assert_eq!(raw.index_axis(Axis(1), 1), p.shifted_frames);
        assert_eq!(spectral.index_axis(Axis(1), 0), p.aligned_spectrum);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = allocate(dir.path());
        let mut p = payload(1.0);
        p.shifted_spectrum = Array2::zeros((3, 5));
        assert!(matches!(
            store.write_slab(0, 0, &p),
            Err(Error::ShapeMismatch { .. })
        ));
        assert!(matches!(
            store.write_slab(2, 0, &payload(1.0)),
            Err(Error::ShapeMismatch { .. })
        ));
        let (raw, _) = store.read_slab(0, 0).unwrap();
        assert!(raw.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        drop(allocate(dir.path()));
        let again = FeatureStore::allocate(
            dir.path(),
            layout(),
            22050,
            vec!["blues".into(), "jazz".into()],
            (130.81, 2093.0),
            24,
        );
        assert!(matches!(again, Err(Error::InvalidConfiguration { .. })));

        FeatureStore::remove(dir.path()).unwrap();
        assert!(!dir.path().exists());
    }

    #[test]
    fn test_finish_marks_complete() {
        let dir = tempfile::tempdir().unwrap();
        let store = allocate(dir.path());
        let attributes = store.finish().unwrap();
        assert!(attributes.complete);

        let reopened = FeatureStore::open(dir.path()).unwrap();
        assert!(reopened.attributes().complete);
        assert_eq!(reopened.attributes().genre_names, vec!["blues", "jazz"]);
        assert_eq!(reopened.attributes().sample_rate, 22050);
    }
}
