//! Build a clip store from a directory tree of audio files.
//!
//! Each immediate subdirectory of the audio root is a genre, named after the
//! directory. Every audio file below it is a candidate clip. Clips are
//! decoded, averaged to mono and cut to a common length; nothing is
//! resampled.

use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView1};

use crate::clip_store::{ClipStore, ClipStoreWriter, CorpusMetadata};
use crate::files;
use crate::io::load_mono;
use crate::{Error, Result};

/// Settings for [`ingest_directory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    /// Samples kept per clip. Shorter files are skipped, longer ones cut.
    pub samples_per_clip: usize,
    /// Required sample rate; `None` adopts the rate of the first clip.
    pub sample_rate: Option<u32>,
    /// Clips kept per genre; `None` uses the smallest genre's count.
    pub clips_per_genre: Option<usize>,
}

impl IngestConfig {
    pub fn new(samples_per_clip: usize) -> Self {
        Self {
            samples_per_clip,
            sample_rate: None,
            clips_per_genre: None,
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    pub fn with_clips_per_genre(mut self, clips_per_genre: usize) -> Self {
        self.clips_per_genre = Some(clips_per_genre);
        self
    }
}

struct GenreScan {
    name: String,
    clips: Vec<PathBuf>,
}

/// Decode the genre directories under `audio_root` into a clip store at
/// `clip_store`.
///
/// Files are scanned once to pick the accepted clips and decoded again while
/// writing, so only one genre is held in memory.
///
/// # Errors
/// [`Error::InvalidConfiguration`] for a sample-rate mismatch, an empty
/// corpus, a file in a format listed in
/// [`files::UNSUPPORTED_AUDIO_EXTENSIONS`], or a genre with fewer than
/// `clips_per_genre` usable clips;
/// [`Error::Audio`] if a file cannot be decoded.
pub fn ingest_directory(
    audio_root: impl AsRef<Path>,
    clip_store: impl AsRef<Path>,
    config: &IngestConfig,
) -> Result<ClipStore> {
    let samples = config.samples_per_clip;
    if samples == 0 {
        return Err(Error::config("samples_per_clip must be greater than zero"));
    }

    let mut sample_rate = config.sample_rate;
    let mut scans = Vec::new();
    for dir in files::subdirectories(audio_root.as_ref())? {
        let name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::config(format!("genre directory {} is not valid UTF-8", dir.display()))
            })?
            .to_string();

        if let Some(path) = files::find_files(&dir, files::UNSUPPORTED_AUDIO_EXTENSIONS).first() {
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
            return Err(Error::config(format!(
                "{} is a .{ext} file, which no enabled decoder reads; convert it first",
                path.display()
            )));
        }

        let mut accepted = Vec::new();
        for path in files::find_files(&dir, files::DEFAULT_AUDIO_EXTENSIONS) {
            let clip = load_mono(&path, Some(samples))?;
            match sample_rate {
                Some(sr) if sr != clip.sample_rate => {
                    return Err(Error::config(format!(
                        "{} is sampled at {} Hz, corpus rate is {sr} Hz",
                        path.display(),
                        clip.sample_rate
                    )));
                }
                Some(_) => {}
                None => sample_rate = Some(clip.sample_rate),
            }
            if clip.samples.len() < samples {
                log::warn!(
                    "skipping {}: {} samples, need {samples}",
                    path.display(),
                    clip.samples.len()
                );
                continue;
            }
            accepted.push(path);
        }

        log::info!("genre {name:?}: {} usable clips", accepted.len());
        scans.push(GenreScan {
            name,
            clips: accepted,
        });
    }

    if scans.is_empty() {
        return Err(Error::config(format!(
            "no genre directories under {}",
            audio_root.as_ref().display()
        )));
    }

    let smallest = scans.iter().map(|s| s.clips.len()).min().unwrap_or(0);
    let clips_per_genre = config.clips_per_genre.unwrap_or(smallest);
    if let Some(short) = scans
        .iter()
        .find(|s| s.clips.len() < clips_per_genre || s.clips.is_empty())
    {
        return Err(Error::config(format!(
            "genre {:?} has {} usable clips, need {}",
            short.name,
            short.clips.len(),
            clips_per_genre.max(1)
        )));
    }
    let sample_rate =
        sample_rate.ok_or_else(|| Error::config("no clips found to infer the sample rate"))?;

    let metadata = CorpusMetadata::new(
        scans.iter().map(|s| s.name.clone()).collect(),
        clips_per_genre,
        sample_rate,
        samples,
    )?;
    let mut writer = ClipStoreWriter::create(clip_store, metadata)?;

    for (genre, scan) in scans.iter().enumerate() {
        if scan.clips.len() > clips_per_genre {
            log::info!(
                "genre {:?}: dropping {} extra clips",
                scan.name,
                scan.clips.len() - clips_per_genre
            );
        }
        let mut clips = Array2::zeros((clips_per_genre, samples));
        for (clip, path) in scan.clips.iter().take(clips_per_genre).enumerate() {
            let decoded = load_mono(path, Some(samples))?;
            if decoded.samples.len() != samples {
                return Err(Error::InsufficientSamples {
                    required: samples,
                    available: decoded.samples.len(),
                });
            }
            clips
                .row_mut(clip)
                .assign(&ArrayView1::from(decoded.samples.as_slice()));
        }
        writer.write_genre(genre, clips.view())?;
        log::debug!("wrote genre {:?}", scan.name);
    }

    let store = writer.finish()?;
    log::info!(
        "clip store {}: {} genres x {} clips of {samples} samples at {sample_rate} Hz",
        store.root().display(),
        store.metadata().genre_count,
        clips_per_genre
    );
    Ok(store)
}
