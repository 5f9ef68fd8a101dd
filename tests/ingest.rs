//! Building clip stores from directories of audio files.

use std::fs;
use std::path::Path;

use cqtstore::config::PipelineConfig;
use cqtstore::ingest::{IngestConfig, ingest_directory};
use cqtstore::io::{load_mono, save_wav};
use cqtstore::pipeline::extract_features;
use cqtstore::Error;
use ndarray::Array2;

const SR: u32 = 22050;

fn write_tone(path: &Path, freq: f32, samples: usize, channels: usize, sr: u32) {
    let w = 2.0 * std::f32::consts::PI * freq / sr as f32;
    let data = Array2::from_shape_fn((channels, samples), |(ch, i)| {
        (w * i as f32).sin() * (0.8 - 0.3 * ch as f32)
    });
    save_wav(path, &data, sr).unwrap();
}

/// blues: two usable clips and one too short; jazz: two stereo clips.
fn write_tree(root: &Path) {
    fs::create_dir_all(root.join("blues")).unwrap();
    fs::create_dir_all(root.join("jazz/live")).unwrap();
    write_tone(&root.join("blues/a.wav"), 220.0, 5000, 1, SR);
    write_tone(&root.join("blues/b.wav"), 330.0, 4500, 1, SR);
    write_tone(&root.join("blues/c.wav"), 440.0, 1000, 1, SR);
    write_tone(&root.join("jazz/a.wav"), 550.0, 6000, 2, SR);
    write_tone(&root.join("jazz/live/b.wav"), 660.0, 4096, 2, SR);
    fs::write(root.join("jazz/notes.txt"), b"not audio").unwrap();
}

#[test]
fn ingest_sorts_genres_and_skips_short_clips() {
    let dir = tempfile::tempdir().unwrap();
    let audio = dir.path().join("audio");
    write_tree(&audio);

    let store = ingest_directory(&audio, dir.path().join("clips"), &IngestConfig::new(4000)).unwrap();
    let meta = store.metadata();
    assert_eq!(meta.genre_names, vec!["blues", "jazz"]);
    assert_eq!(meta.clips_per_genre, 2);
    assert_eq!(meta.sample_rate, SR);
    assert_eq!(meta.samples_per_clip, 4000);

    let expected = load_mono(audio.join("jazz/live/b.wav"), Some(4000)).unwrap();
    assert_eq!(store.read_clip(1, 1).unwrap(), expected.samples);
    let expected = load_mono(audio.join("blues/b.wav"), Some(4000)).unwrap();
    assert_eq!(store.read_clip(0, 1).unwrap(), expected.samples);
}

#[test]
fn ingest_drops_extra_clips() {
    let dir = tempfile::tempdir().unwrap();
    let audio = dir.path().join("audio");
    write_tree(&audio);

    let config = IngestConfig::new(4000).with_clips_per_genre(1);
    let store = ingest_directory(&audio, dir.path().join("clips"), &config).unwrap();
    assert_eq!(store.metadata().clips_per_genre, 1);

    let expected = load_mono(audio.join("jazz/a.wav"), Some(4000)).unwrap();
    assert_eq!(store.read_clip(1, 0).unwrap(), expected.samples);
}

#[test]
fn ingest_needs_enough_clips_per_genre() {
    let dir = tempfile::tempdir().unwrap();
    let audio = dir.path().join("audio");
    write_tree(&audio);

    let config = IngestConfig::new(4000).with_clips_per_genre(3);
    let result = ingest_directory(&audio, dir.path().join("clips"), &config);
    assert!(matches!(result, Err(Error::InvalidConfiguration { .. })));
}

#[test]
fn ingest_rejects_mixed_sample_rates() {
    let dir = tempfile::tempdir().unwrap();
    let audio = dir.path().join("audio");
    write_tree(&audio);
    write_tone(&audio.join("jazz/z.wav"), 440.0, 8000, 1, 16000);

    let result = ingest_directory(&audio, dir.path().join("clips"), &IngestConfig::new(4000));
    assert!(matches!(result, Err(Error::InvalidConfiguration { .. })));

    let config = IngestConfig::new(4000).with_sample_rate(44100);
    fs::remove_file(audio.join("jazz/z.wav")).unwrap();
    let result = ingest_directory(&audio, dir.path().join("clips"), &config);
    assert!(matches!(result, Err(Error::InvalidConfiguration { .. })));
}

#[test]
fn ingested_store_feeds_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let audio = dir.path().join("audio");
    write_tree(&audio);
    let clips = dir.path().join("clips");
    ingest_directory(&audio, &clips, &IngestConfig::new(4096)).unwrap();

    let config = PipelineConfig::default()
        .with_frame_size(512)
        .with_expected_sample_rate(SR);
    let summary = extract_features(&clips, dir.path().join("features"), &config).unwrap();
    assert_eq!(summary.grid.frame_count, 7);
    assert_eq!(summary.attributes.layout.raw_shape(), [2, 2, 7, 2, 512]);
    assert_eq!(summary.attributes.genre_names, vec!["blues", "jazz"]);
}

#[test]
fn ingest_refuses_undecodable_formats() {
    let dir = tempfile::tempdir().unwrap();
    let audio = dir.path().join("audio");
    write_tree(&audio);
    fs::write(audio.join("blues/d.au"), b".snd\0\0\0\x18").unwrap();
    let clips = dir.path().join("clips");

    let result = ingest_directory(&audio, &clips, &IngestConfig::new(4000));
    match result {
        Err(Error::InvalidConfiguration { reason }) => assert!(reason.contains(".au"), "{reason}"),
        other => panic!("expected InvalidConfiguration, got {other:?}"),
    }
    assert!(!clips.exists());
}

#[test]
fn ingest_matches_extensions_in_any_case() {
    let dir = tempfile::tempdir().unwrap();
    let audio = dir.path().join("audio");
    write_tree(&audio);
    write_tone(&audio.join("jazz/c.Wav"), 770.0, 4200, 1, SR);

    let store = ingest_directory(&audio, dir.path().join("clips"), &IngestConfig::new(4000)).unwrap();
    assert_eq!(store.metadata().clips_per_genre, 2);
    let config = IngestConfig::new(4000).with_clips_per_genre(3);
    let result = ingest_directory(&audio, dir.path().join("clips3"), &config);
    assert!(matches!(result, Err(Error::InvalidConfiguration { .. })));

    write_tone(&audio.join("blues/e.WAV"), 880.0, 4200, 1, SR);
    let store = ingest_directory(&audio, dir.path().join("clips4"), &config).unwrap();
    assert_eq!(store.metadata().clips_per_genre, 3);
    let expected = load_mono(audio.join("jazz/c.Wav"), Some(4000)).unwrap();
    assert_eq!(store.read_clip(1, 1).unwrap(), expected.samples);
}
