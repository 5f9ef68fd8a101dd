//! Audio decoding for corpus ingestion, plus WAV writing and signal
//! generators used for fixtures.

use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use ndarray::Array2;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("hound error: {0}")]
    Hound(#[from] hound::Error),
    #[error("symphonia error: {0}")]
    Symphonia(SymphoniaError),
    #[error("no audio track found")]
    NoAudioTrack,
    #[error("unsupported number of channels")]
    UnsupportedChannels,
}

impl From<SymphoniaError> for AudioError {
    fn from(err: SymphoniaError) -> Self {
        Self::Symphonia(err)
    }
}

/// A decoded, downmixed clip.
#[derive(Debug, Clone)]
pub struct MonoClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Channel count of the source before downmixing.
    pub source_channels: u16,
}

/// Decode any supported audio file and average its channels to mono.
///
/// At most `max_samples` frames are kept when given, so overly long files
/// are not held in memory past what the corpus needs.
///
/// # Errors
/// Returns [`AudioError`] if the container cannot be probed, holds no audio
/// track, or reports no channels.
pub fn load_mono<P: AsRef<Path>>(
    path: P,
    max_samples: Option<usize>,
) -> Result<MonoClip, AudioError> {
    let path_ref = path.as_ref();
    let mut hint = Hint::new();
    if let Some(ext) = path_ref.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let file = std::fs::File::open(path_ref).map_err(SymphoniaError::IoError)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.sample_rate.is_some())
        .ok_or(AudioError::NoAudioTrack)?
        .clone();

    let sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(0);
    if channels == 0 {
        return Err(AudioError::UnsupportedChannels);
    }

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let limit = max_samples.unwrap_or(usize::MAX);
    let mut samples: Vec<f32> = Vec::new();
    while samples.len() < limit {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(SymphoniaError::IoError(_)) => break,
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track.id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(audio) => audio,
            Err(SymphoniaError::IoError(_)) => break,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(e.into()),
        };

        let mut sb = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        sb.copy_interleaved_ref(decoded);
        samples.extend(
            sb.samples()
                .chunks_exact(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );
    }
    samples.truncate(limit);

    Ok(MonoClip {
        samples,
        sample_rate,
        source_channels: channels as u16,
    })
}

/// Generate a pure tone.
pub fn tone(frequency: f32, sr: u32, duration: f32) -> Vec<f32> {
    let n_samples = (duration * sr as f32) as usize;
    let angular_freq = 2.0 * std::f32::consts::PI * frequency / sr as f32;
    (0..n_samples)
        .map(|i| (angular_freq * i as f32).sin())
        .collect()
}

/// Save audio data to a 16-bit PCM WAV file.
///
/// # Arguments
/// * `path` - Path to save the WAV file
/// * `data` - Audio data with shape (channels, frames)
/// * `sample_rate` - Sample rate in Hz
///
/// Samples are clipped to [-1.0, 1.0] before quantization.
///
/// # Errors
/// Returns `crate::Error::Audio` if the file cannot be written
pub fn save_wav<P: AsRef<Path>>(
    path: P,
    data: &Array2<f32>,
    sample_rate: u32,
) -> crate::Result<()> {
    let (channels, frames) = data.dim();

    let spec = WavSpec {
        channels: channels as u16,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec).map_err(AudioError::Hound)?;
    for frame in 0..frames {
        for ch in 0..channels {
            let sample = data[(ch, frame)].clamp(-1.0, 1.0);
            let s = (sample * i16::MAX as f32) as i16;
            writer.write_sample(s).map_err(AudioError::Hound)?;
        }
    }
    writer.finalize().map_err(AudioError::Hound)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_tone_length() {
        assert_eq!(tone(440.0, 22050, 1.0).len(), 22050);
        assert_eq!(tone(440.0, 22050, 0.0).len(), 0);
    }

    #[test]
    fn test_wav_roundtrip_stereo_downmix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");

        let frames = 2048;
        let mut data = Array2::<f32>::zeros((2, frames));
        for i in 0..frames {
            data[(0, i)] = 0.5;
            data[(1, i)] = -0.25;
        }
        save_wav(&path, &data, 16000).unwrap();

        let clip = load_mono(&path, None).unwrap();
        assert_eq!(clip.sample_rate, 16000);
        assert_eq!(clip.source_channels, 2);
        assert_eq!(clip.samples.len(), frames);
        assert_relative_eq!(clip.samples[10], 0.125, epsilon = 1e-3);
    }

    #[test]
    fn test_load_truncates_to_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        let y = tone(220.0, 8000, 1.0);
        let data = Array2::from_shape_vec((1, y.len()), y).unwrap();
        save_wav(&path, &data, 8000).unwrap();

        let clip = load_mono(&path, Some(1000)).unwrap();
        assert_eq!(clip.samples.len(), 1000);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(load_mono("/nonexistent/clip.wav", None).is_err());
    }
}
