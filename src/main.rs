use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use cqtstore::config::PipelineConfig;
use cqtstore::feature_store::FeatureStore;
use cqtstore::ingest::{IngestConfig, ingest_directory};
use cqtstore::pipeline::extract_features;

#[derive(Parser, Debug)]
#[command(
    name = "cqtstore",
    version,
    about = "Frame genre-grouped audio clips and store their constant-Q features"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a clip store from a directory with one subdirectory per genre
    Ingest {
        /// Directory of genre subdirectories holding audio files
        audio_dir: PathBuf,

        /// Clip store directory to create
        clip_store: PathBuf,

        /// Samples kept per clip; shorter files are skipped
        #[arg(long)]
        samples_per_clip: usize,

        /// Required sample rate in Hz (default: rate of the first clip)
        #[arg(long)]
        sample_rate: Option<u32>,

        /// Clips kept per genre (default: size of the smallest genre)
        #[arg(long)]
        clips_per_genre: Option<usize>,
    },

    /// Extract framed waveforms and spectral features into a feature store
    Extract {
        /// Clip store directory
        clip_store: PathBuf,

        /// Feature store directory to create
        feature_store: PathBuf,

        /// TOML run configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Remove an existing feature store first
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Ingest {
            audio_dir,
            clip_store,
            samples_per_clip,
            sample_rate,
            clips_per_genre,
        } => {
            let mut config = IngestConfig::new(samples_per_clip);
            config.sample_rate = sample_rate;
            config.clips_per_genre = clips_per_genre;

            let store = ingest_directory(&audio_dir, &clip_store, &config).with_context(|| {
                format!(
                    "failed to ingest {} into {}",
                    audio_dir.display(),
                    clip_store.display()
                )
            })?;
            let meta = store.metadata();
            println!(
                "{}: {} genres x {} clips, {} samples at {} Hz",
                clip_store.display(),
                meta.genre_count,
                meta.clips_per_genre,
                meta.samples_per_clip,
                meta.sample_rate
            );
        }
        Command::Extract {
            clip_store,
            feature_store,
            config,
            force,
        } => {
            let config = match &config {
                Some(path) => PipelineConfig::from_toml_file(path)
                    .with_context(|| format!("failed to load config {}", path.display()))?,
                None => PipelineConfig::default(),
            };
            if force {
                FeatureStore::remove(&feature_store).with_context(|| {
                    format!("failed to remove {}", feature_store.display())
                })?;
            }

            let summary = extract_features(&clip_store, &feature_store, &config)
                .with_context(|| format!("failed to extract {}", clip_store.display()))?;
            let layout = summary.attributes.layout;
            println!(
                "{}: raw_frames {:?}, spectral_features {:?} in {:.1}s",
                feature_store.display(),
                layout.raw_shape(),
                layout.spectral_shape(),
                summary.elapsed.as_secs_f64()
            );
        }
    }
    Ok(())
}
