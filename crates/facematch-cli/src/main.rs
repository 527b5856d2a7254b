use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facematch_core::{
    ArcFaceExtractor, Decision, DescriptorDistanceScorer, FrameSource, Gallery,
    PixelDeviationScorer, SimilarityScorer,
};
use facematch_io::{enroll_all, import_labeled_tree, FileSequenceSource, StillImageSource};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod recorder;

use config::{Backend, Config};
use recorder::{CaptureDriver, Gesture};

/// Pause between simulated presses so each release is observed first.
const PRESS_GAP: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(name = "facematch", about = "Enroll face stills and match new captures against them")]
struct Cli {
    /// Similarity backend (overrides FACEMATCH_BACKEND)
    #[arg(long, global = true, value_enum)]
    backend: Option<Backend>,
    /// ArcFace ONNX model for the descriptor backend
    #[arg(long, global = true)]
    model: Option<PathBuf>,
    /// Accept threshold; scores strictly above it match
    #[arg(long, global = true)]
    threshold: Option<f32>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the similarity score of two images
    Compare { a: PathBuf, b: PathBuf },
    /// Show the identities in a gallery directory (one sub-directory per label)
    List {
        #[arg(long)]
        gallery: PathBuf,
    },
    /// Match a probe image against a gallery directory
    Scan {
        #[arg(long)]
        gallery: PathBuf,
        /// Probe image, captured the same way as a camera still
        probe: PathBuf,
    },
    /// Simulate tap/hold capture gestures against an image source and enroll the result
    Enroll {
        /// Identity label for the captured samples
        #[arg(short, long)]
        label: String,
        /// Image file, or directory of images cycled like camera frames
        #[arg(long)]
        source: PathBuf,
        /// How long each press is held, in milliseconds
        #[arg(long, default_value_t = 200)]
        hold_ms: u64,
        /// Number of presses
        #[arg(long, default_value_t = 1)]
        presses: usize,
        /// Existing gallery directory to enroll into
        #[arg(long)]
        gallery: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(model) = cli.model {
        config.model_path = model;
    }
    if let Some(threshold) = cli.threshold {
        config.threshold = threshold;
    }
    config.validate()?;
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Compare { a, b } => {
            let engine = start_engine(&config)?;
            let a = capture_still(&a, &config)?;
            let b = capture_still(&b, &config)?;
            let score = engine.compare(a, b).await?;
            println!("{score:.1}");
        }
        Commands::List { gallery } => {
            let gallery = load_gallery(&gallery, &config)?;
            print_groups(&gallery)?;
        }
        Commands::Scan { gallery, probe } => {
            let gallery = load_gallery(&gallery, &config)?;
            if gallery.is_empty() {
                bail!("gallery is empty; enroll someone before scanning");
            }
            let engine = start_engine(&config)?;
            let probe = capture_still(&probe, &config)?;

            tracing::info!(samples = gallery.len(), "scanning");
            let decision = engine.scan(probe, gallery.snapshot()).await?;
            println!("{}", render_decision(&decision)?);
        }
        Commands::Enroll {
            label,
            source,
            hold_ms,
            presses,
            gallery,
        } => {
            let mut gallery = match gallery {
                Some(dir) => load_gallery(&dir, &config)?,
                None => Gallery::new(),
            };

            let outcome = if source.is_dir() {
                let frames = FileSequenceSource::from_dir(&source, config.capture_format())?;
                simulate_presses(frames, &config, hold_ms, presses).await
            } else {
                let still = StillImageSource::new(&source, config.capture_format());
                simulate_presses(still, &config, hold_ms, presses).await
            };

            if outcome.singles.is_empty() && outcome.batches.is_empty() {
                bail!("no samples captured from {}", source.display());
            }
            for frame in outcome.singles {
                gallery.enroll(&label, frame)?;
            }
            for batch in outcome.batches {
                gallery.enroll_batch(&label, batch)?;
            }
            print_groups(&gallery)?;
        }
    }

    Ok(())
}

fn build_scorer(config: &Config) -> Result<Arc<dyn SimilarityScorer>> {
    let scorer: Arc<dyn SimilarityScorer> = match config.backend {
        Backend::Pixel => Arc::new(PixelDeviationScorer::new(config.grid_size, config.sensitivity)),
        Backend::Descriptor => {
            let extractor = ArcFaceExtractor::load(&config.model_path)?;
            Arc::new(DescriptorDistanceScorer::new(Arc::new(extractor), config.distance_budget))
        }
    };
    tracing::info!(backend = scorer.name(), "similarity backend selected");
    Ok(scorer)
}

fn start_engine(config: &Config) -> Result<engine::EngineHandle> {
    let scorer = build_scorer(config)?;
    Ok(engine::spawn_engine(scorer, config.threshold, config.scan_delay())?)
}

/// Read one still the way the camera would deliver it.
fn capture_still(path: &Path, config: &Config) -> Result<facematch_core::Frame> {
    let mut source = StillImageSource::new(path, config.capture_format());
    source
        .capture()
        .with_context(|| format!("cannot capture {}", path.display()))
}

/// Import a labelled tree, normalised exactly like captured probes.
fn load_gallery(dir: &Path, config: &Config) -> Result<Gallery> {
    let images = import_labeled_tree(dir, config.capture_format())
        .with_context(|| format!("cannot import gallery from {}", dir.display()))?;
    let mut gallery = Gallery::new();
    enroll_all(&mut gallery, images)?;
    Ok(gallery)
}

/// Stdout carries only this JSON document; progress goes to the log.
fn render_decision(decision: &Decision) -> Result<String> {
    Ok(serde_json::to_string_pretty(decision)?)
}

fn print_groups(gallery: &Gallery) -> Result<()> {
    let groups = gallery.grouped_by_label();
    let summary = serde_json::json!({
        "samples": gallery.len(),
        "identities": groups,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn simulate_presses<S>(
    source: S,
    config: &Config,
    hold_ms: u64,
    presses: usize,
) -> recorder::CaptureOutcome
where
    S: FrameSource + 'static,
{
    let (tx, rx) = mpsc::channel(8);
    let task = tokio::spawn(CaptureDriver::new(source, config.capture_timing()).run(rx));

    for _ in 0..presses {
        if tx.send(Gesture::Press).await.is_err() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(hold_ms)).await;
        if tx.send(Gesture::Release).await.is_err() {
            break;
        }
        tokio::time::sleep(PRESS_GAP).await;
    }
    drop(tx);

    match task.await {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!(error = %err, "capture driver failed");
            recorder::CaptureOutcome::default()
        }
    }
}
