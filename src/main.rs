use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use reelsync::continuity::{
    calculate_blending_compatibility, calculate_injection_confidence, resolve_dual_image,
    DualImageConfig, FrameAnalysis,
};
use reelsync::core::time::format_time;
use reelsync::core::{calculate_frame_boundaries, ClipInput, SyncManifest};
use reelsync::SyncConfig;

#[derive(Parser)]
#[command(name = "reelsync")]
#[command(about = "Playback sync diagnostics: clip timing, continuity resolution, frame blending")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine config (JSON); defaults apply to missing fields
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Absolute clip timestamps, sync points and total duration
    Timing {
        /// Clip durations in seconds, in playback order
        #[arg(required = true)]
        durations: Vec<f64>,

        /// Also report the frame count of each clip at this rate
        #[arg(long)]
        fps: Option<f64>,
    },

    /// Pick the anchor images for a clip from a DualImageConfig JSON file
    Resolve {
        input: PathBuf,
    },

    /// Score the transition between two FrameAnalysis JSON files
    Blend {
        previous: PathBuf,
        next: PathBuf,

        /// Inputs are upstream scene anchors rather than FrameAnalysis objects
        #[arg(long)]
        scene_anchor: bool,
    },

    /// Print the effective engine config
    Config,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TimingReport {
    timestamps: Vec<f64>,
    total_duration: f64,
    sync_points: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frames_per_clip: Option<Vec<usize>>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => {
            let config = SyncConfig::from_json_file(path)?;
            debug!(path = %path.display(), "config loaded");
            config
        }
        None => SyncConfig::default(),
    };

    match cli.command {
        Commands::Timing { durations, fps } => timing_command(durations, fps),
        Commands::Resolve { input } => resolve_command(&input),
        Commands::Blend {
            previous,
            next,
            scene_anchor,
        } => blend_command(&previous, &next, scene_anchor),
        Commands::Config => print_json(&config),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn timing_command(durations: Vec<f64>, fps: Option<f64>) -> Result<()> {
    let clips: Vec<ClipInput> = durations
        .iter()
        .enumerate()
        .map(|(index, duration)| ClipInput::new(format!("clip-{}", index + 1), "", *duration))
        .collect();
    let manifest = SyncManifest::build(&clips, Vec::new());
    info!(
        clips = clips.len(),
        total = %format_time(manifest.total_duration),
        "timing computed"
    );

    let report = TimingReport {
        timestamps: manifest.video_tracks.iter().map(|clip| clip.start_time).collect(),
        total_duration: manifest.total_duration,
        sync_points: manifest.sync_points.iter().map(|point| point.time).collect(),
        frames_per_clip: fps.map(|fps| {
            durations
                .iter()
                .map(|duration| calculate_frame_boundaries(*duration, fps).len())
                .collect()
        }),
    };
    print_json(&report)
}

fn resolve_command(input: &Path) -> Result<()> {
    let config: DualImageConfig = read_json(input)?;
    let result = resolve_dual_image(&config);
    let confidence = calculate_injection_confidence(&result);
    info!(strategy = ?result.strategy, confidence, "anchor resolved");

    print_json(&serde_json::json!({
        "result": result,
        "confidence": confidence,
    }))
}

fn blend_command(previous: &Path, next: &Path, scene_anchor: bool) -> Result<()> {
    let load = |path: &Path| -> Result<FrameAnalysis> {
        if scene_anchor {
            let anchor: serde_json::Value = read_json(path)?;
            Ok(FrameAnalysis::from_scene_anchor(&anchor))
        } else {
            read_json(path)
        }
    };

    let report = calculate_blending_compatibility(&load(previous)?, &load(next)?);
    info!(score = report.score, compatible = report.compatible, "blend scored");
    print_json(&report)
}
