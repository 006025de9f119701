//! Headless playback driver
//!
//! Plays a video through the engine with an optional set of pose models,
//! logging playback position and optionally dumping annotated frames to
//! disk. Useful for smoke-testing models and measuring sustained playback
//! without a display attached.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use pose_playback_common::format_timecode;
use pose_playback_engine::{EngineController, EngineEvent};
use pose_playback_models::{ModelRegistry, PoseModel};
use pose_playback_source::open_rgb;

/// Log an INFO position line every this many frames
const POSITION_LOG_INTERVAL: u64 = 30;

#[derive(Parser)]
#[command(
    name = "pose-playback",
    version,
    about = "Real-time video playback with pose-estimation overlays",
    after_help = "EXAMPLES:\n  \
                  # Play a video headless, no models\n  \
                  pose-playback video.mp4\n\n  \
                  # Annotate with the nano model and dump frames\n  \
                  pose-playback --models yolov8n-pose --dump-dir ./frames video.mp4\n\n  \
                  # Start at frame 300, double speed, loop forever\n  \
                  pose-playback --seek 300 --speed 2.0 --loop video.mp4\n\n  \
                  # Load models from a manifest instead of the model directory\n  \
                  pose-playback --manifest models.yaml --models yolov8s-strict video.mp4"
)]
struct Cli {
    /// Video file to play
    input: PathBuf,

    /// Comma-separated model names to apply per frame
    #[arg(short, long, value_delimiter = ',')]
    models: Vec<String>,

    /// Directory scanned for yolov8*-pose.onnx files
    #[arg(long, default_value = "models")]
    model_dir: PathBuf,

    /// YAML model manifest (overrides --model-dir scanning)
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Playback speed multiplier
    #[arg(long, default_value_t = 1.0)]
    speed: f32,

    /// Loop back to frame 0 at end of stream
    #[arg(long = "loop")]
    looping: bool,

    /// Start playback at this frame index
    #[arg(long)]
    seek: Option<u64>,

    /// Stop after this many frames (required with --loop to terminate)
    #[arg(long)]
    max_frames: Option<u64>,

    /// Write each played frame as JPEG into this directory
    #[arg(long)]
    dump_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let source = open_rgb(&cli.input)
        .with_context(|| format!("Failed to open {}", cli.input.display()))?;
    let fps = pose_playback_common::FrameSource::fps(&source);

    let models = load_models(&cli)?;

    if let Some(dir) = &cli.dump_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create dump directory {}", dir.display()))?;
    }

    let mut controller = EngineController::new();
    controller.open(Box::new(source));
    controller.set_active_models(models);
    controller.set_speed(cli.speed);
    controller.set_loop(cli.looping);

    let events = controller.events();
    controller.start()?;
    if let Some(frame) = cli.seek {
        controller.seek(frame);
    }

    let mut played: u64 = 0;
    loop {
        let event = match events.recv() {
            Ok(event) => event,
            Err(_) => break,
        };
        match event {
            EngineEvent::FrameReady(frame) => {
                played += 1;
                if let Some(dir) = &cli.dump_dir {
                    let path = dir.join(format!("frame_{:06}.jpg", frame.index));
                    match frame.to_rgb_image() {
                        Some(img) => img
                            .save(&path)
                            .with_context(|| format!("Failed to write {}", path.display()))?,
                        None => debug!("Frame {} is not RGB, skipping dump", frame.index),
                    }
                }
                if let Some(max) = cli.max_frames {
                    if played >= max {
                        info!("Played {} frames, stopping", played);
                        break;
                    }
                }
            }
            EngineEvent::PositionChanged(pos) => {
                if pos.current % POSITION_LOG_INTERVAL == 0 {
                    info!(
                        "Position {}/{} [{}]",
                        pos.current,
                        pos.total,
                        format_timecode(pos.current, fps)
                    );
                } else {
                    debug!("Position {}/{}", pos.current, pos.total);
                }
            }
            EngineEvent::Finished => {
                info!("Playback finished after {} frames", played);
                break;
            }
        }
    }

    controller.stop();
    Ok(())
}

/// Build the active model set from a manifest or by directory scan
fn load_models(cli: &Cli) -> Result<Vec<Arc<dyn PoseModel>>> {
    if cli.models.is_empty() {
        info!("No models requested, playing without annotations");
        return Ok(Vec::new());
    }

    let registry = match &cli.manifest {
        Some(path) => ModelRegistry::from_manifest(path)
            .with_context(|| format!("Failed to load manifest {}", path.display()))?,
        None => ModelRegistry::load_defaults(&cli.model_dir)
            .with_context(|| format!("Failed to scan model directory {}", cli.model_dir.display()))?,
    };
    info!("Available models: {}", registry.names().join(", "));

    let models = registry.resolve(&cli.models)?;
    Ok(models)
}
