use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use maskcam_core::{
    detection::{draw_landmarks, install_model_file, LandmarkDetector, OnnxLandmarkDetector},
    export::{pack_rgba, FileSink, PixelFormat, VideoSink},
    overlay::AccessoryKit,
    pipeline::OverlayPipeline,
    runtime::configure_ort_dylib,
    video::{transcode, RgbaFrame},
};

// ── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "maskcam",
    version,
    about = "Face-anchored AR accessory overlay for video",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Composite AR accessories onto every detected face in a video.
    Overlay {
        /// Input video path
        #[arg(short, long)]
        input: PathBuf,

        /// Output video path
        #[arg(short, long, default_value = "overlay.mp4")]
        output: PathBuf,

        /// Bundled 68-point landmark ONNX model (installed into --data-dir)
        #[arg(long)]
        model: Option<PathBuf>,

        /// Directory the model is installed into on first run
        #[arg(long, default_value = "models")]
        data_dir: PathBuf,

        /// Glasses accessory image (with alpha)
        #[arg(long)]
        glasses: PathBuf,

        /// Cigarette accessory image (with alpha)
        #[arg(long)]
        cigarette: PathBuf,

        /// Vertical landmark-space margin offset
        #[arg(long, default_value_t = 0)]
        margin: i32,

        /// Simulated capture rotation in degrees (0/90/180/270)
        #[arg(long, default_value_t = 0)]
        rotate: i32,

        /// Simulate a mirrored (front-facing) capture
        #[arg(long)]
        mirror: bool,

        /// Also dump every composited frame's packed RGBA to this file,
        /// as a stand-in for an active streaming session
        #[arg(long)]
        sink_dump: Option<PathBuf>,
    },

    /// Debug render: draw detected landmark points on every frame.
    Landmarks {
        /// Input video path
        #[arg(short, long)]
        input: PathBuf,

        /// Output video path
        #[arg(short, long, default_value = "landmarks.mp4")]
        output: PathBuf,

        /// 68-point landmark ONNX model path
        #[arg(long, default_value = "face_landmarks.onnx")]
        model: PathBuf,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    // Respect RUST_LOG; default to info
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Overlay {
            input,
            output,
            model,
            data_dir,
            glasses,
            cigarette,
            margin,
            rotate,
            mirror,
            sink_dump,
        } => cmd_overlay(
            input, output, model, data_dir, glasses, cigarette, margin, rotate, mirror, sink_dump,
        ),
        Commands::Landmarks {
            input,
            output,
            model,
        } => cmd_landmarks(input, output, model),
    }
}

// ── Overlay ───────────────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn cmd_overlay(
    input: PathBuf,
    output: PathBuf,
    model: Option<PathBuf>,
    data_dir: PathBuf,
    glasses: PathBuf,
    cigarette: PathBuf,
    margin: i32,
    rotate: i32,
    mirror: bool,
    sink_dump: Option<PathBuf>,
) -> Result<()> {
    info!("AR overlay pipeline");
    info!("  input  : {}", input.display());
    info!("  output : {}", output.display());

    configure_ort_dylib();

    // A model that fails to load leaves the detector permanently unavailable:
    // frames still flow, just without accessories.
    let detector: Option<Box<dyn LandmarkDetector + Send>> = match model {
        Some(bundled) => match load_detector(&bundled, &data_dir) {
            Ok(detector) => Some(Box::new(detector)),
            Err(e) => {
                warn!("landmark model unavailable, frames will pass through: {e:#}");
                None
            }
        },
        None => {
            warn!("no landmark model given, frames will pass through");
            None
        }
    };

    let accessories = AccessoryKit::load(&glasses, &cigarette)?;
    let mut pipeline = OverlayPipeline::new(detector, accessories, margin);

    let mut sink = match sink_dump {
        Some(path) => Some(FileSink::create(path)?),
        None => None,
    };

    let pb = spinner("Compositing accessories…");
    let pb2 = pb.clone();

    transcode(input, &output, move |frame: &mut RgbaFrame| {
        pb2.tick();
        let (width, height, pts) = (frame.width, frame.height, frame.pts);
        let taken = RgbaFrame {
            data: std::mem::take(&mut frame.data),
            width,
            height,
            pts,
        };
        match pipeline.process_frame(taken, rotate, mirror) {
            Ok(done) => {
                if let Some(sink) = sink.as_mut() {
                    let packed = pack_rgba(&done);
                    if let Err(e) =
                        sink.consume(&packed, PixelFormat::Rgba, done.width, done.height, done.pts)
                    {
                        warn!("sink error: {e:#}");
                    }
                }
                *frame = done;
            }
            Err(e) => {
                // Frame dropped: emit black instead of stale garbage.
                warn!("frame dropped: {e:#}");
                *frame = RgbaFrame::new(width, height);
            }
        }
    })
    .context("overlay transcode failed")?;

    pb.finish_with_message("Done.");
    Ok(())
}

fn load_detector(bundled: &Path, data_dir: &Path) -> Result<OnnxLandmarkDetector> {
    let installed = install_model_file(bundled, data_dir)?;
    OnnxLandmarkDetector::load(installed)
}

// ── Landmark debug rendering ──────────────────────────────────────────────────

fn cmd_landmarks(input: PathBuf, output: PathBuf, model: PathBuf) -> Result<()> {
    info!("landmark debug rendering");

    configure_ort_dylib();
    let mut detector = OnnxLandmarkDetector::load(&model)
        .with_context(|| format!("failed to load model: {}", model.display()))?;

    let pb = spinner("Detecting landmarks…");
    let pb2 = pb.clone();

    transcode(input, &output, move |frame: &mut RgbaFrame| {
        pb2.tick();
        let detector: &mut (dyn LandmarkDetector + Send) = &mut detector;
        match maskcam_core::pipeline::detect_in_frame(Some(detector), frame) {
            Ok(detections) => {
                for face in &detections.faces {
                    if let Err(e) =
                        draw_landmarks(frame, face, &detections.to_frame, [255, 0, 0, 255])
                    {
                        warn!("draw error: {e:#}");
                    }
                }
            }
            Err(e) => warn!("detection error: {e:#}"),
        }
    })
    .context("landmark transcode failed")?;

    pb.finish_with_message("Done.");
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed_precise}]")
            .unwrap()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}
