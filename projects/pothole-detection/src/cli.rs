use crate::geolocation::DEFAULT_GEO_URL;
use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// IP geolocation endpoint (ipinfo-compatible JSON)
    #[arg(long, global = true, env = "POTHOLE_GEO_URL", default_value = DEFAULT_GEO_URL)]
    pub geo_url: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the upload-and-detect web demo
    Serve(ServeArgs),
    /// Run detection over a folder of images and save annotated copies
    Detect(DetectArgs),
    /// Run detection on a webcam or video file, optionally recording the output
    Live(LiveArgs),
    /// Print the approximate location of this machine
    Locate,
    /// Check that the runtime libraries and a model can be loaded
    VerifyEnv(VerifyEnvArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    /// Host to bind to
    #[arg(long, env = "POTHOLE_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to bind to
    #[arg(long, env = "POTHOLE_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Path to the exported ONNX model
    #[arg(long, env = "POTHOLE_MODEL", default_value = "models/best.onnx")]
    pub model: String,

    /// Minimum confidence for a detection to be drawn
    #[arg(long, default_value_t = 0.25)]
    pub conf: f32,

    /// Maximum accepted upload size in megabytes
    #[arg(long, default_value_t = 16)]
    pub max_upload_mb: usize,
}

impl ServeArgs {
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct DetectArgs {
    /// Folder of images to run inference on
    #[arg(long)]
    pub source: PathBuf,

    /// Path to the exported ONNX model
    #[arg(long, env = "POTHOLE_MODEL", default_value = "models/best.onnx")]
    pub model: String,

    /// Minimum confidence for a detection to be kept
    #[arg(long, default_value_t = 0.25)]
    pub conf: f32,

    /// Parent directory for prediction runs
    #[arg(long, default_value = "runs/detect")]
    pub project: PathBuf,

    /// Run name; numbered suffixes are added when it already exists
    #[arg(long, default_value = "predict")]
    pub name: String,

    /// Show the first annotated result in a window when done
    #[arg(long)]
    pub preview: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct LiveArgs {
    /// Path to the exported ONNX model
    #[arg(long, env = "POTHOLE_MODEL", default_value = "models/best.onnx")]
    pub model: String,

    /// Camera index to capture from
    #[arg(long, default_value_t = 0)]
    pub camera: i32,

    /// Read from a video file instead of a camera
    #[arg(long, conflicts_with = "camera")]
    pub source: Option<PathBuf>,

    /// Minimum confidence for a detection to be drawn
    #[arg(long, default_value_t = 0.5)]
    pub conf: f32,

    #[arg(long, default_value_t = 640)]
    pub width: i32,

    #[arg(long, default_value_t = 480)]
    pub height: i32,

    /// Recording path
    #[arg(long, default_value = "runs/detect/live_output.avi")]
    pub output: PathBuf,

    /// Recording frame rate
    #[arg(long, default_value_t = 20.0)]
    pub fps: f64,

    /// Do not record the annotated stream
    #[arg(long)]
    pub no_save: bool,

    /// Do not open a preview window
    #[arg(long)]
    pub no_display: bool,

    /// Stop after this many frames
    #[arg(long)]
    pub max_frames: Option<usize>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct VerifyEnvArgs {
    /// Model to try loading
    #[arg(long, default_value = "yolov8n.onnx")]
    pub model: String,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
