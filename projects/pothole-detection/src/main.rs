mod batch;
mod cli;
mod detection;
mod geolocation;
mod live;
mod run_context;
mod verify_env;
mod video;
mod web;

use anyhow::{bail, Result};
use cli::{Args, Command, DetectArgs, LiveArgs, ServeArgs};
use detection::PotholeDetector;
use geolocation::{locate_or_none, IpLocator, Locator};
use std::sync::{Arc, Mutex};
use video::capture::CaptureSource;
use video::recorder::VideoRecorder;
use video::{FrameSink, FrameSource};
use web::api::AppState;
use web::server::run_server;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let args = Args::parse_args();
    let locator = Arc::new(IpLocator::new(&args.geo_url));

    match args.command {
        Command::Serve(serve) => serve_command(serve, locator).await,
        Command::Detect(detect) => tokio::task::spawn_blocking(move || detect_command(detect)).await?,
        Command::Live(live) => {
            tokio::task::spawn_blocking(move || live_command(live, locator.as_ref())).await?
        }
        Command::Locate => tokio::task::spawn_blocking(move || locate_command(locator.as_ref())).await?,
        Command::VerifyEnv(verify) => {
            tokio::task::spawn_blocking(move || {
                let checks = verify_env::run_checks(&verify.model, locator.as_ref());
                for check in &checks {
                    println!("{}", check);
                }
                if !verify_env::all_required_passed(&checks) {
                    bail!("Environment verification failed");
                }
                Ok(())
            })
            .await?
        }
    }
}

async fn serve_command(serve: ServeArgs, locator: Arc<IpLocator>) -> Result<()> {
    let detector = PotholeDetector::new(&serve.model, serve.conf)?;
    let state = Arc::new(AppState {
        detector: Mutex::new(Box::new(detector)),
        locator,
    });

    run_server(serve.host, serve.port, state, serve.max_upload_bytes()).await
}

fn detect_command(detect: DetectArgs) -> Result<()> {
    let mut detector = PotholeDetector::new(&detect.model, detect.conf)?;
    let opts = batch::BatchOptions {
        source: &detect.source,
        project: &detect.project,
        name: &detect.name,
        model: &detect.model,
        conf: detect.conf,
    };

    let summary = batch::run_batch(&mut detector, &opts)?;
    tracing::info!(
        "Processed {} images ({} skipped) in {:.1}s",
        summary.images,
        summary.skipped,
        summary.duration.as_secs_f64()
    );

    println!("Detection complete! {} potholes found.", summary.detections);
    println!(
        "Results are saved in: {}",
        std::path::absolute(&summary.output_dir)?.display()
    );

    if detect.preview {
        match &summary.first_output {
            Some(path) => batch::preview(path)?,
            None => tracing::warn!("Nothing to preview"),
        }
    }
    Ok(())
}

fn live_command(live: LiveArgs, locator: &dyn Locator) -> Result<()> {
    tracing::info!("Loading model...");
    let mut detector = PotholeDetector::new(&live.model, live.conf)?;

    let mut source = match &live.source {
        Some(path) => CaptureSource::file(path)?,
        None => CaptureSource::camera(live.camera, live.width, live.height)?,
    };

    let mut recorder = if live.no_save {
        None
    } else {
        let (width, height) = source.frame_size();
        let recorder = VideoRecorder::create(&live.output, live.fps, width, height)?;
        tracing::info!(
            "Saving live detections to: {}",
            std::path::absolute(recorder.path())?.display()
        );
        Some(recorder)
    };

    // One lookup per session
    let gps = locate_or_none(locator);
    match gps {
        Some(fix) => tracing::info!(
            "GPS Location: Latitude = {:.5}, Longitude = {:.5}",
            fix.lat,
            fix.lon
        ),
        None => tracing::warn!("Continuing without location data"),
    }

    let opts = live::LiveOptions {
        display: !live.no_display,
        max_frames: live.max_frames,
    };
    let stats = live::run_live(
        &mut detector,
        &mut source,
        recorder.as_mut().map(|r| r as &mut dyn FrameSink),
        gps,
        &opts,
    )?;

    if let Some(recorder) = &recorder {
        tracing::info!(
            "Recorded {} frames to {}",
            recorder.frames_written(),
            recorder.path().display()
        );
    }
    tracing::info!(
        "Live detection ended: {} frames, {} with potholes, {:.1}s",
        stats.frames,
        stats.frames_with_potholes,
        stats.duration.as_secs_f64()
    );
    Ok(())
}

fn locate_command(locator: &dyn Locator) -> Result<()> {
    match locator.locate() {
        Ok(fix) => {
            println!(
                "Current Location: Latitude = {}, Longitude = {}",
                fix.lat, fix.lon
            );
            Ok(())
        }
        Err(e) => {
            tracing::debug!("Lookup error: {:#}", e);
            bail!("Unable to fetch GPS location")
        }
    }
}
