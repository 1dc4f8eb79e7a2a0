// Live detection loop: capture -> detect -> annotate -> show/record.

use crate::detection::annotate::{draw_detections, draw_gps, draw_no_detections};
use crate::detection::{Detection, Detector};
use crate::geolocation::{gps_text, GeoFix};
use crate::video::{FrameSink, FrameSource};
use anyhow::Result;
use opencv::core::Mat;
use opencv::highgui;
use std::time::{Duration, Instant};

pub const WINDOW_TITLE: &str = "Pothole Detection - Live";

pub struct LiveOptions {
    pub display: bool,
    pub max_frames: Option<usize>,
}

#[derive(Debug, Default)]
pub struct LiveStats {
    pub frames: usize,
    pub frames_with_potholes: usize,
    pub duration: Duration,
}

/// Draws one live frame. The GPS line only appears alongside detections.
pub fn annotate_live_frame(
    frame: &mut Mat,
    detections: &[Detection],
    gps: Option<GeoFix>,
) -> Result<()> {
    if detections.is_empty() {
        return draw_no_detections(frame);
    }

    draw_detections(frame, detections)?;
    if gps.is_some() {
        draw_gps(frame, &gps_text(gps))?;
    }
    Ok(())
}

pub fn run_live(
    detector: &mut dyn Detector,
    source: &mut dyn FrameSource,
    mut sink: Option<&mut dyn FrameSink>,
    gps: Option<GeoFix>,
    opts: &LiveOptions,
) -> Result<LiveStats> {
    let start_time = Instant::now();
    let mut stats = LiveStats::default();

    if opts.display {
        tracing::info!("Starting live detection. Press 'q' to exit.");
    }

    loop {
        if opts.max_frames.is_some_and(|max| stats.frames >= max) {
            tracing::info!("Reached frame limit of {}", stats.frames);
            break;
        }

        let mut frame = match source.next_frame()? {
            Some(frame) => frame,
            None => {
                tracing::warn!("Camera disconnected or end of stream");
                break;
            }
        };

        let detections = detector.detect(&frame)?;
        if !detections.is_empty() {
            stats.frames_with_potholes += 1;
        }
        annotate_live_frame(&mut frame, &detections, gps)?;

        if let Some(sink) = sink.as_deref_mut() {
            sink.write(&frame)?;
        }
        stats.frames += 1;

        if opts.display {
            highgui::imshow(WINDOW_TITLE, &frame)?;
            let key = highgui::wait_key(1)?;
            if key & 0xFF == 'q' as i32 {
                tracing::info!("Exiting live detection");
                break;
            }
        }
    }

    if opts.display {
        highgui::destroy_all_windows()?;
    }

    stats.duration = start_time.elapsed();
    Ok(stats)
}
