// Folder inference: annotate every image under a directory and save the results.

use crate::detection::annotate::draw_detections;
use crate::detection::Detector;
use crate::run_context::{create_run_dir, list_images, RunMetadata};
use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use opencv::core::Vector;
use opencv::imgcodecs;
use opencv::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub struct BatchOptions<'a> {
    pub source: &'a Path,
    pub project: &'a Path,
    pub name: &'a str,
    pub model: &'a str,
    pub conf: f32,
}

#[derive(Debug)]
pub struct BatchSummary {
    pub output_dir: PathBuf,
    pub images: usize,
    pub skipped: usize,
    pub detections: usize,
    pub duration: Duration,
    /// First annotated image written, used for the optional preview
    pub first_output: Option<PathBuf>,
}

#[derive(Serialize)]
struct DetectionRow<'a> {
    image: &'a str,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    confidence: f32,
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| anyhow!("Non UTF-8 path: {:?}", path))
}

pub fn run_batch(detector: &mut dyn Detector, opts: &BatchOptions) -> Result<BatchSummary> {
    if !opts.source.is_dir() {
        return Err(anyhow!(
            "Source folder not found: {}",
            opts.source.display()
        ));
    }

    let images = list_images(opts.source);
    if images.is_empty() {
        tracing::warn!("No images found under {}", opts.source.display());
    }

    let output_dir = create_run_dir(opts.project, opts.name)?;
    let mut metadata = RunMetadata::new(&output_dir, opts.source, opts.model, opts.conf);
    let mut csv_writer = csv::Writer::from_path(output_dir.join("detections.csv"))
        .context("Failed to create detections.csv")?;

    let pb = ProgressBar::new(images.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec:.1.yellow} img/s, {eta})")?
            .progress_chars("#>-"),
    );

    let start_time = Instant::now();
    let mut skipped = 0;
    let mut first_output = None;

    for image_path in &images {
        pb.inc(1);

        let mut frame = imgcodecs::imread(path_str(image_path)?, imgcodecs::IMREAD_COLOR)?;
        if frame.empty() {
            tracing::warn!("Skipping unreadable image {}", image_path.display());
            skipped += 1;
            continue;
        }

        let detections = detector
            .detect(&frame)
            .with_context(|| format!("Detection failed on {}", image_path.display()))?;
        draw_detections(&mut frame, &detections)?;

        // Mirror the source folder layout
        let rel_path = image_path
            .strip_prefix(opts.source)
            .with_context(|| format!("{} is outside the source folder", image_path.display()))?;
        let rel_name = path_str(rel_path)?;
        let out_path = output_dir.join(rel_path);
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        if !imgcodecs::imwrite(path_str(&out_path)?, &frame, &Vector::new())? {
            tracing::warn!("Failed to write {}", out_path.display());
            skipped += 1;
            continue;
        }
        if first_output.is_none() {
            first_output = Some(out_path);
        }

        for d in &detections {
            csv_writer.serialize(DetectionRow {
                image: rel_name,
                x1: d.bbox.x,
                y1: d.bbox.y,
                x2: d.bbox.x + d.bbox.w,
                y2: d.bbox.y + d.bbox.h,
                confidence: d.confidence,
            })?;
        }

        tracing::debug!("{}: {} potholes", rel_name, detections.len());
        metadata.images += 1;
        metadata.detections += detections.len();
    }

    pb.finish_with_message("Done");
    csv_writer.flush()?;
    metadata.save()?;

    Ok(BatchSummary {
        output_dir,
        images: metadata.images,
        skipped,
        detections: metadata.detections,
        duration: start_time.elapsed(),
        first_output,
    })
}

/// Shows an annotated image until a key is pressed.
pub fn preview(path: &Path) -> Result<()> {
    let img = imgcodecs::imread(path_str(path)?, imgcodecs::IMREAD_COLOR)?;
    if img.empty() {
        return Err(anyhow!("Cannot preview {}", path.display()));
    }
    opencv::highgui::imshow("Sample Prediction", &img)?;
    opencv::highgui::wait_key(0)?;
    opencv::highgui::destroy_all_windows()?;
    Ok(())
}
