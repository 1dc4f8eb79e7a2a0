use crate::detection::types::Detection;
use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use opencv::core::{Mat, Point, Rect, Scalar, Vector};
use opencv::imgproc::{put_text, rectangle, FONT_HERSHEY_SIMPLEX, LINE_8};
use opencv::prelude::*;

const GREEN: (f64, f64, f64) = (0.0, 255.0, 0.0);
const WHITE: (f64, f64, f64) = (255.0, 255.0, 255.0);
const RED: (f64, f64, f64) = (0.0, 0.0, 255.0);

fn bgr(color: (f64, f64, f64)) -> Scalar {
    Scalar::new(color.0, color.1, color.2, 0.0)
}

fn draw_text(frame: &mut Mat, text: &str, origin: Point, scale: f64, color: Scalar) -> Result<()> {
    put_text(
        frame,
        text,
        origin,
        FONT_HERSHEY_SIMPLEX,
        scale,
        color,
        2,
        LINE_8,
        false,
    )?;
    Ok(())
}

/// Draws a green box and a "Pothole 0.87" label for each detection.
pub fn draw_detections(frame: &mut Mat, detections: &[Detection]) -> Result<()> {
    for d in detections {
        let (x1, y1, x2, y2) = d.bbox.corners();
        let rect = Rect::new(x1, y1, x2 - x1, y2 - y1);
        rectangle(frame, rect, bgr(GREEN), 2, LINE_8, 0)?;

        // Keep the label inside the frame for boxes touching the top edge
        let label_origin = Point::new(x1, (y1 - 10).max(20));
        draw_text(
            frame,
            &format!("Pothole {:.2}", d.confidence),
            label_origin,
            0.6,
            bgr(GREEN),
        )?;
    }
    Ok(())
}

/// Writes the GPS line in the bottom-left corner.
pub fn draw_gps(frame: &mut Mat, text: &str) -> Result<()> {
    let height = frame.rows();
    draw_text(frame, text, Point::new(10, height - 10), 0.6, bgr(WHITE))
}

pub fn draw_no_detections(frame: &mut Mat) -> Result<()> {
    draw_text(
        frame,
        "No potholes detected",
        Point::new(20, 40),
        0.7,
        bgr(RED),
    )
}

/// Decodes an uploaded image. Returns `None` if the bytes are not an image OpenCV can read.
pub fn decode_image(bytes: &[u8]) -> Option<Mat> {
    if bytes.is_empty() {
        return None;
    }
    let buf = Vector::<u8>::from_slice(bytes);
    match opencv::imgcodecs::imdecode(&buf, opencv::imgcodecs::IMREAD_COLOR) {
        Ok(mat) if !mat.empty() => Some(mat),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!("imdecode failed: {}", e);
            None
        }
    }
}

pub fn encode_jpeg(frame: &Mat) -> Result<Vec<u8>> {
    let mut buf = Vector::<u8>::new();
    let ok = opencv::imgcodecs::imencode(".jpg", frame, &mut buf, &Vector::new())?;
    if !ok {
        return Err(anyhow!("JPEG encoding failed"));
    }
    Ok(buf.to_vec())
}

pub fn encode_base64_jpeg(frame: &Mat) -> Result<String> {
    Ok(STANDARD.encode(encode_jpeg(frame)?))
}
