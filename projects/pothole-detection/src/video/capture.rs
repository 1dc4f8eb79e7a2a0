use super::FrameSource;
use anyhow::{anyhow, Result};
use opencv::{
    prelude::*,
    videoio::{
        VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_COUNT, CAP_PROP_FRAME_HEIGHT,
        CAP_PROP_FRAME_WIDTH,
    },
};
use std::path::Path;

/// Frames from a camera device or a video file, read through OpenCV.
pub struct CaptureSource {
    capture: VideoCapture,
    width: i32,
    height: i32,
}

impl CaptureSource {
    /// Opens a camera and asks for the given resolution. The driver may pick another one;
    /// `frame_size` reports what it actually delivers.
    pub fn camera(index: i32, width: i32, height: i32) -> Result<Self> {
        let mut capture = VideoCapture::new(index, CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(anyhow!("Failed to open camera {}", index));
        }

        capture.set(CAP_PROP_FRAME_WIDTH, width as f64)?;
        capture.set(CAP_PROP_FRAME_HEIGHT, height as f64)?;

        let actual_w = capture.get(CAP_PROP_FRAME_WIDTH)? as i32;
        let actual_h = capture.get(CAP_PROP_FRAME_HEIGHT)? as i32;
        if (actual_w, actual_h) != (width, height) {
            tracing::warn!(
                "Camera {} delivers {}x{} instead of requested {}x{}",
                index,
                actual_w,
                actual_h,
                width,
                height
            );
        }
        tracing::info!("CaptureSource: opened camera {} at {}x{}", index, actual_w, actual_h);

        Ok(Self {
            capture,
            width: if actual_w > 0 { actual_w } else { width },
            height: if actual_h > 0 { actual_h } else { height },
        })
    }

    pub fn file(path: &Path) -> Result<Self> {
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("Non UTF-8 video path: {:?}", path))?;
        if !path.exists() {
            return Err(anyhow!("Video file not found: {}", path_str));
        }

        let capture = VideoCapture::from_file(path_str, CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(anyhow!("Failed to open video file: {}", path_str));
        }

        let fps = capture.get(CAP_PROP_FPS)?;
        let frames = capture.get(CAP_PROP_FRAME_COUNT)? as usize;
        let width = capture.get(CAP_PROP_FRAME_WIDTH)? as i32;
        let height = capture.get(CAP_PROP_FRAME_HEIGHT)? as i32;
        tracing::info!(
            "CaptureSource: opened {}, {}x{}, fps={:.2}, frames={}",
            path_str,
            width,
            height,
            fps,
            frames
        );

        Ok(Self {
            capture,
            width,
            height,
        })
    }
}

impl FrameSource for CaptureSource {
    fn next_frame(&mut self) -> Result<Option<Mat>> {
        let mut frame = Mat::default();
        let success = self.capture.read(&mut frame)?;
        if !success || frame.empty() {
            return Ok(None);
        }
        Ok(Some(frame))
    }

    fn frame_size(&self) -> (i32, i32) {
        (self.width, self.height)
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        if let Err(e) = self.capture.release() {
            tracing::warn!("Failed to release capture: {}", e);
        }
    }
}
