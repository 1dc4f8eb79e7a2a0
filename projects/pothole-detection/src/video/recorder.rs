use super::FrameSink;
use anyhow::{anyhow, Context, Result};
use opencv::core::{Mat, Size};
use opencv::prelude::*;
use opencv::videoio::VideoWriter;
use std::fs;
use std::path::{Path, PathBuf};

/// Writes annotated frames to an XVID AVI file.
pub struct VideoRecorder {
    writer: VideoWriter,
    size: Size,
    path: PathBuf,
    frames_written: usize,
}

impl VideoRecorder {
    pub fn create(path: &Path, fps: f64, width: i32, height: i32) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("Non UTF-8 output path: {:?}", path))?;

        let fourcc = VideoWriter::fourcc('X', 'V', 'I', 'D')?;
        let size = Size::new(width, height);
        let writer = VideoWriter::new(path_str, fourcc, fps, size, true)?;
        if !writer.is_opened()? {
            return Err(anyhow!("Failed to open video writer for {}", path_str));
        }

        Ok(Self {
            writer,
            size,
            path: path.to_path_buf(),
            frames_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> usize {
        self.frames_written
    }
}

impl FrameSink for VideoRecorder {
    fn write(&mut self, frame: &Mat) -> Result<()> {
        // The writer silently drops frames of the wrong size
        if frame.size()? != self.size {
            let mut resized = Mat::default();
            opencv::imgproc::resize(
                frame,
                &mut resized,
                self.size,
                0.0,
                0.0,
                opencv::imgproc::INTER_LINEAR,
            )?;
            self.writer.write(&resized)?;
        } else {
            self.writer.write(frame)?;
        }
        self.frames_written += 1;
        Ok(())
    }
}

impl Drop for VideoRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.writer.release() {
            tracing::warn!("Failed to finalize {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_8UC3};

    #[test]
    fn test_recorder_creates_parents_and_resizes_frames() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a").join("b").join("out.avi");

        let mut recorder = match VideoRecorder::create(&path, 10.0, 64, 48) {
            Ok(recorder) => recorder,
            // XVID support depends on the host's OpenCV build
            Err(e) => {
                eprintln!("skipping, no XVID writer: {:#}", e);
                return;
            }
        };
        assert!(tmp.path().join("a").join("b").is_dir());
        assert_eq!(recorder.path(), path.as_path());

        let exact = Mat::new_rows_cols_with_default(48, 64, CV_8UC3, Scalar::all(80.0)).unwrap();
        let oversized =
            Mat::new_rows_cols_with_default(80, 100, CV_8UC3, Scalar::all(160.0)).unwrap();
        recorder.write(&exact).unwrap();
        recorder.write(&oversized).unwrap();
        assert_eq!(recorder.frames_written(), 2);

        drop(recorder);
        assert!(fs::metadata(&path).unwrap().len() > 0);
    }
}
