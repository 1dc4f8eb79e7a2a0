pub mod capture;
pub mod recorder;

use anyhow::Result;
use opencv::core::Mat;

pub trait FrameSource: Send {
    /// Returns `Ok(None)` once the source has no more frames.
    fn next_frame(&mut self) -> Result<Option<Mat>>;
    fn frame_size(&self) -> (i32, i32);
}

pub trait FrameSink {
    fn write(&mut self, frame: &Mat) -> Result<()>;
}
