// Model inference and frame annotation

pub mod annotate;
pub mod detector;
pub mod types;

pub use detector::{Detector, PotholeDetector};
pub use types::Detection;
