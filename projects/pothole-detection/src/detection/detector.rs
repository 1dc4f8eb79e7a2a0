use crate::detection::types::{BBox, Detection};
use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, ImageBuffer, Rgb};
use opencv::core::Mat;
use opencv::prelude::*;
use std::path::Path;
use usls::models::YOLO;
use usls::{Config, Image, Task};

/// Anything that can turn a BGR frame into pothole detections.
pub trait Detector: Send {
    fn detect(&mut self, image: &Mat) -> Result<Vec<Detection>>;
}

/// A wrapper around the USLS YOLO model that handles BGR-to-RGB conversion
/// and confidence filtering.
pub struct PotholeDetector {
    model: YOLO,
    min_conf: f32,
}

impl PotholeDetector {
    /// Create a new detector with the given ONNX model path.
    pub fn new(model_path: &str, min_conf: f32) -> Result<Self> {
        if !Path::new(model_path).exists() {
            return Err(anyhow!("Model file not found: {}", model_path));
        }

        let config = Config::yolo()
            .with_model_file(model_path)
            .with_task(Task::ObjectDetection)
            .with_class_confs(&[min_conf]);

        #[cfg(target_os = "macos")]
        let config = config.with_model_device(usls::Device::CoreMl);

        let config = config
            .commit()
            .with_context(|| format!("Invalid model config for {}", model_path))?;
        let model =
            YOLO::new(config).with_context(|| format!("Failed to load model {}", model_path))?;

        tracing::info!("Loaded detection model {} (conf >= {:.2})", model_path, min_conf);
        Ok(Self { model, min_conf })
    }
}

impl Detector for PotholeDetector {
    fn detect(&mut self, image: &Mat) -> Result<Vec<Detection>> {
        let dynamic_image = mat_to_dynamic_image(image)?;
        let results = self.model.forward(&[Image::from(dynamic_image)])?;

        let detections = results
            .into_iter()
            .next()
            .map(|y| y.hbbs)
            .unwrap_or_default()
            .into_iter()
            .filter(|hbb| hbb.confidence().unwrap_or(0.0) >= self.min_conf)
            .map(|hbb| Detection {
                bbox: BBox {
                    x: hbb.xmin(),
                    y: hbb.ymin(),
                    w: hbb.width(),
                    h: hbb.height(),
                },
                confidence: hbb.confidence().unwrap_or(0.0),
                class_id: hbb.id().unwrap_or(0),
                class_name: hbb.name().map(|s| s.to_string()),
            })
            .collect();

        Ok(detections)
    }
}

/// Convert an OpenCV Mat (BGR) to an image::DynamicImage (RGB)
fn mat_to_dynamic_image(mat: &Mat) -> Result<DynamicImage> {
    let mut rgb_mat = Mat::default();
    opencv::imgproc::cvt_color_def(mat, &mut rgb_mat, opencv::imgproc::COLOR_BGR2RGB)?;

    let size = rgb_mat.size()?;
    let width = size.width as u32;
    let height = size.height as u32;

    if !rgb_mat.is_continuous() {
        return Err(anyhow!("Mat is not continuous"));
    }

    let buffer = rgb_mat.data_bytes()?.to_vec();

    let img_buffer = ImageBuffer::<Rgb<u8>, _>::from_vec(width, height, buffer)
        .ok_or_else(|| anyhow!("Failed to create ImageBuffer from Mat data"))?;

    Ok(DynamicImage::ImageRgb8(img_buffer))
}

#[cfg(test)]
pub mod testing {
    use super::*;

    /// Detector returning the same detections for every frame.
    pub struct FixedDetector {
        pub detections: Vec<Detection>,
        pub calls: usize,
    }

    impl FixedDetector {
        pub fn new(detections: Vec<Detection>) -> Self {
            Self {
                detections,
                calls: 0,
            }
        }
    }

    impl Detector for FixedDetector {
        fn detect(&mut self, _image: &Mat) -> Result<Vec<Detection>> {
            self.calls += 1;
            Ok(self.detections.clone())
        }
    }

    pub fn pothole(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> Detection {
        Detection {
            bbox: BBox::from_xyxy(x1, y1, x2, y2),
            confidence,
            class_id: 0,
            class_name: Some("pothole".to_string()),
        }
    }
}
