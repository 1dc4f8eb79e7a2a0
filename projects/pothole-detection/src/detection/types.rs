// Detection result types shared by the web, batch and live paths.

use serde::{Deserialize, Serialize};

/// Bounding box in pixel coordinates of the source image
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BBox {
    pub fn from_xyxy(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x: x1,
            y: y1,
            w: x2 - x1,
            h: y2 - y1,
        }
    }

    /// Integer corners `(x1, y1, x2, y2)`, truncated the same way the drawing code expects.
    pub fn corners(&self) -> (i32, i32, i32, i32) {
        (
            self.x as i32,
            self.y as i32,
            (self.x + self.w) as i32,
            (self.y + self.h) as i32,
        )
    }
}

/// A single detected pothole
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Detection {
    pub bbox: BBox,
    pub confidence: f32,
    pub class_id: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}
