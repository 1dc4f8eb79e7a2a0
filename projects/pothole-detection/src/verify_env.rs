// Environment check: can we load OpenCV, the model, and reach the geolocation service?

use crate::detection::PotholeDetector;
use crate::geolocation::Locator;
use std::fmt;

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok(String),
    Failed(String),
}

#[derive(Debug)]
pub struct Check {
    pub name: &'static str,
    pub status: CheckStatus,
    /// A failed required check makes the whole verification fail
    pub required: bool,
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            CheckStatus::Ok(detail) => write!(f, "[ok]   {}: {}", self.name, detail),
            CheckStatus::Failed(reason) => write!(f, "[FAIL] {}: {}", self.name, reason),
        }
    }
}

pub fn run_checks(model_path: &str, locator: &dyn Locator) -> Vec<Check> {
    let opencv_status = match opencv::core::get_version_string() {
        Ok(v) => CheckStatus::Ok(v),
        Err(e) => CheckStatus::Failed(e.to_string()),
    };

    let model_status = match PotholeDetector::new(model_path, 0.25) {
        Ok(_) => CheckStatus::Ok(format!("{} loaded successfully", model_path)),
        Err(e) => CheckStatus::Failed(format!("{:#}", e)),
    };

    let geo_status = match locator.locate() {
        Ok(fix) => CheckStatus::Ok(format!("{:.5}, {:.5}", fix.lat, fix.lon)),
        Err(e) => CheckStatus::Failed(format!("{:#}", e)),
    };

    vec![
        Check {
            name: "pothole-detection",
            status: CheckStatus::Ok(env!("CARGO_PKG_VERSION").to_string()),
            required: true,
        },
        Check {
            name: "OpenCV",
            status: opencv_status,
            required: true,
        },
        Check {
            name: "Model",
            status: model_status,
            required: true,
        },
        Check {
            name: "IP geolocation",
            status: geo_status,
            required: false,
        },
    ]
}

pub fn all_required_passed(checks: &[Check]) -> bool {
    checks
        .iter()
        .filter(|c| c.required)
        .all(|c| matches!(c.status, CheckStatus::Ok(_)))
}
