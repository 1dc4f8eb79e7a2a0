// Approximate location lookup from the caller's public IP address.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_GEO_URL: &str = "https://ipinfo.io/json";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct GeoFix {
    pub lat: f64,
    pub lon: f64,
}

pub trait Locator: Send + Sync {
    fn locate(&self) -> Result<GeoFix>;
}

/// Looks up the location of this machine's public IP through a JSON HTTP service.
pub struct IpLocator {
    agent: ureq::Agent,
    url: String,
}

impl IpLocator {
    pub fn new(url: &str) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(LOOKUP_TIMEOUT).build();
        Self {
            agent,
            url: url.to_string(),
        }
    }
}

impl Locator for IpLocator {
    fn locate(&self) -> Result<GeoFix> {
        let body: Value = self
            .agent
            .get(&self.url)
            .call()
            .with_context(|| format!("Geolocation request to {} failed", self.url))?
            .into_json()
            .context("Geolocation response is not JSON")?;

        parse_fix(&body)
    }
}

/// Extracts coordinates from the common IP-geolocation response shapes:
/// ipinfo's `"loc": "lat,lon"`, or numeric `latitude`/`longitude` or `lat`/`lon`.
pub fn parse_fix(body: &Value) -> Result<GeoFix> {
    if let Some(loc) = body.get("loc").and_then(Value::as_str) {
        let (lat, lon) = loc
            .split_once(',')
            .ok_or_else(|| anyhow!("Malformed loc field: {}", loc))?;
        return Ok(GeoFix {
            lat: lat.trim().parse().context("Invalid latitude")?,
            lon: lon.trim().parse().context("Invalid longitude")?,
        });
    }

    for (lat_key, lon_key) in [("latitude", "longitude"), ("lat", "lon")] {
        if let (Some(lat), Some(lon)) = (
            body.get(lat_key).and_then(Value::as_f64),
            body.get(lon_key).and_then(Value::as_f64),
        ) {
            return Ok(GeoFix { lat, lon });
        }
    }

    Err(anyhow!("No coordinates in geolocation response"))
}

/// Runs a lookup, turning any failure into `None` with a warning.
pub fn locate_or_none(locator: &dyn Locator) -> Option<GeoFix> {
    match locator.locate() {
        Ok(fix) => {
            tracing::debug!("Located at {:.5}, {:.5}", fix.lat, fix.lon);
            Some(fix)
        }
        Err(e) => {
            tracing::warn!("Unable to fetch GPS coordinates: {:#}", e);
            None
        }
    }
}

/// Overlay text for an optional fix.
pub fn gps_text(fix: Option<GeoFix>) -> String {
    match fix {
        Some(f) => format!("Lat: {:.5}, Lon: {:.5}", f.lat, f.lon),
        None => "GPS: Unknown".to_string(),
    }
}
