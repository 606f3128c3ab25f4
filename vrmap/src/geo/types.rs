//! Geographic value types shared by the transform, the channel and the config.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest absolute latitude accepted for a scene origin.
///
/// The local tangent plane degenerates at the poles (the east-west scale
/// factor `cos(lat)` reaches zero), so origins are kept just short of them.
pub const MAX_ORIGIN_LAT: f64 = 89.9;

/// Errors produced by the geographic transform.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeoError {
    /// A transform was requested before any scene origin was set.
    #[error("Scene origin has not been set")]
    OriginNotSet,

    #[error("Invalid latitude: {0} (must be within ±{max})", max = MAX_ORIGIN_LAT)]
    InvalidLatitude(f64),

    #[error("Invalid longitude: {0} (must be -180.0 to 180.0)")]
    InvalidLongitude(f64),

    /// An input coordinate was NaN or infinite.
    #[error("Non-finite coordinate in {0}")]
    NonFinite(&'static str),

    /// A named preset was not found among the configured presets.
    #[error("Unknown location preset '{0}'")]
    UnknownPreset(String),

    /// The device could not report its location.
    #[error("Device location is unavailable")]
    LocationUnavailable,
}

/// A geographic point in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Validate this point for use as a scene origin.
    pub fn validate(&self) -> Result<(), GeoError> {
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(GeoError::NonFinite("origin"));
        }
        if !(-MAX_ORIGIN_LAT..=MAX_ORIGIN_LAT).contains(&self.latitude) {
            return Err(GeoError::InvalidLatitude(self.latitude));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(GeoError::InvalidLongitude(self.longitude));
        }
        Ok(())
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// Camera position in geographic terms.
///
/// Derived from the camera pose every time it changes; never persisted.
/// `heading` is always within `[0, 360)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub heading: f64,
}

impl GeoPosition {
    /// The position without its heading.
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// The geographic point mapped to scene-space `(0, 0, 0)`.
///
/// Only [`super::GeoTransform::set_origin`] creates one, after validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneOrigin {
    point: GeoPoint,
    /// `cos(latitude)`, the east-west scale factor of the tangent plane.
    lon_scale: f64,
}

impl SceneOrigin {
    pub(super) fn new(point: GeoPoint) -> Self {
        Self {
            point,
            lon_scale: point.latitude.to_radians().cos(),
        }
    }

    pub fn point(&self) -> GeoPoint {
        self.point
    }

    pub(super) fn lon_scale(&self) -> f64 {
        self.lon_scale
    }
}

/// A named geographic center offered to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationPreset {
    pub title: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl LocationPreset {
    pub fn new(title: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            title: title.into(),
            latitude,
            longitude,
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Reports the device's current geographic location.
///
/// Implemented by the host platform; the core only asks for a fix when a
/// scene is centered on the device.
pub trait LocationProvider {
    fn current_location(&self) -> Option<GeoPoint>;
}

/// Where a new scene should be centered.
#[derive(Debug, Clone, PartialEq)]
pub enum CenterSource {
    /// Explicit latitude/longitude.
    Point(GeoPoint),
    /// A configured preset, looked up by title (case-insensitive).
    Preset(String),
    /// Whatever the [`LocationProvider`] reports.
    DeviceLocation,
}

impl CenterSource {
    /// Resolve this source into a concrete point.
    pub fn resolve(
        &self,
        presets: &[LocationPreset],
        location: Option<&dyn LocationProvider>,
    ) -> Result<GeoPoint, GeoError> {
        match self {
            CenterSource::Point(point) => Ok(*point),
            CenterSource::Preset(name) => presets
                .iter()
                .find(|p| p.title.eq_ignore_ascii_case(name))
                .map(LocationPreset::point)
                .ok_or_else(|| GeoError::UnknownPreset(name.clone())),
            CenterSource::DeviceLocation => location
                .and_then(|provider| provider.current_location())
                .ok_or(GeoError::LocationUnavailable),
        }
    }
}

impl From<GeoPoint> for CenterSource {
    fn from(point: GeoPoint) -> Self {
        CenterSource::Point(point)
    }
}

impl From<&LocationPreset> for CenterSource {
    fn from(preset: &LocationPreset) -> Self {
        CenterSource::Point(preset.point())
    }
}
