//! Scene ↔ geography transform.
//!
//! The scene is a local tangent plane centered on a [`SceneOrigin`]. Scene
//! axes follow the usual VR convention:
//!
//! ```text
//!   +y up
//!    │  -z north
//!    │ ╱
//!    │╱
//!    └──── +x east
//! ```
//!
//! Positions are converted with an equirectangular projection about the
//! origin, which is accurate to well under a meter for the few kilometers a
//! walking viewer covers between scene reloads.
//!
//! # Example
//!
//! ```
//! use glam::DVec3;
//! use vrmap::geo::{GeoPoint, GeoTransform};
//!
//! let mut transform = GeoTransform::new();
//! transform.set_origin(GeoPoint::new(40.0, -74.0)).unwrap();
//!
//! let pos = transform.to_geo(DVec3::ZERO, DVec3::ZERO).unwrap();
//! assert_eq!((pos.latitude, pos.longitude, pos.heading), (40.0, -74.0, 0.0));
//! ```

mod types;

pub use types::{
    CenterSource, GeoError, GeoPoint, GeoPosition, LocationPreset, LocationProvider, SceneOrigin,
    MAX_ORIGIN_LAT,
};

use glam::DVec3;

/// Earth radius in meters (WGS84 mean).
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Reduce an angle in degrees into `[0, 360)`.
///
/// Works for negative angles and for angles beyond one full turn.
#[inline]
pub fn normalize_heading(degrees: f64) -> f64 {
    let heading = degrees.rem_euclid(360.0);
    // rem_euclid rounds tiny negative inputs up to exactly 360.0
    if heading >= 360.0 {
        0.0
    } else {
        heading
    }
}

/// Wrap a longitude into `[-180, 180)`.
#[inline]
fn wrap_longitude(lon: f64) -> f64 {
    if (-180.0..180.0).contains(&lon) {
        lon
    } else {
        (lon + 180.0).rem_euclid(360.0) - 180.0
    }
}

fn ensure_finite(v: DVec3, what: &'static str) -> Result<(), GeoError> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(GeoError::NonFinite(what))
    }
}

/// Converts between scene space and geographic coordinates.
///
/// Holds at most one [`SceneOrigin`], replaced on every scene load.
#[derive(Debug, Clone, Default)]
pub struct GeoTransform {
    origin: Option<SceneOrigin>,
}

impl GeoTransform {
    /// Create a transform with no origin.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the scene origin for a new scene.
    pub fn set_origin(&mut self, center: GeoPoint) -> Result<SceneOrigin, GeoError> {
        center.validate()?;
        let origin = SceneOrigin::new(center);
        self.origin = Some(origin);
        tracing::info!(origin = %center, "Scene origin set");
        Ok(origin)
    }

    /// The current origin, if any.
    pub fn origin(&self) -> Option<&SceneOrigin> {
        self.origin.as_ref()
    }

    /// Convert a scene-space camera pose into a geographic position.
    ///
    /// `world_rotation` is in degrees; only its `y` (yaw) component feeds the
    /// heading.
    pub fn to_geo(
        &self,
        world_position: DVec3,
        world_rotation: DVec3,
    ) -> Result<GeoPosition, GeoError> {
        let origin = self.origin.as_ref().ok_or(GeoError::OriginNotSet)?;
        ensure_finite(world_position, "camera position")?;
        ensure_finite(world_rotation, "camera rotation")?;

        let center = origin.point();
        let north_m = -world_position.z;
        let east_m = world_position.x;

        let latitude = center.latitude + (north_m / EARTH_RADIUS_M).to_degrees();
        let longitude = center.longitude
            + (east_m / (EARTH_RADIUS_M * origin.lon_scale())).to_degrees();

        Ok(GeoPosition {
            latitude,
            longitude: wrap_longitude(longitude),
            heading: normalize_heading(world_rotation.y),
        })
    }

    /// Convert a geographic point into scene space at ground level (`y = 0`).
    pub fn to_world(&self, point: GeoPoint) -> Result<DVec3, GeoError> {
        let origin = self.origin.as_ref().ok_or(GeoError::OriginNotSet)?;
        if !point.latitude.is_finite() || !point.longitude.is_finite() {
            return Err(GeoError::NonFinite("geographic point"));
        }

        let center = origin.point();
        let d_lon = wrap_longitude(point.longitude - center.longitude);
        let east_m = d_lon.to_radians() * EARTH_RADIUS_M * origin.lon_scale();
        let north_m = (point.latitude - center.latitude).to_radians() * EARTH_RADIUS_M;

        Ok(DVec3::new(east_m, 0.0, -north_m))
    }
}
