//! Web Mercator tile math for the tile-grid producer.

use std::collections::BTreeSet;
use std::f64::consts::PI;
use std::fmt;

use serde_json::{json, Value};

use crate::geo::GeoPoint;

/// Maximum latitude representable in Web Mercator.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_78;

/// A Web Mercator tile.
///
/// Ordered by zoom, then row, then column, so tile sets iterate north-west
/// to south-east.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub zoom: u8,
    pub row: u32,
    pub col: u32,
}

impl TileCoord {
    /// Tile containing `point`. Latitudes beyond the Mercator limit are
    /// clamped to the edge row.
    pub fn containing(point: GeoPoint, zoom: u8) -> Self {
        let n = tiles_per_side(zoom);
        let lat = point.latitude.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);

        let col = ((point.longitude + 180.0) / 360.0 * n as f64).floor() as i64;
        let lat_rad = lat.to_radians();
        let row = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n as f64).floor() as i64;

        Self {
            zoom,
            row: row.clamp(0, n - 1) as u32,
            col: col.rem_euclid(n) as u32,
        }
    }

    /// North-west corner of the tile.
    pub fn north_west(&self) -> GeoPoint {
        let n = tiles_per_side(self.zoom) as f64;
        let longitude = self.col as f64 / n * 360.0 - 180.0;
        let y = self.row as f64 / n;
        let latitude = (PI * (1.0 - 2.0 * y)).sinh().atan().to_degrees();
        GeoPoint::new(latitude, longitude)
    }

    /// Feature id in `zoom/col/row` form.
    pub fn feature_id(&self) -> String {
        self.to_string()
    }

    /// Feature payload sent with `add` events.
    pub fn to_feature(&self) -> Value {
        let corner = self.north_west();
        json!({
            "zoom": self.zoom,
            "row": self.row,
            "col": self.col,
            "latitude": corner.latitude,
            "longitude": corner.longitude,
        })
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.col, self.row)
    }
}

fn tiles_per_side(zoom: u8) -> i64 {
    1_i64 << zoom
}

/// Tiles within `radius` tiles of `center` (a square of side `2 * radius + 1`).
///
/// Columns wrap across the antimeridian; rows stop at the poles.
pub fn tiles_around(center: TileCoord, radius: u32) -> BTreeSet<TileCoord> {
    let n = tiles_per_side(center.zoom);
    let r = i64::from(radius).min(n / 2);
    let mut tiles = BTreeSet::new();

    for dr in -r..=r {
        let row = i64::from(center.row) + dr;
        if !(0..n).contains(&row) {
            continue;
        }
        for dc in -r..=r {
            let col = (i64::from(center.col) + dc).rem_euclid(n);
            tiles.insert(TileCoord {
                zoom: center.zoom,
                row: row as u32,
                col: col as u32,
            });
        }
    }
    tiles
}
