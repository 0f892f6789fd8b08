//! Region model
//!
//! A [`RegionContext`] is an immutable geodetic bounding box together with
//! everything derived from it: the UTM working frame, the projected extent,
//! approximate kilometer dimensions and a tiling into sub-regions.

mod types;
pub mod utm;

pub use types::{
    ProjectedBounds, RegionError, UtmZone, KM_PER_DEGREE, MAX_LAT, MAX_LON, MAX_TILES, MIN_LAT,
    MIN_LON,
};

use std::fmt;
use std::str::FromStr;

/// Geodetic (WGS84) bounding box of a request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionContext {
    lat_min: f64,
    lat_max: f64,
    lon_min: f64,
    lon_max: f64,
}

impl RegionContext {
    /// Creates a region, validating ranges and ordering.
    ///
    /// # Errors
    ///
    /// Returns a [`RegionError`] when a bound is out of range, not a number,
    /// or when a minimum is not strictly below its maximum.
    pub fn new(lat_min: f64, lat_max: f64, lon_min: f64, lon_max: f64) -> Result<Self, RegionError> {
        for lat in [lat_min, lat_max] {
            if !(MIN_LAT..=MAX_LAT).contains(&lat) {
                return Err(RegionError::InvalidLatitude(lat));
            }
        }
        for lon in [lon_min, lon_max] {
            if !(MIN_LON..=MAX_LON).contains(&lon) {
                return Err(RegionError::InvalidLongitude(lon));
            }
        }
        if lat_min >= lat_max {
            return Err(RegionError::Inverted {
                axis: "latitude",
                min: lat_min,
                max: lat_max,
            });
        }
        if lon_min >= lon_max {
            return Err(RegionError::Inverted {
                axis: "longitude",
                min: lon_min,
                max: lon_max,
            });
        }

        Ok(Self {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
        })
    }

    pub fn lat_min(&self) -> f64 {
        self.lat_min
    }

    pub fn lat_max(&self) -> f64 {
        self.lat_max
    }

    pub fn lon_min(&self) -> f64 {
        self.lon_min
    }

    pub fn lon_max(&self) -> f64 {
        self.lon_max
    }

    /// Bounds as `(lat_min, lat_max, lon_min, lon_max)`.
    pub fn as_tuple(&self) -> (f64, f64, f64, f64) {
        (self.lat_min, self.lat_max, self.lon_min, self.lon_max)
    }

    /// Center of the box as `(lat, lon)`.
    pub fn centroid(&self) -> (f64, f64) {
        (
            (self.lat_min + self.lat_max) / 2.0,
            (self.lon_min + self.lon_max) / 2.0,
        )
    }

    /// UTM zone containing the centroid.
    pub fn utm_zone(&self) -> UtmZone {
        let (lat, lon) = self.centroid();
        UtmZone::for_position(lat, lon)
    }

    /// EPSG code of the region's UTM working frame.
    pub fn epsg(&self) -> u32 {
        self.utm_zone().epsg()
    }

    /// Projects a geodetic position into the region's UTM zone.
    pub fn to_projected(&self, lat: f64, lon: f64) -> (f64, f64) {
        utm::forward(lat, lon, self.utm_zone())
    }

    /// Inverse of [`RegionContext::to_projected`].
    pub fn from_projected(&self, x: f64, y: f64) -> (f64, f64) {
        utm::inverse(x, y, self.utm_zone())
    }

    /// Projected extent of the region.
    ///
    /// All four corners are transformed: meridian convergence means two
    /// opposite corners alone under-estimate the extent.
    pub fn projected_bbox(&self) -> ProjectedBounds {
        let zone = self.utm_zone();
        let corners = [
            (self.lat_min, self.lon_min),
            (self.lat_min, self.lon_max),
            (self.lat_max, self.lon_min),
            (self.lat_max, self.lon_max),
        ];

        let mut bounds = ProjectedBounds {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        };
        for (lat, lon) in corners {
            let (x, y) = utm::forward(lat, lon, zone);
            bounds.min_x = bounds.min_x.min(x);
            bounds.min_y = bounds.min_y.min(y);
            bounds.max_x = bounds.max_x.max(x);
            bounds.max_y = bounds.max_y.max(y);
        }
        bounds
    }

    /// Approximate east-west extent in kilometers.
    pub fn width_km(&self) -> f64 {
        let (lat, _) = self.centroid();
        (self.lon_max - self.lon_min) * KM_PER_DEGREE * lat.to_radians().cos()
    }

    /// Approximate north-south extent in kilometers.
    pub fn height_km(&self) -> f64 {
        (self.lat_max - self.lat_min) * KM_PER_DEGREE
    }

    /// Approximate area in square kilometers.
    pub fn area_km2(&self) -> f64 {
        self.width_km() * self.height_km()
    }

    /// Subdivides the region into tiles of roughly `tile_km` on a side.
    ///
    /// Tiles are produced row by row from the south-west corner. The last
    /// row and column are clamped to the region's bounds, so every tile is
    /// nested within the parent and together they cover it.
    ///
    /// Fails with [`RegionError::InvalidTileSize`] for a non-positive size
    /// or one that would produce more than [`MAX_TILES`] tiles.
    pub fn get_tiles(&self, tile_km: f64) -> Result<Vec<RegionContext>, RegionError> {
        if !tile_km.is_finite() || tile_km <= 0.0 {
            return Err(RegionError::InvalidTileSize(tile_km));
        }

        let (lat_c, _) = self.centroid();
        let lat_step = tile_km / KM_PER_DEGREE;
        let lon_step = tile_km / (KM_PER_DEGREE * lat_c.to_radians().cos());

        let rows = ((self.lat_max - self.lat_min) / lat_step).ceil();
        let cols = ((self.lon_max - self.lon_min) / lon_step).ceil();
        if !(rows * cols).is_finite() || rows * cols > MAX_TILES as f64 {
            return Err(RegionError::InvalidTileSize(tile_km));
        }

        let lat_edges =
            steps(self.lat_min, self.lat_max, lat_step).ok_or(RegionError::InvalidTileSize(tile_km))?;
        let lon_edges =
            steps(self.lon_min, self.lon_max, lon_step).ok_or(RegionError::InvalidTileSize(tile_km))?;

        let mut tiles = Vec::with_capacity(lat_edges.len() * lon_edges.len());
        for &(south, north) in &lat_edges {
            for &(west, east) in &lon_edges {
                tiles.push(RegionContext::new(south, north, west, east)?);
            }
        }
        Ok(tiles)
    }
}

/// Splits `[min, max]` into consecutive intervals of `step`, clamping the
/// last one. Remainders below float noise do not produce a sliver.
///
/// Returns `None` when `step` is too small to advance past a bound.
fn steps(min: f64, max: f64, step: f64) -> Option<Vec<(f64, f64)>> {
    let epsilon = step * 1e-9;
    let mut edges = Vec::new();
    let mut start = min;
    while max - start > epsilon {
        let mut end = (start + step).min(max);
        if end <= start {
            return None;
        }
        if max - end <= epsilon {
            end = max;
        }
        edges.push((start, end));
        start = end;
    }
    Some(edges)
}

impl fmt::Display for RegionContext {
    /// Canonical text form: `lat_min,lon_min,lat_max,lon_max`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.lat_min, self.lon_min, self.lat_max, self.lon_max
        )
    }
}

impl FromStr for RegionContext {
    type Err = RegionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values: Vec<f64> = s
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| RegionError::Parse(s.to_string()))?;

        match values.as_slice() {
            [lat_min, lon_min, lat_max, lon_max] => {
                RegionContext::new(*lat_min, *lat_max, *lon_min, *lon_max)
            }
            _ => Err(RegionError::Parse(s.to_string())),
        }
    }
}
