//! Region type definitions

use std::fmt;
use thiserror::Error;

/// Valid latitude range (WGS84)
pub const MIN_LAT: f64 = -90.0;
pub const MAX_LAT: f64 = 90.0;

/// Valid longitude range (WGS84)
pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// Kilometers per degree of latitude on the spherical approximation.
pub const KM_PER_DEGREE: f64 = 111.32;

/// Upper bound on the number of tiles `get_tiles` will produce.
pub const MAX_TILES: usize = 1_000_000;

/// Errors raised while constructing or subdividing a region.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegionError {
    #[error("Invalid latitude: {0} (must be within -90..=90)")]
    InvalidLatitude(f64),

    #[error("Invalid longitude: {0} (must be within -180..=180)")]
    InvalidLongitude(f64),

    #[error("Inverted {axis} bounds: min {min} must be less than max {max}")]
    Inverted {
        axis: &'static str,
        min: f64,
        max: f64,
    },

    #[error("Invalid tile size: {0} km (must be positive and yield at most 1000000 tiles)")]
    InvalidTileSize(f64),

    #[error("Cannot parse region '{0}': expected 'lat_min,lon_min,lat_max,lon_max'")]
    Parse(String),
}

/// A UTM zone with hemisphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UtmZone {
    /// Zone number (1-60)
    pub number: u8,
    /// True for the northern hemisphere
    pub north: bool,
}

impl UtmZone {
    /// Zone for a geodetic position.
    ///
    /// The zone number is `floor((lon + 180) / 6) + 1`, with lon = 180
    /// folded into zone 60.
    pub fn for_position(lat: f64, lon: f64) -> Self {
        let number = (((lon + 180.0) / 6.0).floor() as i64 + 1).clamp(1, 60) as u8;
        Self {
            number,
            north: lat >= 0.0,
        }
    }

    /// EPSG code of the WGS84 / UTM system for this zone.
    pub fn epsg(&self) -> u32 {
        if self.north {
            32600 + self.number as u32
        } else {
            32700 + self.number as u32
        }
    }

    /// Resolves a WGS84 / UTM EPSG code (326xx or 327xx).
    pub fn from_epsg(code: u32) -> Option<Self> {
        let (north, number) = match code {
            32601..=32660 => (true, code - 32600),
            32701..=32760 => (false, code - 32700),
            _ => return None,
        };
        Some(Self {
            number: number as u8,
            north,
        })
    }

    /// Longitude of the zone's central meridian in degrees.
    pub fn central_meridian(&self) -> f64 {
        self.number as f64 * 6.0 - 183.0
    }
}

impl fmt::Display for UtmZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.number, if self.north { "N" } else { "S" })
    }
}

/// Bounding box in projected (meter) coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedBounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl ProjectedBounds {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}
