//! Georeferenced raster types.

use crate::region::{utm, UtmZone};
use ndarray::{Array2, Array3, Axis};
use thiserror::Error;

/// EPSG code of WGS84 geographic coordinates.
pub const EPSG_WGS84: u32 = 4326;

/// Raster errors.
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("Raster I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("Unsupported coordinate reference system: {0}")]
    UnsupportedCrs(String),

    #[error("Missing georeferencing: {0}")]
    MissingGeoreference(String),

    #[error("Unsupported raster layout: {0}")]
    UnsupportedLayout(String),

    #[error("Band {band} out of range (raster has {count} bands)")]
    BandOutOfRange { band: usize, count: usize },

    #[error("Invalid raster shape: {0}")]
    Shape(String),
}

/// Coordinate reference systems understood by the resampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crs {
    /// WGS84 longitude/latitude, x = lon, y = lat
    Geographic,
    /// WGS84 / UTM
    Utm(UtmZone),
}

impl Crs {
    pub fn from_epsg(code: u32) -> Result<Self, RasterError> {
        if code == EPSG_WGS84 {
            return Ok(Crs::Geographic);
        }
        UtmZone::from_epsg(code)
            .map(Crs::Utm)
            .ok_or_else(|| RasterError::UnsupportedCrs(format!("EPSG:{}", code)))
    }

    pub fn epsg(&self) -> u32 {
        match self {
            Crs::Geographic => EPSG_WGS84,
            Crs::Utm(zone) => zone.epsg(),
        }
    }

    /// Maps a position in this CRS to `(lat, lon)`.
    pub fn to_geodetic(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Crs::Geographic => (y, x),
            Crs::Utm(zone) => utm::inverse(x, y, *zone),
        }
    }

    /// Maps `(lat, lon)` into this CRS.
    pub fn from_geodetic(&self, lat: f64, lon: f64) -> (f64, f64) {
        match self {
            Crs::Geographic => (lon, lat),
            Crs::Utm(zone) => utm::forward(lat, lon, *zone),
        }
    }
}

/// North-up affine transform.
///
/// Pixel `(col, row)` spans `[origin_x + col*pixel_width, +pixel_width)`
/// horizontally and `(origin_y - row*pixel_height - pixel_height, ...]`
/// vertically. `pixel_height` is positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Transform that stretches `width` x `height` pixels over the bounds.
    pub fn from_bounds(
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
        width: usize,
        height: usize,
    ) -> Self {
        Self {
            origin_x: min_x,
            origin_y: max_y,
            pixel_width: (max_x - min_x) / width as f64,
            pixel_height: (max_y - min_y) / height as f64,
        }
    }

    /// World position of a pixel center.
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y - (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Continuous pixel coordinates `(col, row)` of a world position.
    /// Pixel `i` covers `[i, i + 1)`.
    pub fn to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (self.origin_y - y) / self.pixel_height,
        )
    }
}

/// Sample type of the source data. Drives the choice of resampling kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterDataType {
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
    F32,
    F64,
}

impl RasterDataType {
    pub fn is_integer(&self) -> bool {
        !matches!(self, RasterDataType::F32 | RasterDataType::F64)
    }
}

/// An in-memory georeferenced raster.
///
/// Samples are held as `f32` in `(band, row, col)` order regardless of the
/// source type; `data_type` records what the source was.
#[derive(Debug, Clone)]
pub struct Raster {
    pub data: Array3<f32>,
    pub transform: GeoTransform,
    pub crs: Crs,
    pub data_type: RasterDataType,
    pub nodata: Option<f64>,
}

impl Raster {
    pub fn band_count(&self) -> usize {
        self.data.dim().0
    }

    pub fn height(&self) -> usize {
        self.data.dim().1
    }

    pub fn width(&self) -> usize {
        self.data.dim().2
    }

    /// Wraps a single 2D band.
    pub fn from_band(
        band: Array2<f32>,
        transform: GeoTransform,
        crs: Crs,
        data_type: RasterDataType,
    ) -> Self {
        Self {
            data: band.insert_axis(Axis(0)),
            transform,
            crs,
            data_type,
            nodata: None,
        }
    }
}

/// Which bands of a source to resample. Indices are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BandSelection {
    All,
    One(usize),
    List(Vec<usize>),
}

impl BandSelection {
    /// Resolves to 0-based indices, checking them against `count`.
    pub fn resolve(&self, count: usize) -> Result<Vec<usize>, RasterError> {
        let requested: Vec<usize> = match self {
            BandSelection::All => return Ok((0..count).collect()),
            BandSelection::One(band) => vec![*band],
            BandSelection::List(bands) => bands.clone(),
        };

        requested
            .into_iter()
            .map(|band| {
                if band == 0 || band > count {
                    Err(RasterError::BandOutOfRange { band, count })
                } else {
                    Ok(band - 1)
                }
            })
            .collect()
    }
}

/// Resampled output on a target grid: `(H, W)` for a single band or
/// `(bands, H, W)` for several.
#[derive(Debug, Clone, PartialEq)]
pub enum GridArray {
    Single(Array2<f32>),
    Multi(Array3<f32>),
}

impl GridArray {
    /// `(height, width)` of the grid the array lives on.
    pub fn spatial_shape(&self) -> (usize, usize) {
        match self {
            GridArray::Single(a) => a.dim(),
            GridArray::Multi(a) => {
                let (_, h, w) = a.dim();
                (h, w)
            }
        }
    }

    pub fn band_count(&self) -> usize {
        match self {
            GridArray::Single(_) => 1,
            GridArray::Multi(a) => a.dim().0,
        }
    }
}
