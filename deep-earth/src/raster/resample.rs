//! Reprojection of rasters onto a target grid.
//!
//! Every target pixel center is mapped into the source CRS (through
//! geodetic coordinates when the systems differ) and sampled there.

use super::types::{Crs, GeoTransform, Raster, RasterDataType};
use ndarray::{Array2, Array3};

/// Sampling kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResampleMethod {
    Bilinear,
    Nearest,
}

impl ResampleMethod {
    /// Bilinear for floating-point data, nearest for integer/categorical.
    pub fn for_data_type(data_type: RasterDataType) -> Self {
        if data_type.is_integer() {
            ResampleMethod::Nearest
        } else {
            ResampleMethod::Bilinear
        }
    }
}

/// Target frame of a reprojection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetGrid {
    pub crs: Crs,
    pub transform: GeoTransform,
    pub width: usize,
    pub height: usize,
}

/// Output of [`reproject`].
#[derive(Debug, Clone)]
pub struct Resampled {
    /// `(bands, height, width)` values; 0 where the source has no data
    pub data: Array3<f32>,
    /// True where at least one valid source sample contributed
    pub coverage: Array2<bool>,
}

/// Reprojects the given 0-based `bands` of `source` onto `target`.
pub fn reproject(source: &Raster, bands: &[usize], target: &TargetGrid) -> Resampled {
    let method = ResampleMethod::for_data_type(source.data_type);
    let (height, width) = (target.height, target.width);

    let positions = Array2::from_shape_fn((height, width), |(row, col)| {
        let (x, y) = target.transform.pixel_center(col, row);
        let (sx, sy) = if source.crs == target.crs {
            (x, y)
        } else {
            let (lat, lon) = target.crs.to_geodetic(x, y);
            source.crs.from_geodetic(lat, lon)
        };
        source.transform.to_pixel(sx, sy)
    });

    let mut data = Array3::zeros((bands.len(), height, width));
    let mut coverage = Array2::from_elem((height, width), false);

    for (out_band, &band) in bands.iter().enumerate() {
        for ((row, col), &(px, py)) in positions.indexed_iter() {
            let sample = match method {
                ResampleMethod::Nearest => sample_nearest(source, band, px, py),
                ResampleMethod::Bilinear => sample_bilinear(source, band, px, py),
            };
            if let Some(value) = sample {
                data[(out_band, row, col)] = value;
                coverage[(row, col)] = true;
            }
        }
    }

    Resampled { data, coverage }
}

fn is_valid(source: &Raster, value: f32) -> bool {
    if value.is_nan() {
        return false;
    }
    match source.nodata {
        Some(nodata) => (value as f64 - nodata).abs() > f64::EPSILON * nodata.abs().max(1.0),
        None => true,
    }
}

fn inside(source: &Raster, px: f64, py: f64) -> bool {
    px >= 0.0 && py >= 0.0 && px < source.width() as f64 && py < source.height() as f64
}

fn sample_nearest(source: &Raster, band: usize, px: f64, py: f64) -> Option<f32> {
    if !inside(source, px, py) {
        return None;
    }
    let value = source.data[(band, py.floor() as usize, px.floor() as usize)];
    is_valid(source, value).then_some(value)
}

/// Bilinear interpolation between the four surrounding pixel centers.
/// Nodata neighbors are dropped and the remaining weights renormalized.
fn sample_bilinear(source: &Raster, band: usize, px: f64, py: f64) -> Option<f32> {
    if !inside(source, px, py) {
        return None;
    }

    let u = px - 0.5;
    let v = py - 0.5;
    let c0 = u.floor();
    let r0 = v.floor();
    let fx = u - c0;
    let fy = v - r0;

    let (w, h) = (source.width() as i64, source.height() as i64);
    let mut sum = 0.0;
    let mut weight = 0.0;
    for (dr, wy) in [(0, 1.0 - fy), (1, fy)] {
        for (dc, wx) in [(0, 1.0 - fx), (1, fx)] {
            let r = r0 as i64 + dr;
            let c = c0 as i64 + dc;
            let wgt = wx * wy;
            if r < 0 || c < 0 || r >= h || c >= w || wgt == 0.0 {
                continue;
            }
            let value = source.data[(band, r as usize, c as usize)];
            if is_valid(source, value) {
                sum += value as f64 * wgt;
                weight += wgt;
            }
        }
    }

    (weight > 0.0).then(|| (sum / weight) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::UtmZone;

    const ZONE: UtmZone = UtmZone {
        number: 15,
        north: true,
    };

    fn source(data_type: RasterDataType) -> Raster {
        // 4x4 ramp along x, 10 m pixels
        let band = Array2::from_shape_fn((4, 4), |(_, c)| c as f32 * 10.0);
        Raster::from_band(
            band,
            GeoTransform {
                origin_x: 0.0,
                origin_y: 40.0,
                pixel_width: 10.0,
                pixel_height: 10.0,
            },
            Crs::Utm(ZONE),
            data_type,
        )
    }

    fn target(width: usize, height: usize, transform: GeoTransform) -> TargetGrid {
        TargetGrid {
            crs: Crs::Utm(ZONE),
            transform,
            width,
            height,
        }
    }

    #[test]
    fn test_identity_grid_reproduces_source() {
        let src = source(RasterDataType::F32);
        let out = reproject(&src, &[0], &target(4, 4, src.transform));
        assert_eq!(out.data, src.data);
        assert!(out.coverage.iter().all(|&c| c));
    }

    #[test]
    fn test_bilinear_interpolates_between_centers() {
        let src = source(RasterDataType::F32);
        // Target pixel centered on the boundary between source columns 1 and 2
        let grid = target(
            1,
            1,
            GeoTransform {
                origin_x: 15.0,
                origin_y: 25.0,
                pixel_width: 10.0,
                pixel_height: 10.0,
            },
        );
        let out = reproject(&src, &[0], &grid);
        assert!((out.data[(0, 0, 0)] - 15.0).abs() < 1e-5);
    }

    #[test]
    fn test_nearest_for_integer_data() {
        let src = source(RasterDataType::U8);
        let grid = target(
            1,
            1,
            GeoTransform {
                origin_x: 16.0,
                origin_y: 25.0,
                pixel_width: 10.0,
                pixel_height: 10.0,
            },
        );
        let out = reproject(&src, &[0], &grid);
        // Center at x = 21 falls in source column 2
        assert_eq!(out.data[(0, 0, 0)], 20.0);
    }

    #[test]
    fn test_outside_source_is_zero_and_uncovered() {
        let src = source(RasterDataType::F32);
        let grid = target(
            2,
            1,
            GeoTransform {
                origin_x: 30.0,
                origin_y: 40.0,
                pixel_width: 10.0,
                pixel_height: 10.0,
            },
        );
        let out = reproject(&src, &[0], &grid);
        assert_eq!(out.data[(0, 0, 0)], 30.0);
        assert!(out.coverage[(0, 0)]);
        assert_eq!(out.data[(0, 0, 1)], 0.0);
        assert!(!out.coverage[(0, 1)]);
    }

    #[test]
    fn test_nodata_excluded_from_bilinear() {
        let mut src = source(RasterDataType::F32);
        src.nodata = Some(-9999.0);
        src.data[(0, 1, 1)] = -9999.0;
        src.data[(0, 1, 2)] = -9999.0;
        src.data[(0, 2, 1)] = -9999.0;
        let grid = target(
            1,
            1,
            GeoTransform {
                origin_x: 15.0,
                origin_y: 25.0,
                pixel_width: 10.0,
                pixel_height: 10.0,
            },
        );
        let out = reproject(&src, &[0], &grid);
        // Only source (2, 2) = 20.0 is valid
        assert!((out.data[(0, 0, 0)] - 20.0).abs() < 1e-5);
    }

    #[test]
    fn test_geographic_source_onto_utm() {
        // 1x1 degree geographic raster around the zone 15 central meridian
        let band = Array2::from_elem((10, 10), 7.5f32);
        let src = Raster::from_band(
            band,
            GeoTransform {
                origin_x: -93.5,
                origin_y: 45.5,
                pixel_width: 0.1,
                pixel_height: 0.1,
            },
            Crs::Geographic,
            RasterDataType::F32,
        );
        let (x, y) = crate::region::utm::forward(45.0, -93.0, ZONE);
        let grid = target(
            3,
            3,
            GeoTransform {
                origin_x: x - 45.0,
                origin_y: y + 45.0,
                pixel_width: 30.0,
                pixel_height: 30.0,
            },
        );
        let out = reproject(&src, &[0], &grid);
        assert!(out.data.iter().all(|&v| (v - 7.5).abs() < 1e-5));
    }
}
