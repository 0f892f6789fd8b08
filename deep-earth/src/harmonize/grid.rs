//! The master grid every source is aligned to.

use super::layer::Layer;
use super::HarmonizeError;
use crate::raster::{
    reproject, BandSelection, Crs, GeoTransform, GridArray, Raster, RasterError, TargetGrid,
};
use crate::region::{RegionContext, UtmZone};
use ndarray::Axis;
use std::collections::BTreeMap;

/// Largest grid, in cells, a region may produce.
pub const MAX_GRID_CELLS: usize = 1 << 30;

/// Projected raster frame for one request plus its layer registry.
///
/// The frame is fixed at construction; only the layer map grows.
#[derive(Debug, Clone)]
pub struct MasterGrid {
    width: usize,
    height: usize,
    transform: GeoTransform,
    zone: UtmZone,
    layers: BTreeMap<String, Layer>,
}

impl MasterGrid {
    /// Builds the grid covering the region's projected bbox.
    ///
    /// Pixel counts are `ceil(extent / resolution)` per axis and the
    /// transform spans the bbox exactly. A bbox that does not project to
    /// finite coordinates, or a grid above [`MAX_GRID_CELLS`], is an
    /// [`HarmonizeError::InvalidExtent`].
    pub fn new(region: &RegionContext, resolution: f64) -> Result<Self, HarmonizeError> {
        if !resolution.is_finite() || resolution <= 0.0 {
            return Err(HarmonizeError::InvalidResolution(resolution));
        }

        let bbox = region.projected_bbox();
        let corners = [bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y];
        if corners.iter().any(|v| !v.is_finite()) {
            return Err(HarmonizeError::InvalidExtent(format!(
                "projected bounds of {} are not finite in zone {}",
                region,
                region.utm_zone()
            )));
        }

        let columns = (bbox.width() / resolution).ceil().max(1.0);
        let rows = (bbox.height() / resolution).ceil().max(1.0);
        if columns * rows > MAX_GRID_CELLS as f64 {
            return Err(HarmonizeError::InvalidExtent(format!(
                "{} x {} cells at {} m exceeds {} cells",
                columns, rows, resolution, MAX_GRID_CELLS
            )));
        }
        let (width, height) = (columns as usize, rows as usize);
        let transform = GeoTransform::from_bounds(
            bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y, width, height,
        );

        Ok(Self {
            width,
            height,
            transform,
            zone: region.utm_zone(),
            layers: BTreeMap::new(),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// `(height, width)`
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn zone(&self) -> UtmZone {
        self.zone
    }

    pub fn epsg(&self) -> u32 {
        self.zone.epsg()
    }

    pub fn crs(&self) -> Crs {
        Crs::Utm(self.zone)
    }

    /// Reprojection target describing this grid.
    pub fn target(&self) -> TargetGrid {
        TargetGrid {
            crs: self.crs(),
            transform: self.transform,
            width: self.width,
            height: self.height,
        }
    }

    /// Projects `(lat, lon)` to continuous pixel coordinates `(col, row)`.
    pub fn geodetic_to_pixel(&self, lat: f64, lon: f64) -> (f64, f64) {
        let (x, y) = crate::region::utm::forward(lat, lon, self.zone);
        self.transform.to_pixel(x, y)
    }

    /// Resamples the selected bands of `source` onto this grid.
    ///
    /// A single band (an index, or `All` on a one-band source, or a list of
    /// one) yields `(H, W)`; several bands yield `(bands, H, W)`.
    pub fn resample(
        &self,
        source: &Raster,
        bands: &BandSelection,
    ) -> Result<GridArray, RasterError> {
        let indices = bands.resolve(source.band_count())?;
        let resampled = reproject(source, &indices, &self.target());

        if indices.len() == 1 {
            Ok(GridArray::Single(
                resampled.data.index_axis_move(Axis(0), 0),
            ))
        } else {
            Ok(GridArray::Multi(resampled.data))
        }
    }

    pub fn layers(&self) -> &BTreeMap<String, Layer> {
        &self.layers
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.get(name)
    }

    pub fn has_layer(&self, name: &str) -> bool {
        self.layers.contains_key(name)
    }

    /// Registers layers after checking every one matches the grid shape.
    ///
    /// Validation happens before anything is inserted, so a mismatch
    /// leaves the registry unchanged.
    pub fn add_layers<I>(&mut self, layers: I) -> Result<(), HarmonizeError>
    where
        I: IntoIterator<Item = (String, Layer)>,
    {
        let layers: Vec<(String, Layer)> = layers.into_iter().collect();
        for (name, layer) in &layers {
            let actual = layer.spatial_shape();
            if actual != self.shape() {
                return Err(HarmonizeError::DimensionMismatch {
                    name: name.clone(),
                    expected: self.shape(),
                    actual,
                });
            }
        }
        self.layers.extend(layers);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::RasterDataType;
    use ndarray::{Array2, Array3};

    fn region() -> RegionContext {
        RegionContext::new(44.9, 45.1, -93.1, -92.9).unwrap()
    }

    #[test]
    fn test_grid_dimensions_are_ceiled() {
        let r = region();
        let grid = MasterGrid::new(&r, 100.0).unwrap();
        let bbox = r.projected_bbox();
        assert_eq!(grid.width(), (bbox.width() / 100.0).ceil() as usize);
        assert_eq!(grid.height(), (bbox.height() / 100.0).ceil() as usize);
        assert_eq!(grid.epsg(), 32615);
        assert!(grid.transform().pixel_width <= 100.0);
    }

    #[test]
    fn test_invalid_resolution() {
        assert!(matches!(
            MasterGrid::new(&region(), 0.0),
            Err(HarmonizeError::InvalidResolution(_))
        ));
    }

    #[test]
    fn test_region_far_from_central_meridian_is_invalid_extent() {
        // The western corner lies 90° from the zone's central meridian
        let wide = RegionContext::new(0.0, 10.0, -87.0, 93.0).unwrap();
        assert!(matches!(
            MasterGrid::new(&wide, 1000.0),
            Err(HarmonizeError::InvalidExtent(_))
        ));
    }

    #[test]
    fn test_oversized_grid_is_invalid_extent() {
        assert!(matches!(
            MasterGrid::new(&region(), 0.01),
            Err(HarmonizeError::InvalidExtent(_))
        ));
    }

    #[test]
    fn test_add_layers_rejects_mismatch_atomically() {
        let mut grid = MasterGrid::new(&region(), 500.0).unwrap();
        let (h, w) = grid.shape();
        let good = Layer::Continuous(Array2::zeros((h, w)));
        let bad = Layer::Mask(Array2::zeros((h + 1, w)));

        let result = grid.add_layers(vec![
            ("good".to_string(), good),
            ("bad".to_string(), bad),
        ]);
        assert!(matches!(
            result,
            Err(HarmonizeError::DimensionMismatch { ref name, .. }) if name == "bad"
        ));
        assert!(grid.layers().is_empty());
    }

    #[test]
    fn test_resample_shapes() {
        let grid = MasterGrid::new(&region(), 500.0).unwrap();
        let (h, w) = grid.shape();

        let mut single = Raster::from_band(
            Array2::from_elem((8, 8), 1.0),
            *grid.transform(),
            grid.crs(),
            RasterDataType::F32,
        );
        single.transform.pixel_width = grid.transform().pixel_width * w as f64 / 8.0;
        single.transform.pixel_height = grid.transform().pixel_height * h as f64 / 8.0;
        let out = grid.resample(&single, &BandSelection::All).unwrap();
        assert_eq!(out.spatial_shape(), (h, w));
        assert!(matches!(out, GridArray::Single(_)));

        let multi = Raster {
            data: Array3::zeros((64, 8, 8)),
            ..single
        };
        let out = grid.resample(&multi, &BandSelection::All).unwrap();
        match out {
            GridArray::Multi(a) => assert_eq!(a.dim(), (64, h, w)),
            GridArray::Single(_) => panic!("expected banded output"),
        }
    }
}
