//! The harmonization engine.

use super::grid::MasterGrid;
use super::layer::Layer;
use super::quality::{QualityWeights, VECTOR_LAYER_NAMES};
use super::HarmonizeError;
use crate::orchestrator::{FetchReport, SOURCE_ELEVATION, SOURCE_EMBEDDING, SOURCE_LOCAL};
use crate::provider::FetchResult;
use crate::raster::{read_geotiff, BandSelection, GridArray, Raster};
use crate::rasterize::VectorRasterizer;
use crate::region::RegionContext;
use ndarray::Array2;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Name of the quality layer registered by [`Harmonizer::integrate`].
pub const QUALITY_LAYER: &str = "quality";

/// Aligns every source of one request onto a single [`MasterGrid`].
#[derive(Debug, Clone)]
pub struct Harmonizer {
    region: RegionContext,
    resolution: f64,
    grid: MasterGrid,
    weights: QualityWeights,
}

/// Result of [`Harmonizer::integrate`].
#[derive(Debug, Clone)]
pub struct Integration {
    /// Normalized outcome per source name
    pub outcomes: BTreeMap<String, FetchResult<PathBuf>>,
    /// The quality layer, also registered on the grid
    pub quality: Array2<f32>,
}

impl Harmonizer {
    pub fn new(region: RegionContext, resolution: f64) -> Result<Self, HarmonizeError> {
        let grid = MasterGrid::new(&region, resolution)?;
        debug!(
            width = grid.width(),
            height = grid.height(),
            epsg = grid.epsg(),
            resolution = resolution,
            "Master grid created"
        );
        Ok(Self {
            region,
            resolution,
            grid,
            weights: QualityWeights::default(),
        })
    }

    /// Replaces the quality weights.
    pub fn with_weights(mut self, weights: QualityWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn region(&self) -> &RegionContext {
        &self.region
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn grid(&self) -> &MasterGrid {
        &self.grid
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.grid.layer(name)
    }

    /// Resamples the selected bands of a raster onto the master grid.
    ///
    /// The kernel follows the source's data type: bilinear for floats,
    /// nearest neighbor for integers.
    pub fn resample(
        &self,
        source: &Raster,
        bands: &BandSelection,
    ) -> Result<GridArray, HarmonizeError> {
        Ok(self.grid.resample(source, bands)?)
    }

    /// Reads a GeoTIFF and resamples it onto the master grid.
    pub fn resample_path(
        &self,
        path: &Path,
        bands: &BandSelection,
    ) -> Result<GridArray, HarmonizeError> {
        let raster = read_geotiff(path)?;
        self.resample(&raster, bands)
    }

    /// Registers named layers; every one must match the grid's shape.
    pub fn add_layers<I>(&mut self, layers: I) -> Result<(), HarmonizeError>
    where
        I: IntoIterator<Item = (String, Layer)>,
    {
        self.grid.add_layers(layers)
    }

    /// Normalizes a raw acquisition outcome.
    ///
    /// `raw` is `Err(message)` for a failed fetch, `Ok(None)` when the
    /// source had nothing, or `Ok(Some(path))` for a raster on disk. A path
    /// that cannot be read or resampled becomes an `Err` outcome.
    pub fn process_fetch_result(
        &self,
        raw: Result<Option<PathBuf>, String>,
        provider: &str,
        bands: &BandSelection,
    ) -> (Option<GridArray>, FetchResult<PathBuf>) {
        match raw {
            Err(message) => {
                warn!(provider = provider, error = %message, "Source failed");
                (None, FetchResult::Err(message))
            }
            Ok(None) => {
                info!(provider = provider, "Source returned no data");
                (None, FetchResult::Empty(format!("{} returned no data", provider)))
            }
            Ok(Some(path)) => match self.resample_path(&path, bands) {
                Ok(array) => (Some(array), FetchResult::Ok(path)),
                Err(e) => {
                    warn!(provider = provider, path = %path.display(), error = %e, "Failed to resample source");
                    (None, FetchResult::Err(e.to_string()))
                }
            },
        }
    }

    /// Whether any vector-derived layer is registered.
    pub fn has_vector_layers(&self) -> bool {
        VECTOR_LAYER_NAMES
            .iter()
            .any(|name| self.grid.has_layer(name))
    }

    /// Per-cell quality score in [0, 1].
    ///
    /// Each source present adds its weight: elevation, embedding, and any
    /// registered vector layer. Presence is per source, so the score is
    /// uniform over the grid.
    pub fn compute_quality_layer(
        &self,
        elevation: Option<&GridArray>,
        embedding: Option<&GridArray>,
    ) -> Array2<f32> {
        let score = self.weights.score(
            elevation.is_some(),
            embedding.is_some(),
            self.has_vector_layers(),
        );
        Array2::from_elem(self.grid.shape(), score)
    }

    /// Folds a fetch report into the grid.
    ///
    /// Elevation (band 1), embedding (all bands) and local rasters are
    /// resampled and registered under their source names, the vector
    /// payload is rasterized, and the quality layer is computed last.
    pub fn integrate(
        &mut self,
        report: &FetchReport,
        rasterizer: &VectorRasterizer,
    ) -> Result<Integration, HarmonizeError> {
        let mut outcomes = BTreeMap::new();
        let mut elevation = None;
        let mut embedding = None;

        for (name, bands) in [
            (SOURCE_ELEVATION, BandSelection::One(1)),
            (SOURCE_EMBEDDING, BandSelection::All),
            (SOURCE_LOCAL, BandSelection::All),
        ] {
            if !report.requested(name) {
                continue;
            }
            let (array, outcome) = self.process_fetch_result(report.raw(name), name, &bands);
            if let Some(array) = array {
                self.add_layers([(name.to_string(), Layer::from(array.clone()))])?;
                match name {
                    SOURCE_ELEVATION => elevation = Some(array),
                    SOURCE_EMBEDDING => embedding = Some(array),
                    _ => {}
                }
            }
            outcomes.insert(name.to_string(), outcome);
        }

        if let Some(payload) = &report.vector {
            let layers = rasterizer.rasterize(&payload.features, &self.grid);
            self.add_layers(layers)?;
        }

        let quality = self.compute_quality_layer(elevation.as_ref(), embedding.as_ref());
        self.add_layers([(QUALITY_LAYER.to_string(), Layer::Continuous(quality.clone()))])?;

        info!(
            layers = self.grid.layers().len(),
            quality = quality.first().copied().unwrap_or(0.0),
            "Harmonization complete"
        );
        Ok(Integration { outcomes, quality })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{write_geotiff, Crs, GeoTransform, RasterDataType};
    use tempfile::TempDir;

    fn harmonizer() -> Harmonizer {
        let region = RegionContext::new(44.9, 45.1, -93.1, -92.9).unwrap();
        Harmonizer::new(region, 250.0).unwrap()
    }

    fn grid_array(h: &Harmonizer, value: f32) -> GridArray {
        GridArray::Single(Array2::from_elem(h.grid().shape(), value))
    }

    #[test]
    fn test_quality_elevation_only() {
        let h = harmonizer();
        let elevation = grid_array(&h, 300.0);
        let q = h.compute_quality_layer(Some(&elevation), None);
        assert_eq!(q.dim(), h.grid().shape());
        assert!(q.iter().all(|&v| v == 0.25));
    }

    #[test]
    fn test_quality_elevation_and_embedding() {
        let h = harmonizer();
        let elevation = grid_array(&h, 300.0);
        let embedding = grid_array(&h, 0.1);
        let q = h.compute_quality_layer(Some(&elevation), Some(&embedding));
        assert!(q.iter().all(|&v| v == 0.75));
    }

    #[test]
    fn test_quality_all_sources() {
        let mut h = harmonizer();
        let shape = h.grid().shape();
        h.add_layers([("road_distance".to_string(), Layer::Continuous(Array2::zeros(shape)))])
            .unwrap();

        let elevation = grid_array(&h, 300.0);
        let embedding = grid_array(&h, 0.1);
        let q = h.compute_quality_layer(Some(&elevation), Some(&embedding));
        assert!(q.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_unrelated_layer_does_not_count_as_vector() {
        let mut h = harmonizer();
        let shape = h.grid().shape();
        h.add_layers([("slope".to_string(), Layer::Continuous(Array2::zeros(shape)))])
            .unwrap();
        assert!(!h.has_vector_layers());
    }

    #[test]
    fn test_process_fetch_result_shapes() {
        let h = harmonizer();

        let (grid, outcome) =
            h.process_fetch_result(Err("boom".to_string()), "elevation", &BandSelection::One(1));
        assert!(grid.is_none());
        assert_eq!(outcome, FetchResult::Err("boom".to_string()));

        let (grid, outcome) = h.process_fetch_result(Ok(None), "embedding", &BandSelection::All);
        assert!(grid.is_none());
        assert!(outcome.is_empty());

        let (grid, outcome) = h.process_fetch_result(
            Ok(Some(PathBuf::from("/nonexistent/dem.tif"))),
            "elevation",
            &BandSelection::One(1),
        );
        assert!(grid.is_none());
        assert!(outcome.is_err());
    }

    #[test]
    fn test_process_fetch_result_reads_geotiff() {
        let dir = TempDir::new().unwrap();
        let h = harmonizer();
        let bbox = h.region().projected_bbox();
        let raster = Raster::from_band(
            Array2::from_elem((20, 20), 250.0),
            GeoTransform::from_bounds(
                bbox.min_x - 1000.0,
                bbox.min_y - 1000.0,
                bbox.max_x + 1000.0,
                bbox.max_y + 1000.0,
                20,
                20,
            ),
            Crs::Utm(h.grid().zone()),
            RasterDataType::F32,
        );
        let path = dir.path().join("dem.tif");
        write_geotiff(&path, &raster).unwrap();

        let (grid, outcome) =
            h.process_fetch_result(Ok(Some(path.clone())), "elevation", &BandSelection::One(1));
        assert_eq!(outcome, FetchResult::Ok(path));
        let GridArray::Single(values) = grid.unwrap() else {
            panic!("expected single band");
        };
        assert_eq!(values.dim(), h.grid().shape());
        assert!(values.iter().all(|&v| (v - 250.0).abs() < 1e-4));
    }
}
