//! Vector-to-raster conversion.
//!
//! Turns parsed features into layers on a [`MasterGrid`]:
//!
//! | Layer | Type | Source |
//! |-------|------|--------|
//! | `highway`, `highway_labels` | categorical + names | roads by `highway` value |
//! | `landuse`, `landuse_labels` | categorical + names | landuse by `landuse` value |
//! | `building_mask`, `building_height` | mask + meters | buildings |
//! | `road_mask`, `road_distance` | mask + meters | roads |
//! | `waterway_mask`, `waterway_distance` | mask + meters | waterways |
//! | `natural_mask`, `natural_distance` | mask + meters | natural features |
//!
//! Geometries are projected with the grid's UTM zone, not an affine
//! approximation.

mod distance;
mod paint;

pub use distance::euclidean_distance;
pub use paint::{draw_line, fill_polygon};

use crate::harmonize::{Layer, MasterGrid};
use crate::provider::vector::{FeatureKind, Geometry, ParsedFeature};
use ndarray::Array2;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Distance assigned where a category has nothing to measure to.
pub const DISTANCE_SENTINEL: f32 = 1.0e6;

/// Geometry in continuous pixel coordinates.
#[derive(Debug, Clone)]
enum PixelGeometry {
    Line(Vec<(f64, f64)>),
    Polygon(Vec<Vec<(f64, f64)>>),
}

impl PixelGeometry {
    fn project(geometry: &Geometry, grid: &MasterGrid) -> Self {
        let to_pixel = |points: &[crate::provider::vector::GeoPoint]| -> Vec<(f64, f64)> {
            points
                .iter()
                .map(|p| grid.geodetic_to_pixel(p.lat, p.lon))
                .collect()
        };
        match geometry {
            Geometry::Line(points) => PixelGeometry::Line(to_pixel(points)),
            Geometry::Polygon(rings) => {
                PixelGeometry::Polygon(rings.iter().map(|r| to_pixel(r)).collect())
            }
        }
    }

    fn paint<T: Clone>(&self, target: &mut Array2<T>, value: T) {
        match self {
            PixelGeometry::Line(points) => draw_line(target, points, value),
            PixelGeometry::Polygon(rings) => fill_polygon(target, rings, value),
        }
    }
}

/// Rasterizes vector features onto a master grid.
#[derive(Debug, Clone, Copy, Default)]
pub struct VectorRasterizer;

impl VectorRasterizer {
    pub fn new() -> Self {
        Self
    }

    /// Produces every vector layer for `features` on `grid`.
    pub fn rasterize(
        &self,
        features: &[ParsedFeature],
        grid: &MasterGrid,
    ) -> BTreeMap<String, Layer> {
        let projected: Vec<(&ParsedFeature, PixelGeometry)> = features
            .iter()
            .map(|f| (f, PixelGeometry::project(&f.geometry, grid)))
            .collect();
        let of_kind = |kind: FeatureKind| -> Vec<&(&ParsedFeature, PixelGeometry)> {
            projected.iter().filter(|(f, _)| f.kind == kind).collect()
        };

        let shape = grid.shape();
        let pixel_size = grid.transform().pixel_width as f32;
        let mut layers = BTreeMap::new();

        for (kind, name) in [(FeatureKind::Road, "highway"), (FeatureKind::Landuse, "landuse")] {
            let (ids, labels) = categorical(&of_kind(kind), kind.tag_key(), shape);
            layers.insert(name.to_string(), Layer::Categorical(ids));
            layers.insert(format!("{}_labels", name), Layer::Labels(labels));
        }

        let buildings = of_kind(FeatureKind::Building);
        let mut building_mask = Array2::<u8>::zeros(shape);
        let mut building_height = Array2::<f32>::zeros(shape);
        for (feature, geometry) in &buildings {
            geometry.paint(&mut building_mask, 1);
            let height = feature
                .tag("height")
                .and_then(|v| v.leading_number())
                .unwrap_or(0.0) as f32;
            geometry.paint(&mut building_height, height);
        }
        layers.insert("building_mask".to_string(), Layer::Mask(building_mask));
        layers.insert("building_height".to_string(), Layer::Continuous(building_height));

        for (kind, name) in [
            (FeatureKind::Road, "road"),
            (FeatureKind::Waterway, "waterway"),
            (FeatureKind::Natural, "natural"),
        ] {
            let members = of_kind(kind);
            let mut mask = Array2::<u8>::zeros(shape);
            for (_, geometry) in &members {
                geometry.paint(&mut mask, 1);
            }

            let distance = if members.is_empty() {
                Array2::from_elem(shape, DISTANCE_SENTINEL)
            } else {
                match euclidean_distance(&mask) {
                    Some(pixels) => pixels.mapv(|d| d * pixel_size),
                    None => Array2::from_elem(shape, DISTANCE_SENTINEL),
                }
            };

            debug!(
                kind = %kind,
                features = members.len(),
                cells = mask.iter().filter(|&&v| v != 0).count(),
                "Rasterized feature class"
            );
            layers.insert(format!("{}_mask", name), Layer::Mask(mask));
            layers.insert(format!("{}_distance", name), Layer::Continuous(distance));
        }

        layers
    }
}

/// Paints class ids for the distinct values of `key`, 1-based in sorted
/// order, and resolves them back to names. Later features win overlaps.
fn categorical(
    members: &[&(&ParsedFeature, PixelGeometry)],
    key: &str,
    shape: (usize, usize),
) -> (Array2<u32>, Array2<String>) {
    let legend: Vec<String> = members
        .iter()
        .filter_map(|(f, _)| f.tag(key).map(|v| v.as_text()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut ids = Array2::<u32>::zeros(shape);
    for (feature, geometry) in members {
        let Some(value) = feature.tag(key).map(|v| v.as_text()) else {
            continue;
        };
        if let Ok(index) = legend.binary_search(&value) {
            geometry.paint(&mut ids, index as u32 + 1);
        }
    }

    let labels = ids.mapv(|id| {
        if id == 0 {
            String::new()
        } else {
            legend[id as usize - 1].clone()
        }
    });
    (ids, labels)
}
