//! Harmonization onto a shared UTM grid.
//!
//! The [`Harmonizer`] owns the [`MasterGrid`] for one request, resamples
//! incoming rasters onto it, keeps the named-layer registry and derives the
//! quality score.

mod grid;
mod harmonizer;
mod layer;
mod quality;

pub use grid::{MasterGrid, MAX_GRID_CELLS};
pub use harmonizer::{Harmonizer, Integration, QUALITY_LAYER};
pub use layer::Layer;
pub use quality::{QualityWeights, VECTOR_LAYER_NAMES};

use crate::raster::RasterError;
use thiserror::Error;

/// Structural harmonization failures.
#[derive(Debug, Error)]
pub enum HarmonizeError {
    #[error("Layer '{name}' has shape {actual:?}, grid is {expected:?}")]
    DimensionMismatch {
        name: String,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Invalid grid resolution: {0} (must be a positive number of meters)")]
    InvalidResolution(f64),

    #[error("Invalid grid extent: {0}")]
    InvalidExtent(String),

    #[error(transparent)]
    Raster(#[from] RasterError),
}
