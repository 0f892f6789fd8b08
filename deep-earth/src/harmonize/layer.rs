//! Named layers registered on the master grid.

use crate::raster::GridArray;
use ndarray::{Array2, Array3};

/// One registered layer. The first two dimensions of every variant (the
/// last two for banded data) are `(height, width)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Layer {
    /// Single-band continuous values
    Continuous(Array2<f32>),
    /// Multi-band values, `(bands, height, width)`
    Banded(Array3<f32>),
    /// Integer class ids, 0 meaning "none"
    Categorical(Array2<u32>),
    /// Class names resolved from a categorical layer, empty for "none"
    Labels(Array2<String>),
    /// Binary presence mask
    Mask(Array2<u8>),
}

impl Layer {
    /// `(height, width)` of the layer.
    pub fn spatial_shape(&self) -> (usize, usize) {
        match self {
            Layer::Continuous(a) => a.dim(),
            Layer::Banded(a) => {
                let (_, h, w) = a.dim();
                (h, w)
            }
            Layer::Categorical(a) => a.dim(),
            Layer::Labels(a) => a.dim(),
            Layer::Mask(a) => a.dim(),
        }
    }

    pub fn as_continuous(&self) -> Option<&Array2<f32>> {
        match self {
            Layer::Continuous(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_categorical(&self) -> Option<&Array2<u32>> {
        match self {
            Layer::Categorical(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_labels(&self) -> Option<&Array2<String>> {
        match self {
            Layer::Labels(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_mask(&self) -> Option<&Array2<u8>> {
        match self {
            Layer::Mask(a) => Some(a),
            _ => None,
        }
    }
}

impl From<GridArray> for Layer {
    fn from(array: GridArray) -> Self {
        match array {
            GridArray::Single(a) => Layer::Continuous(a),
            GridArray::Multi(a) => Layer::Banded(a),
        }
    }
}
