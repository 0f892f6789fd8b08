//! Per-cell data completeness score.

/// Layer names whose presence counts as vector coverage.
pub const VECTOR_LAYER_NAMES: [&str; 6] = [
    "highway",
    "landuse",
    "building_mask",
    "road_distance",
    "waterway_distance",
    "natural_distance",
];

/// Independent contribution of each source to the quality score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityWeights {
    pub elevation: f32,
    pub embedding: f32,
    pub vector: f32,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            elevation: 0.25,
            embedding: 0.5,
            vector: 0.25,
        }
    }
}

impl QualityWeights {
    /// Sum of the weights of the sources that are present, clamped to [0, 1].
    pub fn score(&self, elevation: bool, embedding: bool, vector: bool) -> f32 {
        let mut score = 0.0;
        if elevation {
            score += self.elevation;
        }
        if embedding {
            score += self.embedding;
        }
        if vector {
            score += self.vector;
        }
        score.clamp(0.0, 1.0)
    }
}
