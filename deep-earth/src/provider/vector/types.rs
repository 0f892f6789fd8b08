//! Parsed vector features.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Feature class, decided by the first matching tag in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureKind {
    Road,
    Waterway,
    Building,
    Landuse,
    Natural,
}

impl FeatureKind {
    /// Tag precedence when an element carries several.
    pub const PRIORITY: [FeatureKind; 5] = [
        FeatureKind::Road,
        FeatureKind::Waterway,
        FeatureKind::Building,
        FeatureKind::Landuse,
        FeatureKind::Natural,
    ];

    /// OSM tag key that identifies the kind.
    pub fn tag_key(&self) -> &'static str {
        match self {
            FeatureKind::Road => "highway",
            FeatureKind::Waterway => "waterway",
            FeatureKind::Building => "building",
            FeatureKind::Landuse => "landuse",
            FeatureKind::Natural => "natural",
        }
    }

    pub fn from_tags(tags: &BTreeMap<String, TagValue>) -> Option<Self> {
        Self::PRIORITY
            .into_iter()
            .find(|kind| tags.contains_key(kind.tag_key()))
    }

    /// Whether a closed way of this kind describes an area.
    pub fn is_areal(&self) -> bool {
        matches!(
            self,
            FeatureKind::Building | FeatureKind::Landuse | FeatureKind::Natural
        )
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeatureKind::Road => "road",
            FeatureKind::Waterway => "waterway",
            FeatureKind::Building => "building",
            FeatureKind::Landuse => "landuse",
            FeatureKind::Natural => "natural",
        };
        f.write_str(name)
    }
}

/// A WGS84 position as returned by the query service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Feature geometry in geodetic coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Line(Vec<GeoPoint>),
    /// One or more rings; holes are filled even-odd
    Polygon(Vec<Vec<GeoPoint>>),
}

/// A tag value. The query service sends strings but numbers are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Text(String),
    Number(f64),
}

impl TagValue {
    pub fn as_text(&self) -> String {
        match self {
            TagValue::Text(s) => s.clone(),
            TagValue::Number(n) => n.to_string(),
        }
    }

    /// Leading numeric value, e.g. `"12.5 m"` → 12.5.
    pub fn leading_number(&self) -> Option<f64> {
        match self {
            TagValue::Number(n) => Some(*n),
            TagValue::Text(s) => {
                let s = s.trim();
                let end = s
                    .char_indices()
                    .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && c == '-')))
                    .map(|(i, _)| i)
                    .unwrap_or(s.len());
                s[..end].parse().ok()
            }
        }
    }
}

/// One tagged vector element.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFeature {
    pub kind: FeatureKind,
    pub geometry: Geometry,
    pub tags: BTreeMap<String, TagValue>,
}

impl ParsedFeature {
    pub fn tag(&self, key: &str) -> Option<&TagValue> {
        self.tags.get(key)
    }
}

/// Parsed result of one vector query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorPayload {
    pub features: Vec<ParsedFeature>,
    /// Raw elements in the response, including unusable ones
    pub element_count: usize,
}

impl VectorPayload {
    pub fn count(&self, kind: FeatureKind) -> usize {
        self.features.iter().filter(|f| f.kind == kind).count()
    }
}
