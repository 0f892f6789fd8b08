//! Overpass JSON parsing.

use super::types::{FeatureKind, GeoPoint, Geometry, ParsedFeature, TagValue, VectorPayload};
use crate::provider::ProviderError;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::trace;

#[derive(Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<Element>,
}

#[derive(Deserialize)]
struct Element {
    #[serde(rename = "type")]
    element_type: String,
    #[serde(default)]
    id: i64,
    #[serde(default)]
    tags: BTreeMap<String, TagValue>,
    #[serde(default)]
    geometry: Vec<GeoPoint>,
    #[serde(default)]
    members: Vec<Member>,
}

#[derive(Deserialize)]
struct Member {
    #[serde(rename = "type")]
    member_type: String,
    #[serde(default)]
    role: String,
    #[serde(default)]
    geometry: Vec<GeoPoint>,
}

/// Parses an Overpass `out geom` response.
///
/// Elements without a recognised tag, nodes and degenerate geometries are
/// counted but produce no feature.
pub fn parse_overpass(bytes: &[u8]) -> Result<VectorPayload, ProviderError> {
    let response: OverpassResponse = serde_json::from_slice(bytes)
        .map_err(|e| ProviderError::InvalidResponse(format!("Unparseable Overpass response: {}", e)))?;

    let element_count = response.elements.len();
    let features = response
        .elements
        .into_iter()
        .filter_map(|element| {
            let kind = FeatureKind::from_tags(&element.tags)?;
            let geometry = match element.element_type.as_str() {
                "way" => way_geometry(kind, element.geometry),
                "relation" if kind.is_areal() => relation_geometry(element.members),
                _ => None,
            };
            if geometry.is_none() {
                trace!(id = element.id, kind = %kind, "Skipping element without usable geometry");
            }
            Some(ParsedFeature {
                kind,
                geometry: geometry?,
                tags: element.tags,
            })
        })
        .collect();

    Ok(VectorPayload {
        features,
        element_count,
    })
}

fn is_closed(points: &[GeoPoint]) -> bool {
    points.len() >= 4 && points.first() == points.last()
}

fn way_geometry(kind: FeatureKind, points: Vec<GeoPoint>) -> Option<Geometry> {
    if points.len() < 2 {
        return None;
    }
    if kind.is_areal() && is_closed(&points) {
        Some(Geometry::Polygon(vec![points]))
    } else {
        Some(Geometry::Line(points))
    }
}

/// Outer rings first, then inner rings.
fn relation_geometry(members: Vec<Member>) -> Option<Geometry> {
    let mut outer = Vec::new();
    let mut inner = Vec::new();
    for member in members {
        if member.member_type != "way" || member.geometry.len() < 2 {
            continue;
        }
        match member.role.as_str() {
            "inner" => inner.push(member.geometry),
            _ => outer.push(member.geometry),
        }
    }

    let mut rings = assemble_rings(outer);
    if rings.is_empty() {
        return None;
    }
    rings.extend(assemble_rings(inner));
    Some(Geometry::Polygon(rings))
}

/// Joins way segments end to end into closed rings. Segments that cannot be
/// closed are dropped.
pub(crate) fn assemble_rings(mut segments: Vec<Vec<GeoPoint>>) -> Vec<Vec<GeoPoint>> {
    let mut rings = Vec::new();
    while let Some(mut ring) = segments.pop() {
        while !is_closed(&ring) {
            let Some(&end) = ring.last() else { break };
            let next = segments.iter().position(|s| {
                s.first() == Some(&end) || s.last() == Some(&end)
            });
            let Some(index) = next else { break };
            let mut segment = segments.swap_remove(index);
            if segment.first() != Some(&end) {
                segment.reverse();
            }
            ring.extend(segment.into_iter().skip(1));
        }
        if is_closed(&ring) {
            rings.push(ring);
        }
    }
    rings
}
