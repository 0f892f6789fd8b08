//! Overpass QL query construction.

use super::types::FeatureKind;
use crate::region::RegionContext;

/// Default timeout embedded in queries, in seconds.
pub const DEFAULT_QUERY_TIMEOUT: u32 = 90;

/// Builds the query for every feature kind inside the region.
///
/// Ways are requested for all kinds; relations only for areal kinds, whose
/// multipolygons carry the outlines. `out geom` inlines coordinates so no
/// node lookup is needed.
pub fn build_query(region: &RegionContext, timeout_secs: u32) -> String {
    let bbox = format!(
        "({},{},{},{})",
        region.lat_min(),
        region.lon_min(),
        region.lat_max(),
        region.lon_max()
    );

    let mut query = format!("[out:json][timeout:{}];\n(\n", timeout_secs);
    for kind in FeatureKind::PRIORITY {
        query.push_str(&format!("  way[\"{}\"]{};\n", kind.tag_key(), bbox));
        if kind.is_areal() {
            query.push_str(&format!("  relation[\"{}\"]{};\n", kind.tag_key(), bbox));
        }
    }
    query.push_str(");\nout geom;\n");
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_has_bbox_and_filters() {
        let region = RegionContext::new(44.9, 45.1, -93.1, -92.9).unwrap();
        let query = build_query(&region, 90);

        assert!(query.starts_with("[out:json][timeout:90];"));
        assert!(query.contains("way[\"highway\"](44.9,-93.1,45.1,-92.9);"));
        assert!(query.contains("way[\"waterway\"](44.9,-93.1,45.1,-92.9);"));
        assert!(query.contains("relation[\"landuse\"](44.9,-93.1,45.1,-92.9);"));
        assert!(!query.contains("relation[\"highway\"]"));
        assert!(query.trim_end().ends_with("out geom;"));
    }

    #[test]
    fn test_one_statement_per_line() {
        let region = RegionContext::new(44.9, 45.1, -93.1, -92.9).unwrap();
        let query = build_query(&region, 30);

        let ways = query.lines().filter(|l| l.starts_with("  way[")).count();
        let relations = query.lines().filter(|l| l.starts_with("  relation[")).count();
        let areal = FeatureKind::PRIORITY.iter().filter(|k| k.is_areal()).count();
        assert_eq!(ways, FeatureKind::PRIORITY.len());
        assert_eq!(relations, areal);
        assert_eq!(query.lines().count(), ways + relations + 4);
        assert!(query
            .lines()
            .filter(|l| l.starts_with("  "))
            .all(|l| l.ends_with("(44.9,-93.1,45.1,-92.9);")));
    }
}
