//! Versioned metadata document for the cache store.
//!
//! Two schema versions exist on disk:
//!
//! ```text
//! v1: {"version": 1, "entries": {"<key>": {"category": "vector", "created": 1700000000.5, "extension": "json"}}}
//! v2: {"version": 2, "entries": {"<key>": {"category": "vector", "timestamp": "2024-01-01T00:00:00Z", "ttl_days": 30, "extension": "json"}}}
//! ```
//!
//! Version 1 relied on a global TTL-by-category at read time; version 2
//! captures the TTL on each entry when it is written. Loading a version 1
//! document migrates it, deriving each entry's TTL from its category.

use super::types::{CacheCategory, CategoryTtl};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Current schema version.
pub const METADATA_VERSION: u32 = 2;

/// Metadata for one cached blob. The key is the map key in the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub category: CacheCategory,
    pub timestamp: DateTime<Utc>,
    pub ttl_days: Option<u32>,
    pub extension: String,
}

impl CacheEntry {
    /// Whether the entry's TTL has elapsed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.ttl_days {
            Some(days) => self.timestamp + Duration::days(days as i64) <= now,
            None => false,
        }
    }
}

/// The on-disk document, current schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataDocument {
    pub version: u32,
    pub entries: BTreeMap<String, CacheEntry>,
}

#[derive(Debug, Deserialize)]
struct LegacyDocument {
    #[serde(default)]
    entries: BTreeMap<String, LegacyEntry>,
}

#[derive(Debug, Deserialize)]
struct LegacyEntry {
    category: String,
    /// Seconds since the Unix epoch
    created: f64,
    extension: Option<String>,
}

/// Outcome of decoding a metadata document.
#[derive(Debug)]
pub enum Decoded {
    /// Document was already current
    Current(BTreeMap<String, CacheEntry>),
    /// Document was migrated from an older version and should be persisted
    Migrated(BTreeMap<String, CacheEntry>),
    /// Document was unreadable and is treated as empty
    Corrupt,
}

/// Decodes raw metadata bytes, migrating older schemas.
pub fn decode(bytes: &[u8], ttl: &CategoryTtl) -> Decoded {
    let value: serde_json::Value = match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Cache metadata is not valid JSON, starting empty");
            return Decoded::Corrupt;
        }
    };

    let version = value.get("version").and_then(|v| v.as_u64()).unwrap_or(1);
    match version {
        2 => match serde_json::from_value::<MetadataDocument>(value) {
            Ok(doc) => Decoded::Current(doc.entries),
            Err(e) => {
                warn!(error = %e, "Cache metadata does not match schema v2, starting empty");
                Decoded::Corrupt
            }
        },
        1 => match serde_json::from_value::<LegacyDocument>(value) {
            Ok(doc) => Decoded::Migrated(migrate_v1(doc, ttl)),
            Err(e) => {
                warn!(error = %e, "Cache metadata does not match schema v1, starting empty");
                Decoded::Corrupt
            }
        },
        other => {
            warn!(version = other, "Unknown cache metadata version, starting empty");
            Decoded::Corrupt
        }
    }
}

fn migrate_v1(doc: LegacyDocument, ttl: &CategoryTtl) -> BTreeMap<String, CacheEntry> {
    let mut entries = BTreeMap::new();

    for (key, legacy) in doc.entries {
        let category = match legacy.category.parse::<CacheCategory>() {
            Ok(c) => c,
            Err(_) => {
                warn!(key = %key, category = %legacy.category, "Dropping v1 entry with unknown category");
                continue;
            }
        };
        let Some(extension) = legacy.extension else {
            warn!(key = %key, "Dropping v1 entry without an extension");
            continue;
        };
        let Some(timestamp) = epoch_to_datetime(legacy.created) else {
            warn!(key = %key, created = legacy.created, "Dropping v1 entry with invalid timestamp");
            continue;
        };

        entries.insert(
            key,
            CacheEntry {
                category,
                timestamp,
                ttl_days: ttl.for_category(category),
                extension,
            },
        );
    }

    entries
}

fn epoch_to_datetime(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let secs = seconds.floor();
    let nanos = ((seconds - secs) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(secs as i64, nanos)
}

/// Serializes entries as a current-version document.
pub fn encode(entries: &BTreeMap<String, CacheEntry>) -> Result<Vec<u8>, serde_json::Error> {
    #[derive(Serialize)]
    struct Borrowed<'a> {
        version: u32,
        entries: &'a BTreeMap<String, CacheEntry>,
    }

    serde_json::to_vec_pretty(&Borrowed {
        version: METADATA_VERSION,
        entries,
    })
}
