//! Core types for the cache store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Fixed set of cache categories, one subdirectory each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheCategory {
    Elevation,
    Vector,
    Embedding,
    Local,
}

impl CacheCategory {
    pub const ALL: [CacheCategory; 4] = [
        CacheCategory::Elevation,
        CacheCategory::Vector,
        CacheCategory::Embedding,
        CacheCategory::Local,
    ];

    /// Directory / metadata name of the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheCategory::Elevation => "elevation",
            CacheCategory::Vector => "vector",
            CacheCategory::Embedding => "embedding",
            CacheCategory::Local => "local",
        }
    }
}

impl fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheCategory {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CacheCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CacheError::UnknownCategory(s.to_string()))
    }
}

/// Per-category time-to-live in days. `None` never expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryTtl {
    pub elevation: Option<u32>,
    pub vector: Option<u32>,
    pub embedding: Option<u32>,
    pub local: Option<u32>,
}

impl CategoryTtl {
    /// A configuration where nothing ever expires.
    pub fn never() -> Self {
        Self {
            elevation: None,
            vector: None,
            embedding: None,
            local: None,
        }
    }

    pub fn for_category(&self, category: CacheCategory) -> Option<u32> {
        match category {
            CacheCategory::Elevation => self.elevation,
            CacheCategory::Vector => self.vector,
            CacheCategory::Embedding => self.embedding,
            CacheCategory::Local => self.local,
        }
    }
}

impl Default for CategoryTtl {
    fn default() -> Self {
        Self {
            elevation: None,
            vector: Some(30),
            embedding: Some(365),
            local: Some(7),
        }
    }
}

/// Cache-related errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O error while writing cached data
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Category name not in the fixed set
    #[error("Unknown cache category: {0}")]
    UnknownCategory(String),

    /// Key would escape its category directory
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),
}
