//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file, plus a
//! conversion into the runtime type it configures.

use crate::cache::CategoryTtl;
use crate::harmonize::QualityWeights;
use crate::provider::{EmbeddingOptions, PollSchedule, RetryPolicy};
use std::path::PathBuf;
use std::time::Duration;

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub cache: CacheSettings,
    pub network: NetworkSettings,
    pub elevation: ElevationSettings,
    pub embedding: EmbeddingSettings,
    pub vector: VectorSettings,
    pub quality: QualitySettings,
    pub logging: LoggingSettings,
}

/// Cache configuration. A `None` TTL never expires.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    /// Cache root directory
    pub directory: PathBuf,
    pub elevation_ttl_days: Option<u32>,
    pub embedding_ttl_days: Option<u32>,
    pub vector_ttl_days: Option<u32>,
    pub local_ttl_days: Option<u32>,
}

impl CacheSettings {
    pub fn ttl(&self) -> CategoryTtl {
        CategoryTtl {
            elevation: self.elevation_ttl_days,
            vector: self.vector_ttl_days,
            embedding: self.embedding_ttl_days,
            local: self.local_ttl_days,
        }
    }
}

/// HTTP behaviour shared by all network adapters.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSettings {
    /// Request timeout in seconds
    pub timeout: u64,
    /// Attempts per request, including the first
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl NetworkSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }
}

/// Elevation service configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationSettings {
    pub api_url: String,
    /// OpenTopography API key
    pub api_key: Option<String>,
    /// Resolutions at or below this (meters) use the 1 arc-second product
    pub fine_resolution_threshold: f64,
}

/// Embedding service configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingSettings {
    pub api_url: String,
    /// Cloud project the requests are billed to
    pub project: Option<String>,
    /// OAuth bearer token
    pub access_token: Option<String>,
    /// Object storage bucket for export jobs
    pub bucket: Option<String>,
    pub dataset_id: String,
    /// Default embedding year
    pub year: u16,
    pub direct_area_threshold_km2: f64,
    pub poll_initial_secs: u64,
    pub poll_max_secs: u64,
    pub poll_timeout_secs: u64,
}

impl EmbeddingSettings {
    pub fn options(&self) -> EmbeddingOptions {
        EmbeddingOptions {
            dataset_id: self.dataset_id.clone(),
            bucket: self.bucket.clone(),
            direct_area_threshold_km2: self.direct_area_threshold_km2,
            poll: PollSchedule {
                initial: Duration::from_secs(self.poll_initial_secs),
                max_interval: Duration::from_secs(self.poll_max_secs),
                timeout: Duration::from_secs(self.poll_timeout_secs),
            },
        }
    }
}

/// Vector query service configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSettings {
    pub api_url: String,
    /// Server-side query timeout in seconds
    pub query_timeout: u32,
}

/// Quality score weights.
#[derive(Debug, Clone, PartialEq)]
pub struct QualitySettings {
    pub elevation_weight: f32,
    pub embedding_weight: f32,
    pub vector_weight: f32,
}

impl QualitySettings {
    pub fn weights(&self) -> QualityWeights {
        QualityWeights {
            elevation: self.elevation_weight,
            embedding: self.embedding_weight,
            vector: self.vector_weight,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    /// Directory for log files
    pub directory: PathBuf,
    /// Log file name
    pub file: String,
}
