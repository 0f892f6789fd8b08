//! Default values and constants for all configuration settings.

use std::path::PathBuf;

use super::settings::*;
use crate::provider::embedding::{DEFAULT_DATASET, DEFAULT_EARTH_ENGINE_URL};
use crate::provider::vector::DEFAULT_QUERY_TIMEOUT;
use crate::provider::{DEFAULT_ELEVATION_URL, DEFAULT_FINE_THRESHOLD, DEFAULT_OVERPASS_URL, DEFAULT_YEAR};

// =============================================================================
// Cache
// =============================================================================

/// Embedding TTL in days
pub const DEFAULT_EMBEDDING_TTL_DAYS: u32 = 365;
/// Vector TTL in days
pub const DEFAULT_VECTOR_TTL_DAYS: u32 = 30;
/// Local composite TTL in days
pub const DEFAULT_LOCAL_TTL_DAYS: u32 = 7;

/// Platform cache directory joined with `deep_earth`.
pub fn default_cache_directory() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("deep_earth")
}

// =============================================================================
// Network
// =============================================================================

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 2000;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 30000;

// =============================================================================
// Embedding
// =============================================================================

pub const DEFAULT_DIRECT_AREA_THRESHOLD_KM2: f64 = 10.0;
pub const DEFAULT_POLL_INITIAL_SECS: u64 = 5;
pub const DEFAULT_POLL_MAX_SECS: u64 = 60;
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 1800;

// =============================================================================
// Quality
// =============================================================================

pub const DEFAULT_ELEVATION_WEIGHT: f32 = 0.25;
pub const DEFAULT_EMBEDDING_WEIGHT: f32 = 0.5;
pub const DEFAULT_VECTOR_WEIGHT: f32 = 0.25;

// =============================================================================
// Logging
// =============================================================================

pub const DEFAULT_LOG_DIRECTORY: &str = "logs";
pub const DEFAULT_LOG_FILE: &str = "deep_earth.log";

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            cache: CacheSettings {
                directory: default_cache_directory(),
                elevation_ttl_days: None,
                embedding_ttl_days: Some(DEFAULT_EMBEDDING_TTL_DAYS),
                vector_ttl_days: Some(DEFAULT_VECTOR_TTL_DAYS),
                local_ttl_days: Some(DEFAULT_LOCAL_TTL_DAYS),
            },
            network: NetworkSettings {
                timeout: DEFAULT_TIMEOUT_SECS,
                max_retries: DEFAULT_MAX_RETRIES,
                retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
                retry_max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
            },
            elevation: ElevationSettings {
                api_url: DEFAULT_ELEVATION_URL.to_string(),
                api_key: None,
                fine_resolution_threshold: DEFAULT_FINE_THRESHOLD,
            },
            embedding: EmbeddingSettings {
                api_url: DEFAULT_EARTH_ENGINE_URL.to_string(),
                project: None,
                access_token: None,
                bucket: None,
                dataset_id: DEFAULT_DATASET.to_string(),
                year: DEFAULT_YEAR,
                direct_area_threshold_km2: DEFAULT_DIRECT_AREA_THRESHOLD_KM2,
                poll_initial_secs: DEFAULT_POLL_INITIAL_SECS,
                poll_max_secs: DEFAULT_POLL_MAX_SECS,
                poll_timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
            },
            vector: VectorSettings {
                api_url: DEFAULT_OVERPASS_URL.to_string(),
                query_timeout: DEFAULT_QUERY_TIMEOUT,
            },
            quality: QualitySettings {
                elevation_weight: DEFAULT_ELEVATION_WEIGHT,
                embedding_weight: DEFAULT_EMBEDDING_WEIGHT,
                vector_weight: DEFAULT_VECTOR_WEIGHT,
            },
            logging: LoggingSettings {
                directory: PathBuf::from(DEFAULT_LOG_DIRECTORY),
                file: DEFAULT_LOG_FILE.to_string(),
            },
        }
    }
}
