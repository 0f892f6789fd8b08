//! INI serialization logic for converting `ConfigFile` → INI string.

use std::path::Path;

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let ttl = |days: Option<u32>| days.map(|d| d.to_string()).unwrap_or_else(|| "never".to_string());
    let opt = |value: &Option<String>| value.clone().unwrap_or_default();

    format!(
        r#"[cache]
; Root directory for cached downloads and cache_metadata.json
directory = {}
; Time-to-live per category in days, or 'never'
elevation_ttl_days = {}
embedding_ttl_days = {}
vector_ttl_days = {}
local_ttl_days = {}

[network]
; HTTP request timeout in seconds (default: 60)
timeout = {}
; Attempts per request including the first (default: 3)
max_retries = {}
; Exponential backoff: base delay doubled per retry, capped at the maximum
retry_base_delay_ms = {}
retry_max_delay_ms = {}

[elevation]
; OpenTopography global DEM endpoint
api_url = {}
; API key from https://portal.opentopography.org/
api_key = {}
; Resolutions at or below this many meters use SRTMGL1, otherwise SRTMGL3
fine_resolution_threshold = {}

[embedding]
; Earth Engine REST endpoint
api_url = {}
; Cloud project and OAuth access token; embeddings are skipped when unset
project = {}
access_token = {}
; Bucket for export jobs on large regions (optional)
bucket = {}
dataset_id = {}
; Default embedding year
year = {}
; Regions smaller than this (km2) try a direct download first
direct_area_threshold_km2 = {}
; Export job polling: initial interval, interval cap, overall timeout (seconds)
poll_initial_secs = {}
poll_max_secs = {}
poll_timeout_secs = {}

[vector]
; Overpass interpreter endpoint
api_url = {}
; Server-side query timeout in seconds
query_timeout = {}

[quality]
; Contribution of each source to the quality score (0-1)
elevation_weight = {}
embedding_weight = {}
vector_weight = {}

[logging]
directory = {}
file = {}
"#,
        path_to_string(&config.cache.directory),
        ttl(config.cache.elevation_ttl_days),
        ttl(config.cache.embedding_ttl_days),
        ttl(config.cache.vector_ttl_days),
        ttl(config.cache.local_ttl_days),
        config.network.timeout,
        config.network.max_retries,
        config.network.retry_base_delay_ms,
        config.network.retry_max_delay_ms,
        config.elevation.api_url,
        opt(&config.elevation.api_key),
        config.elevation.fine_resolution_threshold,
        config.embedding.api_url,
        opt(&config.embedding.project),
        opt(&config.embedding.access_token),
        opt(&config.embedding.bucket),
        config.embedding.dataset_id,
        config.embedding.year,
        config.embedding.direct_area_threshold_km2,
        config.embedding.poll_initial_secs,
        config.embedding.poll_max_secs,
        config.embedding.poll_timeout_secs,
        config.vector.api_url,
        config.vector.query_timeout,
        config.quality.elevation_weight,
        config.quality.embedding_weight,
        config.quality.vector_weight,
        path_to_string(&config.logging.directory),
        config.logging.file,
    )
}

fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use crate::config::ConfigFile;
    use tempfile::TempDir;

    #[test]
    fn test_save_then_load_preserves_values() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.ini");

        let mut config = ConfigFile::default();
        config.cache.directory = temp_dir.path().join("cache");
        config.cache.vector_ttl_days = None;
        config.elevation.api_key = Some("key".to_string());
        config.embedding.bucket = Some("exports".to_string());
        config.quality.vector_weight = 0.1;
        config.save_to(&path).unwrap();

        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_written_file_is_commented() {
        let content = super::to_config_string(&ConfigFile::default());
        assert!(content.contains("[embedding]"));
        assert!(content.contains("; Time-to-live per category"));
        assert!(content.contains("elevation_ttl_days = never"));
        assert!(content.contains("vector_ttl_days = 30"));
    }
}
