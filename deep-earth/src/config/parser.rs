//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use ini::{Ini, Properties};
use std::path::PathBuf;
use std::str::FromStr;

use super::file::ConfigFileError;
use super::settings::ConfigFile;

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Parses `key` if present, leaving `target` untouched otherwise.
fn parse_into<T: FromStr>(
    props: &Properties,
    section: &str,
    key: &str,
    reason: &str,
    target: &mut T,
) -> Result<(), ConfigFileError> {
    if let Some(v) = props.get(key) {
        *target = v.trim().parse().map_err(|_| invalid(section, key, v, reason))?;
    }
    Ok(())
}

/// Non-empty string values replace `target`; empty ones clear it.
fn optional_string(props: &Properties, key: &str, target: &mut Option<String>) {
    if let Some(v) = props.get(key) {
        let v = v.trim();
        *target = (!v.is_empty()).then(|| v.to_string());
    }
}

/// `never` or an empty value means no expiry.
fn parse_ttl(
    props: &Properties,
    section: &str,
    key: &str,
    target: &mut Option<u32>,
) -> Result<(), ConfigFileError> {
    if let Some(v) = props.get(key) {
        let t = v.trim();
        *target = if t.is_empty() || t.eq_ignore_ascii_case("never") {
            None
        } else {
            Some(t.parse().map_err(|_| {
                invalid(section, key, v, "must be a number of days or 'never'")
            })?)
        };
    }
    Ok(())
}

fn parse_weight(
    props: &Properties,
    section: &str,
    key: &str,
    target: &mut f32,
) -> Result<(), ConfigFileError> {
    const REASON: &str = "must be a number between 0 and 1";
    parse_into(props, section, key, REASON, target)?;
    if !(0.0..=1.0).contains(&*target) {
        return Err(invalid(section, key, &target.to_string(), REASON));
    }
    Ok(())
}

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [cache] section
    if let Some(section) = ini.section(Some("cache")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.cache.directory = expand_tilde(v);
            }
        }
        parse_ttl(section, "cache", "elevation_ttl_days", &mut config.cache.elevation_ttl_days)?;
        parse_ttl(section, "cache", "embedding_ttl_days", &mut config.cache.embedding_ttl_days)?;
        parse_ttl(section, "cache", "vector_ttl_days", &mut config.cache.vector_ttl_days)?;
        parse_ttl(section, "cache", "local_ttl_days", &mut config.cache.local_ttl_days)?;
    }

    // [network] section
    if let Some(section) = ini.section(Some("network")) {
        let net = &mut config.network;
        parse_into(section, "network", "timeout", "must be a positive integer (seconds)", &mut net.timeout)?;
        parse_into(section, "network", "max_retries", "must be a positive integer", &mut net.max_retries)?;
        if net.max_retries == 0 {
            return Err(invalid("network", "max_retries", "0", "must be at least 1"));
        }
        parse_into(
            section,
            "network",
            "retry_base_delay_ms",
            "must be a positive integer (milliseconds)",
            &mut net.retry_base_delay_ms,
        )?;
        parse_into(
            section,
            "network",
            "retry_max_delay_ms",
            "must be a positive integer (milliseconds)",
            &mut net.retry_max_delay_ms,
        )?;
    }

    // [elevation] section
    if let Some(section) = ini.section(Some("elevation")) {
        if let Some(v) = section.get("api_url") {
            config.elevation.api_url = v.trim().to_string();
        }
        optional_string(section, "api_key", &mut config.elevation.api_key);
        parse_into(
            section,
            "elevation",
            "fine_resolution_threshold",
            "must be a positive number (meters)",
            &mut config.elevation.fine_resolution_threshold,
        )?;
        if config.elevation.fine_resolution_threshold <= 0.0 {
            return Err(invalid(
                "elevation",
                "fine_resolution_threshold",
                &config.elevation.fine_resolution_threshold.to_string(),
                "must be a positive number (meters)",
            ));
        }
    }

    // [embedding] section
    if let Some(section) = ini.section(Some("embedding")) {
        let emb = &mut config.embedding;
        if let Some(v) = section.get("api_url") {
            emb.api_url = v.trim().to_string();
        }
        optional_string(section, "project", &mut emb.project);
        optional_string(section, "access_token", &mut emb.access_token);
        optional_string(section, "bucket", &mut emb.bucket);
        if let Some(v) = section.get("dataset_id") {
            let v = v.trim();
            if v.is_empty() {
                return Err(invalid("embedding", "dataset_id", v, "must not be empty"));
            }
            emb.dataset_id = v.to_string();
        }
        parse_into(section, "embedding", "year", "must be a year such as 2023", &mut emb.year)?;
        parse_into(
            section,
            "embedding",
            "direct_area_threshold_km2",
            "must be a number (square kilometers)",
            &mut emb.direct_area_threshold_km2,
        )?;
        parse_into(
            section,
            "embedding",
            "poll_initial_secs",
            "must be a positive integer (seconds)",
            &mut emb.poll_initial_secs,
        )?;
        parse_into(
            section,
            "embedding",
            "poll_max_secs",
            "must be a positive integer (seconds)",
            &mut emb.poll_max_secs,
        )?;
        parse_into(
            section,
            "embedding",
            "poll_timeout_secs",
            "must be a positive integer (seconds)",
            &mut emb.poll_timeout_secs,
        )?;
    }

    // [vector] section
    if let Some(section) = ini.section(Some("vector")) {
        if let Some(v) = section.get("api_url") {
            config.vector.api_url = v.trim().to_string();
        }
        parse_into(
            section,
            "vector",
            "query_timeout",
            "must be a positive integer (seconds)",
            &mut config.vector.query_timeout,
        )?;
    }

    // [quality] section
    if let Some(section) = ini.section(Some("quality")) {
        let q = &mut config.quality;
        parse_weight(section, "quality", "elevation_weight", &mut q.elevation_weight)?;
        parse_weight(section, "quality", "embedding_weight", &mut q.embedding_weight)?;
        parse_weight(section, "quality", "vector_weight", &mut q.vector_weight)?;
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = v.to_string();
            }
        }
    }

    Ok(config)
}

/// Expands a leading `~/` to the home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
