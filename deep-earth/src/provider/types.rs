//! Provider types and traits

use crate::harmonize::MasterGrid;
use crate::region::RegionContext;
use sha2::{Digest, Sha256};
use std::fmt;
use std::future::Future;
use std::path::PathBuf;

/// Default embedding year.
pub const DEFAULT_YEAR: u16 = 2023;

/// Errors that can occur during provider operations.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Transport failure or non-success HTTP status
    Network {
        status: Option<u16>,
        message: String,
    },
    /// Missing or rejected credentials
    Credentials(String),
    /// Remote export job failed or was cancelled
    RemoteJob(String),
    /// Remote export job did not finish in time
    JobTimeout { job_id: String, waited_secs: u64 },
    /// Synchronous download refused because the result is too large
    PayloadTooLarge(String),
    /// Request could not be built
    InvalidRequest(String),
    /// Response body could not be understood
    InvalidResponse(String),
    /// Raster decoding or resampling failed
    Raster(String),
    /// Cache write failed
    Cache(String),
}

impl ProviderError {
    /// Whether a retry may succeed: transport errors, 429 and 5xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Network { status: None, .. } => true,
            ProviderError::Network {
                status: Some(code), ..
            } => *code == 429 || *code >= 500,
            _ => false,
        }
    }

    pub(crate) fn network(message: impl Into<String>) -> Self {
        ProviderError::Network {
            status: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Network {
                status: Some(code),
                message,
            } => write!(f, "HTTP {}: {}", code, message),
            ProviderError::Network {
                status: None,
                message,
            } => write!(f, "Network error: {}", message),
            ProviderError::Credentials(msg) => write!(f, "Credential error: {}", msg),
            ProviderError::RemoteJob(msg) => write!(f, "Remote job error: {}", msg),
            ProviderError::JobTimeout {
                job_id,
                waited_secs,
            } => write!(f, "Remote job {} timed out after {}s", job_id, waited_secs),
            ProviderError::PayloadTooLarge(msg) => write!(f, "Payload too large: {}", msg),
            ProviderError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ProviderError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            ProviderError::Raster(msg) => write!(f, "Raster error: {}", msg),
            ProviderError::Cache(msg) => write!(f, "Cache error: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<crate::raster::RasterError> for ProviderError {
    fn from(e: crate::raster::RasterError) -> Self {
        ProviderError::Raster(e.to_string())
    }
}

impl From<crate::cache::CacheError> for ProviderError {
    fn from(e: crate::cache::CacheError) -> Self {
        ProviderError::Cache(e.to_string())
    }
}

/// Outcome of one source acquisition.
///
/// `Empty` means the source legitimately had nothing (or an optional
/// source degraded); it is not a failure. `Err` is surfaced to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult<T> {
    Ok(T),
    Empty(String),
    Err(String),
}

impl<T> FetchResult<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, FetchResult::Ok(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, FetchResult::Empty(_))
    }

    pub fn is_err(&self) -> bool {
        matches!(self, FetchResult::Err(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            FetchResult::Ok(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> FetchResult<U> {
        match self {
            FetchResult::Ok(value) => FetchResult::Ok(f(value)),
            FetchResult::Empty(reason) => FetchResult::Empty(reason),
            FetchResult::Err(message) => FetchResult::Err(message),
        }
    }
}

impl<T> From<Result<T, ProviderError>> for FetchResult<T> {
    fn from(result: Result<T, ProviderError>) -> Self {
        match result {
            Ok(value) => FetchResult::Ok(value),
            Err(e) => FetchResult::Err(e.to_string()),
        }
    }
}

/// Parameters of one acquisition request.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub region: RegionContext,
    /// Target resolution in meters
    pub resolution: f64,
    /// Embedding year
    pub year: u16,
    /// File or directory of local rasters
    pub local_path: Option<PathBuf>,
}

impl FetchRequest {
    pub fn new(region: RegionContext, resolution: f64) -> Self {
        Self {
            region,
            resolution,
            year: DEFAULT_YEAR,
            local_path: None,
        }
    }

    pub fn with_year(mut self, year: u16) -> Self {
        self.year = year;
        self
    }

    pub fn with_local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    /// Canonical parameter string shared by every cache key.
    pub fn fingerprint(&self) -> String {
        format!("{}|{}", self.region, self.resolution)
    }
}

/// Deterministic cache key: `<prefix>_<first 16 hex chars of sha256(parts)>`.
pub fn cache_key(prefix: &str, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"|");
        }
        hasher.update(part.as_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());
    format!("{}_{}", prefix, &digest[..16])
}

/// Capability set shared by every data source.
///
/// `fetch` consults the cache before the network and reports its outcome
/// as a [`FetchResult`]; `transform_to_grid` turns an artifact into data on
/// a [`MasterGrid`].
pub trait SourceAdapter: Send + Sync {
    /// What a successful fetch produces
    type Artifact: Send + 'static;
    /// What the artifact becomes on the master grid
    type GridOutput;

    /// Short source name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Acquires the source for a request.
    fn fetch(
        &self,
        request: &FetchRequest,
    ) -> impl Future<Output = FetchResult<Self::Artifact>> + Send;

    /// Deterministic cache key for a request.
    fn cache_key(&self, request: &FetchRequest) -> String;

    /// Whether the credentials this source needs are present.
    fn validate_credentials(&self) -> bool;

    /// Converts an artifact into grid-aligned data.
    fn transform_to_grid(
        &self,
        artifact: &Self::Artifact,
        grid: &MasterGrid,
    ) -> Result<Self::GridOutput, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(ProviderError::network("reset").is_retryable());
        assert!(ProviderError::Network {
            status: Some(503),
            message: String::new()
        }
        .is_retryable());
        assert!(ProviderError::Network {
            status: Some(429),
            message: String::new()
        }
        .is_retryable());
        assert!(!ProviderError::Network {
            status: Some(404),
            message: String::new()
        }
        .is_retryable());
        assert!(!ProviderError::Credentials("no key".into()).is_retryable());
    }

    #[test]
    fn test_cache_key_is_deterministic() {
        let region = RegionContext::new(44.9, 45.1, -93.1, -92.9).unwrap();
        let a = FetchRequest::new(region, 30.0);
        let b = FetchRequest::new(region, 30.0);
        let c = FetchRequest::new(region, 10.0);

        let key_a = cache_key("srtm", &[&a.fingerprint()]);
        assert_eq!(key_a, cache_key("srtm", &[&b.fingerprint()]));
        assert_ne!(key_a, cache_key("srtm", &[&c.fingerprint()]));
        assert!(key_a.starts_with("srtm_"));
        assert_eq!(key_a.len(), "srtm_".len() + 16);
    }

    #[test]
    fn test_fetch_result_from_result() {
        let ok: FetchResult<u8> = Ok(1).into();
        assert_eq!(ok, FetchResult::Ok(1));
        let err: FetchResult<u8> = Err(ProviderError::Credentials("x".into())).into();
        assert_eq!(err, FetchResult::Err("Credential error: x".to_string()));
    }
}
