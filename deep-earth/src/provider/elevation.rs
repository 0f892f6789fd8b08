//! Digital elevation model provider.
//!
//! Downloads SRTM GeoTIFFs from the OpenTopography global DEM API.
//!
//! # API Endpoint
//!
//! `GET {api_url}?demtype=SRTMGL1&south=..&north=..&west=..&east=..&outputFormat=GTiff&API_Key=..`
//!
//! The 1 arc-second product (`SRTMGL1`) is requested when the target
//! resolution is at or below the fine threshold, the 3 arc-second product
//! (`SRTMGL3`) otherwise.
//!
//! Elevation is mandatory: a missing key, an exhausted retry budget or a
//! non-raster response is an `Err`, never `Empty`.

use super::http::AsyncHttpClient;
use super::retry::RetryPolicy;
use super::types::{cache_key, FetchRequest, FetchResult, ProviderError, SourceAdapter};
use crate::cache::{CacheCategory, CacheStore};
use crate::harmonize::MasterGrid;
use crate::raster::{looks_like_tiff, read_geotiff, BandSelection, GridArray};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Default OpenTopography global DEM endpoint.
pub const DEFAULT_ELEVATION_URL: &str = "https://portal.opentopography.org/API/globaldem";

/// Resolutions at or below this (meters) use the 1 arc-second product.
pub const DEFAULT_FINE_THRESHOLD: f64 = 30.0;

const CACHE_EXTENSION: &str = "tif";

/// OpenTopography SRTM adapter.
pub struct ElevationAdapter<C: AsyncHttpClient> {
    http_client: C,
    cache: Arc<CacheStore>,
    api_url: String,
    api_key: Option<String>,
    fine_threshold: f64,
    retry: RetryPolicy,
}

impl<C: AsyncHttpClient> ElevationAdapter<C> {
    pub fn new(http_client: C, cache: Arc<CacheStore>, api_key: Option<String>) -> Self {
        Self {
            http_client,
            cache,
            api_url: DEFAULT_ELEVATION_URL.to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            fine_threshold: DEFAULT_FINE_THRESHOLD,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_fine_threshold(mut self, meters: f64) -> Self {
        self.fine_threshold = meters;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// SRTM product for a target resolution.
    pub fn dem_type(&self, resolution: f64) -> &'static str {
        if resolution <= self.fine_threshold {
            "SRTMGL1"
        } else {
            "SRTMGL3"
        }
    }

    /// Full request URL, API key included.
    pub fn request_url(&self, request: &FetchRequest, api_key: &str) -> Result<String, ProviderError> {
        let region = &request.region;
        let params = [
            ("demtype", self.dem_type(request.resolution).to_string()),
            ("south", region.lat_min().to_string()),
            ("north", region.lat_max().to_string()),
            ("west", region.lon_min().to_string()),
            ("east", region.lon_max().to_string()),
            ("outputFormat", "GTiff".to_string()),
            ("API_Key", api_key.to_string()),
        ];
        reqwest::Url::parse_with_params(&self.api_url, &params)
            .map(String::from)
            .map_err(|e| ProviderError::InvalidRequest(format!("{}: {}", self.api_url, e)))
    }

    async fn download(&self, request: &FetchRequest, key: &str) -> Result<PathBuf, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ProviderError::Credentials("OpenTopography API key is not configured".to_string())
        })?;
        let url = self.request_url(request, api_key)?;

        info!(
            region = %request.region,
            demtype = self.dem_type(request.resolution),
            "Downloading elevation"
        );
        let bytes = self
            .retry
            .run("elevation download", || self.http_client.get(&url))
            .await?;

        if !looks_like_tiff(&bytes) {
            let excerpt: String = String::from_utf8_lossy(&bytes).chars().take(200).collect();
            return Err(ProviderError::InvalidResponse(format!(
                "Elevation service did not return a GeoTIFF: {}",
                excerpt
            )));
        }

        let path = self
            .cache
            .save(key, &bytes, CacheCategory::Elevation, CACHE_EXTENSION)?;
        debug!(key = key, bytes = bytes.len(), "Elevation cached");
        Ok(path)
    }
}

impl<C: AsyncHttpClient> SourceAdapter for ElevationAdapter<C> {
    type Artifact = PathBuf;
    type GridOutput = GridArray;

    fn name(&self) -> &'static str {
        "elevation"
    }

    async fn fetch(&self, request: &FetchRequest) -> FetchResult<PathBuf> {
        let key = self.cache_key(request);
        if let Some(path) = self
            .cache
            .get_path(&key, CacheCategory::Elevation, CACHE_EXTENSION)
        {
            debug!(key = %key, "Elevation cache hit");
            return FetchResult::Ok(path);
        }
        self.download(request, &key).await.into()
    }

    fn cache_key(&self, request: &FetchRequest) -> String {
        cache_key("srtm", &[&request.fingerprint()])
    }

    fn validate_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    /// Reads band 1 and resamples it onto the grid.
    fn transform_to_grid(
        &self,
        artifact: &PathBuf,
        grid: &MasterGrid,
    ) -> Result<GridArray, ProviderError> {
        let raster = read_geotiff(artifact)?;
        Ok(grid.resample(&raster, &BandSelection::One(1))?)
    }
}
