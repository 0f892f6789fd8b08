//! Satellite embedding provider.
//!
//! Embeddings come from a remote compute service (Earth Engine). The
//! backend client is initialized lazily on first fetch; if that fails the
//! adapter stays disabled for its lifetime and every fetch returns
//! `Empty`. Embeddings are an optional enhancement, so every failure past
//! the cache check degrades to `Empty` with a logged reason.
//!
//! # Strategy
//!
//! Regions smaller than the direct-download threshold are fetched through
//! a synchronous download URL. Larger regions, or direct downloads refused
//! as too large, go through an export job to intermediate object storage
//! which is polled, downloaded and then deleted.

mod api;
mod rest;

pub use api::{EarthEngineApi, ImageSpec, JobState, JobStatus, DEFAULT_DATASET};
pub use rest::{image_expression, EarthEngineRestClient, DEFAULT_EARTH_ENGINE_URL, DEFAULT_STORAGE_URL};

use super::retry::RetryPolicy;
use super::types::{cache_key, FetchRequest, FetchResult, ProviderError, SourceAdapter};
use crate::cache::{CacheCategory, CacheStore};
use crate::harmonize::MasterGrid;
use crate::raster::{looks_like_tiff, read_geotiff, BandSelection, GridArray};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const CACHE_EXTENSION: &str = "tif";

/// Export job polling schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    /// First wait between status checks
    pub initial: Duration,
    /// Ceiling for the doubling interval
    pub max_interval: Duration,
    /// Wall-clock limit before the job is cancelled
    pub timeout: Duration,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(5),
            max_interval: Duration::from_secs(60),
            timeout: Duration::from_secs(1800),
        }
    }
}

/// Embedding adapter settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingOptions {
    pub dataset_id: String,
    /// Bucket for export jobs; without one only direct downloads work
    pub bucket: Option<String>,
    /// Regions below this area (km²) try the direct download first
    pub direct_area_threshold_km2: f64,
    pub poll: PollSchedule,
}

impl Default for EmbeddingOptions {
    fn default() -> Self {
        Self {
            dataset_id: DEFAULT_DATASET.to_string(),
            bucket: None,
            direct_area_threshold_km2: 10.0,
            poll: PollSchedule::default(),
        }
    }
}

/// Lifecycle of the lazily created backend client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    Uninitialized,
    Ready,
    /// Terminal for the adapter's lifetime
    Failed(String),
}

/// Earth Engine embedding adapter.
pub struct EmbeddingAdapter<A: EarthEngineApi> {
    api: A,
    cache: Arc<CacheStore>,
    options: EmbeddingOptions,
    retry: RetryPolicy,
    client: OnceCell<Result<(), String>>,
}

impl<A: EarthEngineApi> EmbeddingAdapter<A> {
    pub fn new(api: A, cache: Arc<CacheStore>, options: EmbeddingOptions) -> Self {
        Self {
            api,
            cache,
            options,
            retry: RetryPolicy::default(),
            client: OnceCell::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn options(&self) -> &EmbeddingOptions {
        &self.options
    }

    pub fn client_state(&self) -> ClientState {
        match self.client.get() {
            None => ClientState::Uninitialized,
            Some(Ok(())) => ClientState::Ready,
            Some(Err(reason)) => ClientState::Failed(reason.clone()),
        }
    }

    /// Initializes the backend once; later calls reuse the outcome.
    async fn ensure_client(&self) -> Result<(), String> {
        self.client
            .get_or_init(|| async {
                match self.api.initialize().await {
                    Ok(()) => {
                        info!("Embedding client initialized");
                        Ok(())
                    }
                    Err(e) => {
                        warn!(error = %e, "Embedding client unavailable, embeddings disabled");
                        Err(e.to_string())
                    }
                }
            })
            .await
            .clone()
    }

    pub fn image_spec(&self, request: &FetchRequest) -> ImageSpec {
        ImageSpec {
            dataset_id: self.options.dataset_id.clone(),
            year: request.year,
            region: request.region,
            epsg: request.region.epsg(),
            scale: request.resolution,
        }
    }

    fn use_direct(&self, request: &FetchRequest) -> bool {
        request.region.area_km2() < self.options.direct_area_threshold_km2
    }

    async fn download(&self, spec: &ImageSpec, direct: bool, key: &str) -> Result<Vec<u8>, ProviderError> {
        if direct {
            match self.download_direct(spec).await {
                Ok(bytes) => return Ok(bytes),
                Err(ProviderError::PayloadTooLarge(reason)) => {
                    info!(reason = %reason, "Direct download too large, using export job");
                }
                Err(e) => return Err(e),
            }
        }
        self.export_batch(spec, key).await
    }

    async fn download_direct(&self, spec: &ImageSpec) -> Result<Vec<u8>, ProviderError> {
        let url = self.api.download_url(spec).await?;
        debug!(url = %url, "Direct embedding download");
        self.retry
            .run("embedding download", || self.api.fetch_url(&url))
            .await
    }

    async fn export_batch(&self, spec: &ImageSpec, key: &str) -> Result<Vec<u8>, ProviderError> {
        let bucket = self.options.bucket.as_deref().ok_or_else(|| {
            ProviderError::Credentials("no export bucket configured".to_string())
        })?;
        let prefix = format!("deep_earth/{}_{}", key, Utc::now().timestamp_millis());
        let object = format!("{}.tif", prefix);

        let job_id = self.api.start_export(spec, bucket, &prefix).await?;
        info!(job_id = %job_id, bucket = bucket, object = %object, "Embedding export started");
        self.wait_for_job(&job_id).await?;

        let bytes = self
            .retry
            .run("embedding export download", || {
                self.api.read_object(bucket, &object)
            })
            .await?;

        if let Err(e) = self.api.delete_object(bucket, &object).await {
            warn!(bucket = bucket, object = %object, error = %e, "Failed to delete export object");
        }
        Ok(bytes)
    }

    /// Polls until the job is terminal, doubling the interval up to the cap.
    /// On timeout the job is cancelled.
    async fn wait_for_job(&self, job_id: &str) -> Result<(), ProviderError> {
        let schedule = self.options.poll;
        let started = Instant::now();
        let mut interval = schedule.initial;

        loop {
            let status = self
                .retry
                .run("export status", || self.api.job_status(job_id))
                .await?;
            match status.state {
                JobState::Completed => {
                    debug!(job_id = job_id, elapsed_secs = started.elapsed().as_secs(), "Export finished");
                    return Ok(());
                }
                JobState::Failed | JobState::Cancelled => {
                    return Err(ProviderError::RemoteJob(format!(
                        "export {} {}: {}",
                        job_id,
                        status.state,
                        status.error.unwrap_or_else(|| "no message".to_string())
                    )));
                }
                JobState::Running => {}
            }

            let waited = started.elapsed();
            if waited >= schedule.timeout {
                if let Err(e) = self.api.cancel_job(job_id).await {
                    warn!(job_id = job_id, error = %e, "Failed to cancel timed out export");
                }
                return Err(ProviderError::JobTimeout {
                    job_id: job_id.to_string(),
                    waited_secs: waited.as_secs(),
                });
            }

            tokio::time::sleep(interval.min(schedule.timeout - waited)).await;
            interval = (interval * 2).min(schedule.max_interval);
        }
    }

    async fn acquire(&self, request: &FetchRequest, key: &str) -> FetchResult<PathBuf> {
        let spec = self.image_spec(request);

        match self.api.image_count(&spec).await {
            Ok(0) => {
                info!(year = spec.year, dataset = %spec.dataset_id, "No embedding imagery for region");
                return FetchResult::Empty(format!("no embedding imagery for {}", spec.year));
            }
            Ok(count) => debug!(images = count, "Embedding imagery found"),
            Err(e) => {
                warn!(error = %e, "Embedding image query failed");
                return FetchResult::Empty(format!("image query failed: {}", e));
            }
        }

        let direct = self.use_direct(request);
        let result = self.download(&spec, direct, key).await.and_then(|bytes| {
            if !looks_like_tiff(&bytes) {
                return Err(ProviderError::InvalidResponse(
                    "embedding download is not a GeoTIFF".to_string(),
                ));
            }
            Ok(self
                .cache
                .save(key, &bytes, CacheCategory::Embedding, CACHE_EXTENSION)?)
        });

        match result {
            Ok(path) => FetchResult::Ok(path),
            Err(e) => {
                warn!(error = %e, direct = direct, "Embedding fetch failed, continuing without embeddings");
                FetchResult::Empty(e.to_string())
            }
        }
    }
}

impl<A: EarthEngineApi> SourceAdapter for EmbeddingAdapter<A> {
    type Artifact = PathBuf;
    type GridOutput = GridArray;

    fn name(&self) -> &'static str {
        "embedding"
    }

    async fn fetch(&self, request: &FetchRequest) -> FetchResult<PathBuf> {
        let key = self.cache_key(request);
        if let Some(path) = self
            .cache
            .get_path(&key, CacheCategory::Embedding, CACHE_EXTENSION)
        {
            debug!(key = %key, "Embedding cache hit");
            return FetchResult::Ok(path);
        }

        if let Err(reason) = self.ensure_client().await {
            return FetchResult::Empty(format!("embedding client unavailable: {}", reason));
        }
        self.acquire(request, &key).await
    }

    fn cache_key(&self, request: &FetchRequest) -> String {
        cache_key(
            "gee",
            &[
                &request.fingerprint(),
                &request.year.to_string(),
                &self.options.dataset_id,
            ],
        )
    }

    /// True until initialization has failed.
    fn validate_credentials(&self) -> bool {
        !matches!(self.client_state(), ClientState::Failed(_))
    }

    /// Reads every band and resamples it onto the grid.
    fn transform_to_grid(
        &self,
        artifact: &PathBuf,
        grid: &MasterGrid,
    ) -> Result<GridArray, ProviderError> {
        let raster = read_geotiff(artifact)?;
        Ok(grid.resample(&raster, &BandSelection::All)?)
    }
}

#[cfg(test)]
mod tests;
