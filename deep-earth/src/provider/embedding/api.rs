//! Remote compute backend used by the embedding adapter.

use crate::provider::ProviderError;
use crate::region::RegionContext;
use std::fmt;
use std::future::Future;

/// Default annual satellite embedding collection.
pub const DEFAULT_DATASET: &str = "GOOGLE/SATELLITE_EMBEDDING/V1/ANNUAL";

/// What to compute: one year of a collection, clipped to a region and
/// reprojected server-side.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSpec {
    pub dataset_id: String,
    pub year: u16,
    pub region: RegionContext,
    /// Target UTM EPSG code
    pub epsg: u32,
    /// Target pixel size in meters
    pub scale: f64,
}

impl ImageSpec {
    /// `[start, end)` of the year as RFC 3339 timestamps.
    pub fn date_range(&self) -> (String, String) {
        (
            format!("{}-01-01T00:00:00Z", self.year),
            format!("{}-01-01T00:00:00Z", u32::from(self.year) + 1),
        )
    }
}

/// Terminal and non-terminal export job states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Running)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Running => "RUNNING",
            JobState::Completed => "COMPLETED",
            JobState::Failed => "FAILED",
            JobState::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// One poll of an export job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    pub state: JobState,
    pub error: Option<String>,
}

impl JobStatus {
    pub fn running() -> Self {
        Self {
            state: JobState::Running,
            error: None,
        }
    }
}

/// Operations the embedding adapter needs from the remote compute service
/// and its intermediate object storage.
pub trait EarthEngineApi: Send + Sync {
    /// Verifies credentials and connectivity. Called at most once per adapter.
    fn initialize(&self) -> impl Future<Output = Result<(), ProviderError>> + Send;

    /// Number of images in the collection for the requested year and region.
    fn image_count(&self, spec: &ImageSpec) -> impl Future<Output = Result<usize, ProviderError>> + Send;

    /// Prepares a synchronous download and returns its URL.
    ///
    /// Fails with [`ProviderError::PayloadTooLarge`] when the result exceeds
    /// the synchronous limit.
    fn download_url(&self, spec: &ImageSpec) -> impl Future<Output = Result<String, ProviderError>> + Send;

    /// Fetches bytes from a URL returned by [`download_url`](Self::download_url).
    fn fetch_url(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, ProviderError>> + Send;

    /// Submits a GeoTIFF export to `bucket` under `object_prefix` and
    /// returns the job id. The object is written as `<object_prefix>.tif`.
    fn start_export(
        &self,
        spec: &ImageSpec,
        bucket: &str,
        object_prefix: &str,
    ) -> impl Future<Output = Result<String, ProviderError>> + Send;

    fn job_status(&self, job_id: &str) -> impl Future<Output = Result<JobStatus, ProviderError>> + Send;

    fn cancel_job(&self, job_id: &str) -> impl Future<Output = Result<(), ProviderError>> + Send;

    fn read_object(
        &self,
        bucket: &str,
        object: &str,
    ) -> impl Future<Output = Result<Vec<u8>, ProviderError>> + Send;

    fn delete_object(
        &self,
        bucket: &str,
        object: &str,
    ) -> impl Future<Output = Result<(), ProviderError>> + Send;
}
