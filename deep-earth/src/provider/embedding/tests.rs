use super::*;
use crate::cache::CategoryTtl;
use crate::raster::{encode_geotiff, Crs, GeoTransform, Raster, RasterDataType};
use crate::region::RegionContext;
use ndarray::Array3;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

/// Scripted Earth Engine backend.
struct MockEarthEngine {
    init: Result<(), ProviderError>,
    images: usize,
    direct: Result<Vec<u8>, ProviderError>,
    states: Mutex<VecDeque<JobState>>,
    export_bytes: Vec<u8>,
    init_calls: AtomicUsize,
    direct_calls: AtomicUsize,
    export_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
    deleted: Mutex<Vec<String>>,
}

impl MockEarthEngine {
    fn new() -> Self {
        Self {
            init: Ok(()),
            images: 1,
            direct: Ok(embedding_tiff()),
            states: Mutex::new(VecDeque::new()),
            export_bytes: embedding_tiff(),
            init_calls: AtomicUsize::new(0),
            direct_calls: AtomicUsize::new(0),
            export_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            deleted: Mutex::new(Vec::new()),
        }
    }

    fn with_states(self, states: &[JobState]) -> Self {
        *self.states.lock().unwrap() = states.iter().copied().collect();
        self
    }
}

impl EarthEngineApi for MockEarthEngine {
    async fn initialize(&self) -> Result<(), ProviderError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        self.init.clone()
    }

    async fn image_count(&self, _spec: &ImageSpec) -> Result<usize, ProviderError> {
        Ok(self.images)
    }

    async fn download_url(&self, _spec: &ImageSpec) -> Result<String, ProviderError> {
        self.direct_calls.fetch_add(1, Ordering::SeqCst);
        match &self.direct {
            Err(ProviderError::PayloadTooLarge(m)) => Err(ProviderError::PayloadTooLarge(m.clone())),
            _ => Ok("https://example.invalid/pixels".to_string()),
        }
    }

    async fn fetch_url(&self, _url: &str) -> Result<Vec<u8>, ProviderError> {
        self.direct.clone()
    }

    async fn start_export(
        &self,
        _spec: &ImageSpec,
        _bucket: &str,
        _object_prefix: &str,
    ) -> Result<String, ProviderError> {
        self.export_calls.fetch_add(1, Ordering::SeqCst);
        Ok("projects/p/operations/job-1".to_string())
    }

    async fn job_status(&self, _job_id: &str) -> Result<JobStatus, ProviderError> {
        let state = self
            .states
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(JobState::Running);
        Ok(JobStatus {
            state,
            error: (state == JobState::Failed).then(|| "boom".to_string()),
        })
    }

    async fn cancel_job(&self, _job_id: &str) -> Result<(), ProviderError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn read_object(&self, _bucket: &str, _object: &str) -> Result<Vec<u8>, ProviderError> {
        Ok(self.export_bytes.clone())
    }

    async fn delete_object(&self, _bucket: &str, object: &str) -> Result<(), ProviderError> {
        self.deleted.lock().unwrap().push(object.to_string());
        Err(ProviderError::network("delete refused"))
    }
}

fn embedding_tiff() -> Vec<u8> {
    let region = small_region();
    let bbox = region.projected_bbox();
    let raster = Raster {
        data: Array3::from_elem((4, 6, 6), 0.5),
        transform: GeoTransform::from_bounds(
            bbox.min_x - 100.0,
            bbox.min_y - 100.0,
            bbox.max_x + 100.0,
            bbox.max_y + 100.0,
            6,
            6,
        ),
        crs: Crs::Utm(region.utm_zone()),
        data_type: RasterDataType::F32,
        nodata: None,
    };
    encode_geotiff(&raster).unwrap()
}

/// About 2.2 km × 1.6 km, under the direct threshold.
fn small_region() -> RegionContext {
    RegionContext::new(45.0, 45.02, -93.0, -92.98).unwrap()
}

/// About 22 km × 16 km, over the direct threshold.
fn large_region() -> RegionContext {
    RegionContext::new(45.0, 45.2, -93.2, -93.0).unwrap()
}

fn store(dir: &TempDir) -> Arc<CacheStore> {
    Arc::new(CacheStore::open(dir.path(), CategoryTtl::default()).unwrap())
}

fn options_with_bucket() -> EmbeddingOptions {
    EmbeddingOptions {
        bucket: Some("exports".to_string()),
        ..EmbeddingOptions::default()
    }
}

#[tokio::test]
async fn test_small_region_uses_direct_download() {
    let dir = TempDir::new().unwrap();
    let adapter = EmbeddingAdapter::new(MockEarthEngine::new(), store(&dir), options_with_bucket());

    let result = adapter.fetch(&FetchRequest::new(small_region(), 10.0)).await;
    assert!(result.is_ok(), "{:?}", result);
    assert_eq!(adapter.api.direct_calls.load(Ordering::SeqCst), 1);
    assert_eq!(adapter.api.export_calls.load(Ordering::SeqCst), 0);
    assert_eq!(adapter.client_state(), ClientState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_large_region_uses_export_and_deletes_object() {
    let dir = TempDir::new().unwrap();
    let api = MockEarthEngine::new().with_states(&[JobState::Running, JobState::Completed]);
    let adapter = EmbeddingAdapter::new(api, store(&dir), options_with_bucket());

    let result = adapter.fetch(&FetchRequest::new(large_region(), 10.0)).await;
    // Delete failure is only logged
    assert!(result.is_ok(), "{:?}", result);
    assert_eq!(adapter.api.direct_calls.load(Ordering::SeqCst), 0);
    assert_eq!(adapter.api.export_calls.load(Ordering::SeqCst), 1);

    let deleted = adapter.api.deleted.lock().unwrap();
    assert_eq!(deleted.len(), 1);
    assert!(deleted[0].starts_with("deep_earth/gee_"));
    assert!(deleted[0].ends_with(".tif"));
}

#[tokio::test(start_paused = true)]
async fn test_too_large_falls_back_to_export() {
    let dir = TempDir::new().unwrap();
    let mut api = MockEarthEngine::new().with_states(&[JobState::Completed]);
    api.direct = Err(ProviderError::PayloadTooLarge("50 MB".into()));
    let adapter = EmbeddingAdapter::new(api, store(&dir), options_with_bucket());

    let result = adapter.fetch(&FetchRequest::new(small_region(), 10.0)).await;
    assert!(result.is_ok(), "{:?}", result);
    assert_eq!(adapter.api.direct_calls.load(Ordering::SeqCst), 1);
    assert_eq!(adapter.api.export_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_initialization_failure_is_sticky() {
    let dir = TempDir::new().unwrap();
    let mut api = MockEarthEngine::new();
    api.init = Err(ProviderError::Credentials("no token".into()));
    let adapter = EmbeddingAdapter::new(api, store(&dir), options_with_bucket());
    let request = FetchRequest::new(small_region(), 10.0);

    assert!(adapter.fetch(&request).await.is_empty());
    assert!(adapter.fetch(&request).await.is_empty());
    assert_eq!(adapter.api.init_calls.load(Ordering::SeqCst), 1);
    assert!(matches!(adapter.client_state(), ClientState::Failed(_)));
    assert!(!adapter.validate_credentials());
}

#[tokio::test]
async fn test_no_imagery_is_empty() {
    let dir = TempDir::new().unwrap();
    let mut api = MockEarthEngine::new();
    api.images = 0;
    let adapter = EmbeddingAdapter::new(api, store(&dir), options_with_bucket());

    let result = adapter.fetch(&FetchRequest::new(small_region(), 10.0)).await;
    assert!(result.is_empty());
    assert_eq!(adapter.api.direct_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_job_is_empty() {
    let dir = TempDir::new().unwrap();
    let api = MockEarthEngine::new().with_states(&[JobState::Running, JobState::Failed]);
    let adapter = EmbeddingAdapter::new(api, store(&dir), options_with_bucket());

    let result = adapter.fetch(&FetchRequest::new(large_region(), 10.0)).await;
    assert!(matches!(result, FetchResult::Empty(ref reason) if reason.contains("FAILED")));
}

#[tokio::test(start_paused = true)]
async fn test_poll_timeout_cancels_job() {
    let dir = TempDir::new().unwrap();
    let options = EmbeddingOptions {
        poll: PollSchedule {
            initial: Duration::from_secs(5),
            max_interval: Duration::from_secs(60),
            timeout: Duration::from_secs(300),
        },
        ..options_with_bucket()
    };
    let adapter = EmbeddingAdapter::new(MockEarthEngine::new(), store(&dir), options);

    let result = adapter.fetch(&FetchRequest::new(large_region(), 10.0)).await;
    assert!(matches!(result, FetchResult::Empty(ref reason) if reason.contains("timed out")));
    assert_eq!(adapter.api.cancel_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_export_without_bucket_is_empty() {
    let dir = TempDir::new().unwrap();
    let adapter = EmbeddingAdapter::new(MockEarthEngine::new(), store(&dir), EmbeddingOptions::default());

    let result = adapter.fetch(&FetchRequest::new(large_region(), 10.0)).await;
    assert!(result.is_empty());
    assert_eq!(adapter.api.export_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cache_hit_skips_initialization() {
    let dir = TempDir::new().unwrap();
    let cache = store(&dir);
    let adapter = EmbeddingAdapter::new(MockEarthEngine::new(), cache.clone(), options_with_bucket());
    let request = FetchRequest::new(small_region(), 10.0);
    cache
        .save(&adapter.cache_key(&request), &embedding_tiff(), CacheCategory::Embedding, "tif")
        .unwrap();

    assert!(adapter.fetch(&request).await.is_ok());
    assert_eq!(adapter.client_state(), ClientState::Uninitialized);
}

#[tokio::test]
async fn test_transform_to_grid_keeps_all_bands() {
    let dir = TempDir::new().unwrap();
    let adapter = EmbeddingAdapter::new(MockEarthEngine::new(), store(&dir), options_with_bucket());
    let request = FetchRequest::new(small_region(), 100.0);
    let path = adapter.fetch(&request).await.ok().unwrap();

    let grid = MasterGrid::new(&request.region, 100.0).unwrap();
    let GridArray::Multi(values) = adapter.transform_to_grid(&path, &grid).unwrap() else {
        panic!("expected a banded array");
    };
    let (h, w) = grid.shape();
    assert_eq!(values.dim(), (4, h, w));
}
