//! Integration tests for the fetch → harmonize pipeline.
//!
//! These tests drive the real adapters against in-process fakes of the
//! remote services and verify:
//! - Concurrent acquisition reports `{results, errors}` per source
//! - A failing source never prevents the others from being harmonized
//! - The quality layer reflects which sources contributed
//! - Local rasters are composited onto the master grid
//! - Repeat requests are served from the cache
//!
//! Run with: `cargo test --test pipeline_integration`

use deep_earth::cache::{CacheCategory, CacheStore, CategoryTtl, ManualClock, METADATA_FILE};
use deep_earth::harmonize::{Harmonizer, Layer, QUALITY_LAYER};
use deep_earth::orchestrator::{FetchOrchestrator, SOURCE_ELEVATION, SOURCE_EMBEDDING, SOURCE_LOCAL, SOURCE_VECTOR};
use deep_earth::provider::embedding::{EarthEngineApi, ImageSpec, JobState, JobStatus};
use deep_earth::provider::{
    AsyncHttpClient, ElevationAdapter, EmbeddingAdapter, EmbeddingOptions, FetchRequest,
    LocalRasterAdapter, ProviderError, RetryPolicy, VectorAdapter,
};
use deep_earth::raster::{encode_geotiff, write_geotiff, Crs, GeoTransform, Raster, RasterDataType};
use deep_earth::rasterize::{VectorRasterizer, DISTANCE_SENTINEL};
use deep_earth::region::RegionContext;
use chrono::{Duration, TimeZone, Utc};
use ndarray::{Array2, Array3};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

// ============================================================================
// Test Helpers
// ============================================================================

const RESOLUTION: f64 = 250.0;
const EMBEDDING_BANDS: usize = 4;

const ROADS: &str = r#"{"elements":[
    {"type":"way","id":1,"tags":{"highway":"primary"},
     "geometry":[{"lat":44.92,"lon":-93.08},{"lat":45.08,"lon":-92.92}]},
    {"type":"way","id":2,"tags":{"building":"yes","height":"9 m"},
     "geometry":[{"lat":45.0,"lon":-93.0},{"lat":45.0,"lon":-92.98},
                 {"lat":45.02,"lon":-92.98},{"lat":45.02,"lon":-93.0},
                 {"lat":45.0,"lon":-93.0}]}
]}"#;

const NO_FEATURES: &str = r#"{"elements":[]}"#;

fn region() -> RegionContext {
    RegionContext::new(44.9, 45.1, -93.1, -92.9).unwrap()
}

fn request() -> FetchRequest {
    FetchRequest::new(region(), RESOLUTION)
}

/// A geographic raster covering slightly more than the test region.
fn covering_raster(data: Array3<f32>) -> Raster {
    let (_, h, w) = data.dim();
    Raster {
        data,
        transform: GeoTransform::from_bounds(-93.2, 44.8, -92.8, 45.2, w, h),
        crs: Crs::Geographic,
        data_type: RasterDataType::F32,
        nodata: None,
    }
}

fn dem_bytes() -> Vec<u8> {
    encode_geotiff(&covering_raster(Array3::from_elem((1, 16, 16), 312.0))).unwrap()
}

fn embedding_bytes() -> Vec<u8> {
    encode_geotiff(&covering_raster(Array3::from_elem((EMBEDDING_BANDS, 8, 8), 0.1))).unwrap()
}

fn write_local_tile(path: &Path, value: f32) {
    let raster = covering_raster(Array3::from_elem((1, 10, 10), value));
    write_geotiff(path, &raster).unwrap();
}

/// Stands in for the elevation and Overpass endpoints.
struct FakeServices {
    dem: Option<Vec<u8>>,
    overpass: &'static str,
    calls: Arc<AtomicUsize>,
}

impl FakeServices {
    fn new(overpass: &'static str) -> Self {
        Self {
            dem: Some(dem_bytes()),
            overpass,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn without_dem(mut self) -> Self {
        self.dem = None;
        self
    }

    fn with_counter(mut self, calls: Arc<AtomicUsize>) -> Self {
        self.calls = calls;
        self
    }
}

impl AsyncHttpClient for FakeServices {
    async fn get(&self, _url: &str) -> Result<Vec<u8>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.dem.clone().ok_or_else(|| ProviderError::Network {
            status: Some(503),
            message: "service unavailable".to_string(),
        })
    }

    async fn get_with_bearer(&self, _url: &str, _token: &str) -> Result<Vec<u8>, ProviderError> {
        Err(ProviderError::InvalidRequest("unexpected GET".to_string()))
    }

    async fn post_json_with_bearer(
        &self,
        _url: &str,
        _token: &str,
        _json_body: &str,
    ) -> Result<Vec<u8>, ProviderError> {
        Err(ProviderError::InvalidRequest("unexpected POST".to_string()))
    }

    async fn post_form(&self, _url: &str, _fields: &[(&str, &str)]) -> Result<Vec<u8>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.overpass.as_bytes().to_vec())
    }

    async fn delete_with_bearer(&self, _url: &str, _token: &str) -> Result<Vec<u8>, ProviderError> {
        Err(ProviderError::InvalidRequest("unexpected DELETE".to_string()))
    }
}

/// Earth Engine backend that serves small regions directly.
struct FakeEarthEngine {
    authorized: bool,
    calls: Arc<AtomicUsize>,
}

impl FakeEarthEngine {
    fn new() -> Self {
        Self {
            authorized: true,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn unauthorized() -> Self {
        Self {
            authorized: false,
            ..Self::new()
        }
    }
}

impl EarthEngineApi for FakeEarthEngine {
    async fn initialize(&self) -> Result<(), ProviderError> {
        if self.authorized {
            Ok(())
        } else {
            Err(ProviderError::Credentials("no service account".to_string()))
        }
    }

    async fn image_count(&self, _spec: &ImageSpec) -> Result<usize, ProviderError> {
        Ok(1)
    }

    async fn download_url(&self, _spec: &ImageSpec) -> Result<String, ProviderError> {
        Ok("https://earthengine.invalid/pixels".to_string())
    }

    async fn fetch_url(&self, _url: &str) -> Result<Vec<u8>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(embedding_bytes())
    }

    async fn start_export(
        &self,
        _spec: &ImageSpec,
        _bucket: &str,
        _object_prefix: &str,
    ) -> Result<String, ProviderError> {
        Err(ProviderError::InvalidRequest("exports are not expected".to_string()))
    }

    async fn job_status(&self, _job_id: &str) -> Result<JobStatus, ProviderError> {
        Ok(JobStatus {
            state: JobState::Failed,
            error: Some("no jobs".to_string()),
        })
    }

    async fn cancel_job(&self, _job_id: &str) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn read_object(&self, _bucket: &str, _object: &str) -> Result<Vec<u8>, ProviderError> {
        Err(ProviderError::InvalidRequest("no objects".to_string()))
    }

    async fn delete_object(&self, _bucket: &str, _object: &str) -> Result<(), ProviderError> {
        Ok(())
    }
}

type TestOrchestrator = FetchOrchestrator<
    ElevationAdapter<FakeServices>,
    EmbeddingAdapter<FakeEarthEngine>,
    VectorAdapter<FakeServices>,
    LocalRasterAdapter,
>;

fn open_cache(dir: &TempDir) -> Arc<CacheStore> {
    Arc::new(CacheStore::open(dir.path().join("cache"), CategoryTtl::default()).unwrap())
}

fn orchestrator(
    cache: Arc<CacheStore>,
    dem: FakeServices,
    earth_engine: FakeEarthEngine,
    overpass: FakeServices,
) -> TestOrchestrator {
    let options = EmbeddingOptions {
        direct_area_threshold_km2: 1.0e6,
        ..EmbeddingOptions::default()
    };
    FetchOrchestrator::new(
        ElevationAdapter::new(dem, cache.clone(), Some("test-key".to_string()))
            .with_retry(RetryPolicy::none()),
        EmbeddingAdapter::new(earth_engine, cache.clone(), options).with_retry(RetryPolicy::none()),
        VectorAdapter::new(overpass, cache.clone()).with_retry(RetryPolicy::none()),
        LocalRasterAdapter::new(cache.clone()),
        cache,
    )
}

fn assert_uniform(quality: &Array2<f32>, expected: f32) {
    assert!(
        quality.iter().all(|&v| (v - expected).abs() < 1e-6),
        "expected uniform quality {}, got {:?}",
        expected,
        quality.first()
    );
}

// ============================================================================
// Full Pipeline
// ============================================================================

#[tokio::test]
async fn test_all_sources_harmonize_with_full_quality() {
    let dir = TempDir::new().unwrap();
    let orchestrator = orchestrator(
        open_cache(&dir),
        FakeServices::new(ROADS),
        FakeEarthEngine::new(),
        FakeServices::new(ROADS),
    );

    let report = orchestrator.fetch_all(&request()).await;
    assert!(!report.has_errors(), "unexpected errors: {:?}", report.errors);
    assert!(report.is_success(SOURCE_ELEVATION));
    assert!(report.is_success(SOURCE_EMBEDDING));
    assert!(report.is_success(SOURCE_VECTOR));
    assert!(!report.requested(SOURCE_LOCAL));

    let mut harmonizer = Harmonizer::new(region(), RESOLUTION).unwrap();
    let integration = harmonizer.integrate(&report, &VectorRasterizer::new()).unwrap();
    let shape = harmonizer.grid().shape();

    assert_eq!(integration.quality.dim(), shape);
    assert_uniform(&integration.quality, 1.0);

    let elevation = harmonizer.layer(SOURCE_ELEVATION).and_then(Layer::as_continuous).unwrap();
    assert_eq!(elevation.dim(), shape);
    assert!(elevation.iter().all(|&v| (v - 312.0).abs() < 1e-3));

    match harmonizer.layer(SOURCE_EMBEDDING).unwrap() {
        Layer::Banded(bands) => assert_eq!(bands.dim(), (EMBEDDING_BANDS, shape.0, shape.1)),
        other => panic!("embedding should be banded, got {:?}", other.spatial_shape()),
    }

    let highway = harmonizer.layer("highway").and_then(Layer::as_categorical).unwrap();
    assert!(highway.iter().any(|&id| id != 0));

    let road_distance = harmonizer.layer("road_distance").and_then(Layer::as_continuous).unwrap();
    assert!(road_distance.iter().any(|&d| d == 0.0));
    assert!(road_distance.iter().all(|&d| d < DISTANCE_SENTINEL));

    let waterway_distance = harmonizer
        .layer("waterway_distance")
        .and_then(Layer::as_continuous)
        .unwrap();
    assert!(waterway_distance.iter().all(|&d| d == DISTANCE_SENTINEL));

    let buildings = harmonizer.layer("building_mask").and_then(Layer::as_mask).unwrap();
    assert!(buildings.iter().any(|&m| m == 1));

    assert!(harmonizer.layer(QUALITY_LAYER).is_some());
}

#[tokio::test]
async fn test_failed_elevation_is_reported_and_others_survive() {
    let dir = TempDir::new().unwrap();
    let orchestrator = orchestrator(
        open_cache(&dir),
        FakeServices::new(ROADS).without_dem(),
        FakeEarthEngine::new(),
        FakeServices::new(ROADS),
    );

    let report = orchestrator.fetch_all(&request()).await;
    assert!(report.errors.contains_key(SOURCE_ELEVATION));
    assert_eq!(report.results.get(SOURCE_ELEVATION), Some(&None));
    assert!(report.is_success(SOURCE_EMBEDDING));
    assert!(report.is_success(SOURCE_VECTOR));

    let mut harmonizer = Harmonizer::new(region(), RESOLUTION).unwrap();
    let integration = harmonizer.integrate(&report, &VectorRasterizer::new()).unwrap();

    assert!(integration.outcomes[SOURCE_ELEVATION].is_err());
    assert!(harmonizer.layer(SOURCE_ELEVATION).is_none());
    assert_uniform(&integration.quality, 0.75);
}

#[tokio::test]
async fn test_unavailable_embedding_degrades_without_error() {
    let dir = TempDir::new().unwrap();
    let orchestrator = orchestrator(
        open_cache(&dir),
        FakeServices::new(ROADS),
        FakeEarthEngine::unauthorized(),
        FakeServices::new(ROADS),
    );

    let report = orchestrator.fetch_all(&request()).await;
    assert!(!report.errors.contains_key(SOURCE_EMBEDDING));
    assert_eq!(report.results.get(SOURCE_EMBEDDING), Some(&None));

    let mut harmonizer = Harmonizer::new(region(), RESOLUTION).unwrap();
    let integration = harmonizer.integrate(&report, &VectorRasterizer::new()).unwrap();

    assert!(integration.outcomes[SOURCE_EMBEDDING].is_empty());
    assert_uniform(&integration.quality, 0.5);
}

#[tokio::test]
async fn test_elevation_only_scores_a_quarter() {
    let dir = TempDir::new().unwrap();
    let orchestrator = orchestrator(
        open_cache(&dir),
        FakeServices::new(NO_FEATURES),
        FakeEarthEngine::unauthorized(),
        FakeServices::new(NO_FEATURES),
    );

    let report = orchestrator.fetch_all(&request()).await;
    assert!(!report.has_errors());
    assert!(report.vector.is_none());

    let mut harmonizer = Harmonizer::new(region(), RESOLUTION).unwrap();
    let integration = harmonizer.integrate(&report, &VectorRasterizer::new()).unwrap();

    assert!(!harmonizer.has_vector_layers());
    assert_uniform(&integration.quality, 0.25);
}

#[tokio::test]
async fn test_local_rasters_are_composited() {
    let dir = TempDir::new().unwrap();
    let tiles = dir.path().join("survey");
    std::fs::create_dir_all(tiles.join("nested")).unwrap();
    write_local_tile(&tiles.join("a_base.tif"), 5.0);
    write_local_tile(&tiles.join("nested").join("b_overlay.tiff"), 7.0);

    let orchestrator = orchestrator(
        open_cache(&dir),
        FakeServices::new(NO_FEATURES),
        FakeEarthEngine::unauthorized(),
        FakeServices::new(NO_FEATURES),
    );

    let request = request().with_local_path(&tiles);
    let report = orchestrator.fetch_all(&request).await;
    assert!(report.is_success(SOURCE_LOCAL));

    let mut harmonizer = Harmonizer::new(region(), RESOLUTION).unwrap();
    harmonizer.integrate(&report, &VectorRasterizer::new()).unwrap();

    let local = harmonizer.layer(SOURCE_LOCAL).and_then(Layer::as_continuous).unwrap();
    assert_eq!(local.dim(), harmonizer.grid().shape());
    // Later files in discovery order overwrite earlier ones
    assert!(local.iter().all(|&v| (v - 7.0).abs() < 1e-3));
}

// ============================================================================
// Cache Behavior
// ============================================================================

#[tokio::test]
async fn test_repeat_request_is_served_from_cache() {
    let dir = TempDir::new().unwrap();
    let cache = open_cache(&dir);
    let http_calls = Arc::new(AtomicUsize::new(0));
    let ee = FakeEarthEngine::new();
    let ee_calls = ee.calls.clone();

    let orchestrator = orchestrator(
        cache.clone(),
        FakeServices::new(ROADS).with_counter(http_calls.clone()),
        ee,
        FakeServices::new(ROADS).with_counter(http_calls.clone()),
    );

    let first = orchestrator.fetch_all(&request()).await;
    assert!(!first.has_errors());
    let calls_after_first = http_calls.load(Ordering::SeqCst);
    assert_eq!(calls_after_first, 2);
    assert_eq!(ee_calls.load(Ordering::SeqCst), 1);

    let second = orchestrator.fetch_all(&request()).await;
    assert_eq!(http_calls.load(Ordering::SeqCst), calls_after_first);
    assert_eq!(ee_calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.results, second.results);
    assert_eq!(first.vector, second.vector);
}

#[test]
fn test_entries_expire_by_category_ttl() {
    let dir = TempDir::new().unwrap();
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let store = CacheStore::with_clock(dir.path(), CategoryTtl::default(), clock.clone()).unwrap();

    store.save("osm_roads", b"{}", CacheCategory::Vector, "json").unwrap();
    store.save("srtm_dem", b"II*\0", CacheCategory::Elevation, "tif").unwrap();

    clock.advance(Duration::days(29));
    assert!(store.exists("osm_roads", CacheCategory::Vector, "json"));

    clock.advance(Duration::days(2));
    assert!(!store.exists("osm_roads", CacheCategory::Vector, "json"));
    assert!(store.entry("osm_roads").is_none());
    // Elevation never expires
    assert!(store.exists("srtm_dem", CacheCategory::Elevation, "tif"));
}

#[test]
fn test_legacy_metadata_is_migrated_on_open() {
    let dir = TempDir::new().unwrap();
    let legacy = r#"{"version": 1, "entries": {
        "gee_abc": {"category": "embedding", "created": 1704067200.0, "extension": "tif"}
    }}"#;
    std::fs::write(dir.path().join(METADATA_FILE), legacy).unwrap();

    let store = CacheStore::open(dir.path(), CategoryTtl::default()).unwrap();
    let entry = store.entry("gee_abc").unwrap();
    assert_eq!(entry.category, CacheCategory::Embedding);
    assert_eq!(entry.ttl_days, Some(365));

    let persisted: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dir.path().join(METADATA_FILE)).unwrap()).unwrap();
    assert_eq!(persisted["version"], 2);
    assert_eq!(persisted["entries"]["gee_abc"]["ttl_days"], 365);
}
