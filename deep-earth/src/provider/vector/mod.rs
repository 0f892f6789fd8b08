//! OpenStreetMap vector provider.
//!
//! Queries an Overpass interpreter for roads, waterways, buildings, landuse
//! and natural features inside the region. The raw JSON response is cached
//! keyed by bounding box (it does not depend on resolution) and parsed into
//! [`ParsedFeature`]s; the grid transform hands them to the
//! [`VectorRasterizer`].

mod parse;
mod query;
mod types;

pub use parse::parse_overpass;
pub use query::{build_query, DEFAULT_QUERY_TIMEOUT};
pub use types::{FeatureKind, GeoPoint, Geometry, ParsedFeature, TagValue, VectorPayload};

use super::http::AsyncHttpClient;
use super::retry::RetryPolicy;
use super::types::{cache_key, FetchRequest, FetchResult, ProviderError, SourceAdapter};
use crate::cache::{CacheCategory, CacheStore};
use crate::harmonize::{Layer, MasterGrid};
use crate::rasterize::VectorRasterizer;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default public Overpass endpoint.
pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// Extension of cached raw responses.
pub const VECTOR_CACHE_EXTENSION: &str = "json";

/// Overpass adapter.
pub struct VectorAdapter<C: AsyncHttpClient> {
    http_client: C,
    cache: Arc<CacheStore>,
    api_url: String,
    query_timeout: u32,
    retry: RetryPolicy,
    rasterizer: VectorRasterizer,
}

impl<C: AsyncHttpClient> VectorAdapter<C> {
    pub fn new(http_client: C, cache: Arc<CacheStore>) -> Self {
        Self {
            http_client,
            cache,
            api_url: DEFAULT_OVERPASS_URL.to_string(),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            retry: RetryPolicy::default(),
            rasterizer: VectorRasterizer::new(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_query_timeout(mut self, seconds: u32) -> Self {
        self.query_timeout = seconds;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Parsed payload from the cache. An unparseable entry is invalidated.
    fn cached(&self, key: &str) -> Option<VectorPayload> {
        let bytes = self
            .cache
            .load(key, CacheCategory::Vector, VECTOR_CACHE_EXTENSION)?;
        match parse_overpass(&bytes) {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!(key = key, error = %e, "Discarding unreadable cached vector payload");
                self.cache.invalidate(key);
                None
            }
        }
    }

    async fn download(&self, request: &FetchRequest, key: &str) -> Result<VectorPayload, ProviderError> {
        let query = build_query(&request.region, self.query_timeout);
        info!(region = %request.region, url = %self.api_url, "Querying vector features");

        let fields = [("data", query.as_str())];
        let bytes = self
            .retry
            .run("vector query", || self.http_client.post_form(&self.api_url, &fields))
            .await?;
        let payload = parse_overpass(&bytes)?;
        self.cache
            .save(key, &bytes, CacheCategory::Vector, VECTOR_CACHE_EXTENSION)?;
        Ok(payload)
    }

    fn outcome(payload: VectorPayload) -> FetchResult<VectorPayload> {
        if payload.features.is_empty() {
            info!(elements = payload.element_count, "No vector features in region");
            return FetchResult::Empty("no vector features in region".to_string());
        }
        debug!(
            features = payload.features.len(),
            roads = payload.count(FeatureKind::Road),
            buildings = payload.count(FeatureKind::Building),
            "Vector features parsed"
        );
        FetchResult::Ok(payload)
    }
}

impl<C: AsyncHttpClient> SourceAdapter for VectorAdapter<C> {
    type Artifact = VectorPayload;
    type GridOutput = BTreeMap<String, Layer>;

    fn name(&self) -> &'static str {
        "vector"
    }

    async fn fetch(&self, request: &FetchRequest) -> FetchResult<VectorPayload> {
        let key = self.cache_key(request);
        if let Some(payload) = self.cached(&key) {
            debug!(key = %key, "Vector cache hit");
            return Self::outcome(payload);
        }
        match self.download(request, &key).await {
            Ok(payload) => Self::outcome(payload),
            Err(e) => FetchResult::Err(e.to_string()),
        }
    }

    fn cache_key(&self, request: &FetchRequest) -> String {
        cache_key("osm", &[&request.region.to_string()])
    }

    /// The public interpreter needs no credentials.
    fn validate_credentials(&self) -> bool {
        true
    }

    fn transform_to_grid(
        &self,
        artifact: &VectorPayload,
        grid: &MasterGrid,
    ) -> Result<BTreeMap<String, Layer>, ProviderError> {
        Ok(self.rasterizer.rasterize(&artifact.features, grid))
    }
}
