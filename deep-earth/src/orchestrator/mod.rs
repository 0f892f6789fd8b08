//! Concurrent acquisition across all sources.
//!
//! [`FetchOrchestrator::fetch_all`] spawns one task per requested source and
//! waits for every one of them. A failing or panicking source never
//! cancels its siblings; each outcome is captured in the [`FetchReport`].

mod report;

pub use report::{FetchReport, SOURCE_ELEVATION, SOURCE_EMBEDDING, SOURCE_LOCAL, SOURCE_VECTOR};

use crate::cache::{CacheCategory, CacheError, CacheStore};
use crate::config::ConfigFile;
use crate::provider::vector::{VectorPayload, VECTOR_CACHE_EXTENSION};
use crate::provider::{
    AsyncReqwestClient, EarthEngineRestClient, ElevationAdapter, EmbeddingAdapter, FetchRequest,
    FetchResult, LocalRasterAdapter, ProviderError, SourceAdapter, VectorAdapter,
};
use futures::future::OptionFuture;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info};

/// Failure to assemble an orchestrator from configuration.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Failed to open cache: {0}")]
    Cache(#[from] CacheError),

    #[error("Failed to create HTTP client: {0}")]
    Http(#[from] ProviderError),
}

/// Runs the four source adapters side by side.
pub struct FetchOrchestrator<E, M, V, L> {
    elevation: Arc<E>,
    embedding: Arc<M>,
    vector: Arc<V>,
    local: Arc<L>,
    cache: Arc<CacheStore>,
}

/// Orchestrator over the network-backed adapters.
pub type DefaultOrchestrator = FetchOrchestrator<
    ElevationAdapter<AsyncReqwestClient>,
    EmbeddingAdapter<EarthEngineRestClient<AsyncReqwestClient>>,
    VectorAdapter<AsyncReqwestClient>,
    LocalRasterAdapter,
>;

fn spawn_fetch<A>(adapter: Arc<A>, request: FetchRequest) -> JoinHandle<FetchResult<A::Artifact>>
where
    A: SourceAdapter + 'static,
{
    tokio::spawn(async move { adapter.fetch(&request).await })
}

/// A task that died is an `Err` outcome like any other.
fn settle<T>(name: &str, joined: Result<FetchResult<T>, JoinError>) -> FetchResult<T> {
    match joined {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => FetchResult::Err(format!("{} fetch panicked", name)),
        Err(e) => FetchResult::Err(format!("{} fetch was cancelled: {}", name, e)),
    }
}

fn log_outcome<T>(name: &str, outcome: &FetchResult<T>) {
    match outcome {
        FetchResult::Ok(_) => info!(source = name, "Source fetched"),
        FetchResult::Empty(reason) => info!(source = name, reason = %reason, "Source returned no data"),
        FetchResult::Err(message) => error!(source = name, error = %message, "Source failed"),
    }
}

impl<E, M, V, L> FetchOrchestrator<E, M, V, L>
where
    E: SourceAdapter<Artifact = PathBuf> + 'static,
    M: SourceAdapter<Artifact = PathBuf> + 'static,
    V: SourceAdapter<Artifact = VectorPayload> + 'static,
    L: SourceAdapter<Artifact = PathBuf> + 'static,
{
    pub fn new(elevation: E, embedding: M, vector: V, local: L, cache: Arc<CacheStore>) -> Self {
        Self {
            elevation: Arc::new(elevation),
            embedding: Arc::new(embedding),
            vector: Arc::new(vector),
            local: Arc::new(local),
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn elevation(&self) -> &E {
        &self.elevation
    }

    pub fn embedding(&self) -> &M {
        &self.embedding
    }

    pub fn vector(&self) -> &V {
        &self.vector
    }

    pub fn local(&self) -> &L {
        &self.local
    }

    /// Fetches every source concurrently and waits for all of them.
    ///
    /// The local source only runs when the request carries a local path.
    pub async fn fetch_all(&self, request: &FetchRequest) -> FetchReport {
        info!(region = %request.region, resolution = request.resolution, "Fetching sources");

        let elevation = spawn_fetch(self.elevation.clone(), request.clone());
        let embedding = spawn_fetch(self.embedding.clone(), request.clone());
        let vector = spawn_fetch(self.vector.clone(), request.clone());
        let local: OptionFuture<_> = request
            .local_path
            .is_some()
            .then(|| spawn_fetch(self.local.clone(), request.clone()))
            .into();

        let (elevation, embedding, vector, local) =
            tokio::join!(elevation, embedding, vector, local);

        let mut report = FetchReport::default();
        for (name, joined) in [(SOURCE_ELEVATION, elevation), (SOURCE_EMBEDDING, embedding)] {
            let outcome = settle(name, joined);
            log_outcome(name, &outcome);
            report.record(name, outcome);
        }
        if let Some(joined) = local {
            let outcome = settle(SOURCE_LOCAL, joined);
            log_outcome(SOURCE_LOCAL, &outcome);
            report.record(SOURCE_LOCAL, outcome);
        }

        let vector = settle(SOURCE_VECTOR, vector);
        log_outcome(SOURCE_VECTOR, &vector);
        let vector = match vector {
            FetchResult::Ok(payload) => {
                let key = self.vector.cache_key(request);
                let path = self
                    .cache
                    .get_path(&key, CacheCategory::Vector, VECTOR_CACHE_EXTENSION);
                report.vector = Some(payload);
                match path {
                    Some(path) => FetchResult::Ok(path),
                    None => FetchResult::Empty("vector payload not cached".to_string()),
                }
            }
            FetchResult::Empty(reason) => FetchResult::Empty(reason),
            FetchResult::Err(message) => FetchResult::Err(message),
        };
        report.record(SOURCE_VECTOR, vector);

        info!(
            fetched = report.results.values().filter(|r| r.is_some()).count(),
            failed = report.errors.len(),
            "Fetch complete"
        );
        report
    }
}

impl DefaultOrchestrator {
    /// Builds the network-backed orchestrator described by `config`.
    pub fn from_config(config: &ConfigFile) -> Result<Self, BuildError> {
        let cache = Arc::new(CacheStore::open(&config.cache.directory, config.cache.ttl())?);
        let http = AsyncReqwestClient::with_timeout(config.network.timeout)?;
        let retry = config.network.retry_policy();

        let elevation = ElevationAdapter::new(
            http.clone(),
            cache.clone(),
            config.elevation.api_key.clone(),
        )
        .with_api_url(&config.elevation.api_url)
        .with_fine_threshold(config.elevation.fine_resolution_threshold)
        .with_retry(retry);

        let earth_engine = EarthEngineRestClient::new(
            http.clone(),
            config.embedding.project.clone().unwrap_or_default(),
            config.embedding.access_token.clone(),
        )
        .with_api_url(&config.embedding.api_url);
        let embedding = EmbeddingAdapter::new(earth_engine, cache.clone(), config.embedding.options())
            .with_retry(retry);

        let vector = VectorAdapter::new(http, cache.clone())
            .with_api_url(&config.vector.api_url)
            .with_query_timeout(config.vector.query_timeout)
            .with_retry(retry);

        let local = LocalRasterAdapter::new(cache.clone());

        Ok(Self::new(elevation, embedding, vector, local, cache))
    }
}
