//! Data source adapters.
//!
//! Every source implements [`SourceAdapter`]: it consults the
//! [`CacheStore`](crate::cache::CacheStore) before the network, reports a
//! three-way [`FetchResult`] and knows how to turn its artifact into data on
//! a [`MasterGrid`](crate::harmonize::MasterGrid).
//!
//! | Adapter | Artifact | Failure policy |
//! |---------|----------|----------------|
//! | [`ElevationAdapter`] | GeoTIFF path | mandatory: `Err` |
//! | [`EmbeddingAdapter`] | GeoTIFF path | optional: `Empty` |
//! | [`VectorAdapter`] | parsed features | `Err` on exhausted retries |
//! | [`LocalRasterAdapter`] | composite GeoTIFF path | `Empty` when nothing matches |

mod elevation;
pub mod embedding;
mod http;
mod local;
mod retry;
mod types;
pub mod vector;

pub use elevation::{ElevationAdapter, DEFAULT_ELEVATION_URL, DEFAULT_FINE_THRESHOLD};
pub use embedding::{
    ClientState, EarthEngineApi, EarthEngineRestClient, EmbeddingAdapter, EmbeddingOptions,
    PollSchedule,
};
pub use http::{AsyncHttpClient, AsyncReqwestClient};
pub use local::{composite, discover_rasters, LocalRasterAdapter};
pub use retry::RetryPolicy;
pub use types::{cache_key, FetchRequest, FetchResult, ProviderError, SourceAdapter, DEFAULT_YEAR};
pub use vector::{VectorAdapter, DEFAULT_OVERPASS_URL};
