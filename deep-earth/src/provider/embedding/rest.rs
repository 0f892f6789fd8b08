//! Earth Engine REST backend.
//!
//! # Endpoints
//!
//! - `GET  {api}/projects/{project}/algorithms` (initialization check)
//! - `GET  {api}/projects/{project}/assets/{dataset}:listImages`
//! - `POST {api}/projects/{project}/thumbnails`, then `GET {api}/{name}:getPixels`
//! - `POST {api}/projects/{project}/image:export`
//! - `GET  {api}/{operation}` and `POST {api}/{operation}:cancel`
//! - `GET|DELETE {storage}/storage/v1/b/{bucket}/o/{object}`
//!
//! Images are described as serialized expression graphs: the collection is
//! filtered by year and bounds, mosaicked, clipped and reprojected to the
//! target UTM zone at the target scale.

use super::api::{EarthEngineApi, ImageSpec, JobState, JobStatus};
use crate::provider::http::AsyncHttpClient;
use crate::provider::ProviderError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// Default Earth Engine REST root.
pub const DEFAULT_EARTH_ENGINE_URL: &str = "https://earthengine.googleapis.com/v1";

/// Default Cloud Storage JSON API root.
pub const DEFAULT_STORAGE_URL: &str = "https://storage.googleapis.com";

/// Earth Engine client speaking the public REST API.
pub struct EarthEngineRestClient<C: AsyncHttpClient> {
    http_client: C,
    api_url: String,
    storage_url: String,
    project: String,
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct ListImagesResponse {
    #[serde(default)]
    images: Vec<Value>,
}

#[derive(Deserialize)]
struct NamedResource {
    name: String,
}

#[derive(Deserialize)]
struct Operation {
    #[serde(default)]
    done: bool,
    #[serde(default)]
    metadata: Option<OperationMetadata>,
    #[serde(default)]
    error: Option<OperationError>,
}

#[derive(Deserialize)]
struct OperationMetadata {
    #[serde(default)]
    state: Option<String>,
}

#[derive(Deserialize)]
struct OperationError {
    #[serde(default)]
    message: String,
}

impl<C: AsyncHttpClient> EarthEngineRestClient<C> {
    pub fn new(http_client: C, project: impl Into<String>, access_token: Option<String>) -> Self {
        Self {
            http_client,
            api_url: DEFAULT_EARTH_ENGINE_URL.to_string(),
            storage_url: DEFAULT_STORAGE_URL.to_string(),
            project: project.into(),
            access_token: access_token.filter(|t| !t.trim().is_empty()),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_storage_url(mut self, storage_url: impl Into<String>) -> Self {
        self.storage_url = storage_url.into().trim_end_matches('/').to_string();
        self
    }

    fn token(&self) -> Result<&str, ProviderError> {
        self.access_token
            .as_deref()
            .ok_or_else(|| ProviderError::Credentials("Earth Engine access token is not configured".into()))
    }

    fn project_url(&self, suffix: &str) -> String {
        format!("{}/projects/{}/{}", self.api_url, self.project, suffix)
    }

    /// Resource names such as `projects/p/operations/x` are relative to the API root.
    fn resource_url(&self, name: &str) -> String {
        format!("{}/{}", self.api_url, name.trim_start_matches('/'))
    }

    fn object_url(&self, bucket: &str, object: &str) -> Result<reqwest::Url, ProviderError> {
        let mut url = reqwest::Url::parse(&self.storage_url)
            .map_err(|e| ProviderError::InvalidRequest(format!("{}: {}", self.storage_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::InvalidRequest(self.storage_url.clone()))?
            .pop_if_empty()
            .extend(["storage", "v1", "b", bucket, "o", object]);
        Ok(url)
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Vec<u8>, ProviderError> {
        let token = self.token()?;
        self.http_client
            .post_json_with_bearer(url, token, &body.to_string())
            .await
    }
}

fn parse<T: for<'de> Deserialize<'de>>(bytes: &[u8], what: &str) -> Result<T, ProviderError> {
    serde_json::from_slice(bytes)
        .map_err(|e| ProviderError::InvalidResponse(format!("Unparseable {} response: {}", what, e)))
}

fn call(function: &str, arguments: Value) -> Value {
    json!({
        "functionInvocationValue": {
            "functionName": function,
            "arguments": arguments,
        }
    })
}

fn constant(value: impl Serialize) -> Value {
    json!({ "constantValue": value })
}

fn rectangle(spec: &ImageSpec) -> Value {
    let r = &spec.region;
    call(
        "GeometryConstructors.Rectangle",
        json!({
            "coordinates": constant([r.lon_min(), r.lat_min(), r.lon_max(), r.lat_max()]),
            "geodesic": constant(false),
        }),
    )
}

/// GeoJSON polygon of the image's region.
fn region_geojson(spec: &ImageSpec) -> String {
    let r = &spec.region;
    json!({
        "type": "Polygon",
        "coordinates": [[
            [r.lon_min(), r.lat_min()],
            [r.lon_max(), r.lat_min()],
            [r.lon_max(), r.lat_max()],
            [r.lon_min(), r.lat_max()],
            [r.lon_min(), r.lat_min()],
        ]],
    })
    .to_string()
}

/// Serialized expression for the year's mosaic, clipped and reprojected.
pub fn image_expression(spec: &ImageSpec) -> Value {
    let (start, end) = spec.date_range();
    let collection = call("ImageCollection.load", json!({ "id": constant(&spec.dataset_id) }));
    let by_date = call(
        "Collection.filter",
        json!({
            "collection": collection,
            "filter": call("Filter.dateRangeContains", json!({
                "leftValue": call("DateRange", json!({
                    "start": constant(start),
                    "end": constant(end),
                })),
                "rightField": constant("system:time_start"),
            })),
        }),
    );
    let by_bounds = call(
        "Collection.filter",
        json!({
            "collection": by_date,
            "filter": call("Filter.intersects", json!({
                "leftField": constant(".all"),
                "rightValue": rectangle(spec),
            })),
        }),
    );
    let mosaic = call("ImageCollection.mosaic", json!({ "collection": by_bounds }));
    let clipped = call(
        "Image.clip",
        json!({ "input": mosaic, "geometry": rectangle(spec) }),
    );
    let projected = call(
        "Image.reproject",
        json!({
            "image": clipped,
            "crs": call("Projection", json!({ "crs": constant(format!("EPSG:{}", spec.epsg)) })),
            "scale": constant(spec.scale),
        }),
    );
    json!({ "result": "0", "values": { "0": projected } })
}

/// Maps the service's operation states onto [`JobState`].
fn job_state(state: &str) -> JobState {
    match state {
        "SUCCEEDED" | "COMPLETED" => JobState::Completed,
        "FAILED" => JobState::Failed,
        "CANCELLED" => JobState::Cancelled,
        _ => JobState::Running,
    }
}

fn is_too_large(error: &ProviderError) -> bool {
    match error {
        ProviderError::Network {
            status: Some(400),
            message,
        } => {
            let message = message.to_ascii_lowercase();
            message.contains("must be less than or equal to") || message.contains("too large")
        }
        _ => false,
    }
}

impl<C: AsyncHttpClient> EarthEngineApi for EarthEngineRestClient<C> {
    async fn initialize(&self) -> Result<(), ProviderError> {
        if self.project.trim().is_empty() {
            return Err(ProviderError::Credentials(
                "Earth Engine project is not configured".into(),
            ));
        }
        let token = self.token()?;
        self.http_client
            .get_with_bearer(&self.project_url("algorithms"), token)
            .await?;
        Ok(())
    }

    async fn image_count(&self, spec: &ImageSpec) -> Result<usize, ProviderError> {
        let token = self.token()?;
        let (start, end) = spec.date_range();
        let base = self.project_url(&format!("assets/{}:listImages", spec.dataset_id));
        let url = reqwest::Url::parse_with_params(
            &base,
            &[
                ("startTime", start),
                ("endTime", end),
                ("region", region_geojson(spec)),
            ],
        )
        .map_err(|e| ProviderError::InvalidRequest(format!("{}: {}", base, e)))?;

        let bytes = self.http_client.get_with_bearer(url.as_str(), token).await?;
        let listing: ListImagesResponse = parse(&bytes, "listImages")?;
        Ok(listing.images.len())
    }

    async fn download_url(&self, spec: &ImageSpec) -> Result<String, ProviderError> {
        let body = json!({
            "expression": image_expression(spec),
            "fileFormat": "GEO_TIFF",
        });
        let bytes = self
            .post_json(&self.project_url("thumbnails"), &body)
            .await
            .map_err(|e| {
                if is_too_large(&e) {
                    ProviderError::PayloadTooLarge(e.to_string())
                } else {
                    e
                }
            })?;
        let thumbnail: NamedResource = parse(&bytes, "thumbnails")?;
        Ok(format!("{}:getPixels", self.resource_url(&thumbnail.name)))
    }

    async fn fetch_url(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        let token = self.token()?;
        self.http_client
            .get_with_bearer(url, token)
            .await
            .map_err(|e| {
                if is_too_large(&e) {
                    ProviderError::PayloadTooLarge(e.to_string())
                } else {
                    e
                }
            })
    }

    async fn start_export(
        &self,
        spec: &ImageSpec,
        bucket: &str,
        object_prefix: &str,
    ) -> Result<String, ProviderError> {
        let body = json!({
            "expression": image_expression(spec),
            "description": format!("deep_earth_{}", spec.year),
            "fileExportOptions": {
                "fileFormat": "GEO_TIFF",
                "gcsDestination": {
                    "bucket": bucket,
                    "filenamePrefix": object_prefix,
                },
            },
            "maxPixels": "10000000000000",
        });
        let bytes = self.post_json(&self.project_url("image:export"), &body).await?;
        let operation: NamedResource = parse(&bytes, "image:export")?;
        debug!(job_id = %operation.name, bucket = bucket, "Export submitted");
        Ok(operation.name)
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatus, ProviderError> {
        let token = self.token()?;
        let bytes = self
            .http_client
            .get_with_bearer(&self.resource_url(job_id), token)
            .await?;
        let operation: Operation = parse(&bytes, "operation")?;

        if let Some(error) = operation.error {
            return Ok(JobStatus {
                state: JobState::Failed,
                error: Some(error.message),
            });
        }
        let state = operation
            .metadata
            .and_then(|m| m.state)
            .map(|s| job_state(&s))
            .unwrap_or(if operation.done {
                JobState::Completed
            } else {
                JobState::Running
            });
        Ok(JobStatus { state, error: None })
    }

    async fn cancel_job(&self, job_id: &str) -> Result<(), ProviderError> {
        let url = format!("{}:cancel", self.resource_url(job_id));
        self.post_json(&url, &json!({})).await?;
        Ok(())
    }

    async fn read_object(&self, bucket: &str, object: &str) -> Result<Vec<u8>, ProviderError> {
        let token = self.token()?;
        let mut url = self.object_url(bucket, object)?;
        url.set_query(Some("alt=media"));
        self.http_client.get_with_bearer(url.as_str(), token).await
    }

    async fn delete_object(&self, bucket: &str, object: &str) -> Result<(), ProviderError> {
        let token = self.token()?;
        let url = self.object_url(bucket, object)?;
        self.http_client
            .delete_with_bearer(url.as_str(), token)
            .await?;
        Ok(())
    }
}
