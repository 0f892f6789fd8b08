//! HTTP client abstraction for testability

use super::types::ProviderError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Trait for asynchronous HTTP client operations.
///
/// Adapters depend on this rather than on reqwest so tests can inject
/// canned responses.
pub trait AsyncHttpClient: Send + Sync {
    /// Performs an async HTTP GET request.
    fn get(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, ProviderError>> + Send;

    /// Performs an async HTTP GET request with Bearer token authentication.
    fn get_with_bearer(
        &self,
        url: &str,
        bearer_token: &str,
    ) -> impl Future<Output = Result<Vec<u8>, ProviderError>> + Send;

    /// Performs an async HTTP POST with a JSON body and Bearer token.
    fn post_json_with_bearer(
        &self,
        url: &str,
        bearer_token: &str,
        json_body: &str,
    ) -> impl Future<Output = Result<Vec<u8>, ProviderError>> + Send;

    /// Performs an async HTTP POST with a form-encoded body.
    fn post_form(
        &self,
        url: &str,
        fields: &[(&str, &str)],
    ) -> impl Future<Output = Result<Vec<u8>, ProviderError>> + Send;

    /// Performs an async HTTP DELETE with Bearer token authentication.
    fn delete_with_bearer(
        &self,
        url: &str,
        bearer_token: &str,
    ) -> impl Future<Output = Result<Vec<u8>, ProviderError>> + Send;
}

/// User-Agent sent with every request. Overpass asks clients to identify
/// themselves.
const DEFAULT_USER_AGENT: &str = concat!("deep-earth/", env!("CARGO_PKG_VERSION"));

/// Longest error body echoed into an error message.
const MAX_ERROR_BODY: usize = 512;

/// Async HTTP client implementation using reqwest.
#[derive(Clone)]
pub struct AsyncReqwestClient {
    client: reqwest::Client,
}

impl AsyncReqwestClient {
    /// Creates a new AsyncReqwestClient with a 60 second timeout.
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_timeout(60)
    }

    /// Creates a new AsyncReqwestClient with custom timeout.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(DEFAULT_USER_AGENT)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                ProviderError::network(format!("Failed to create async HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    async fn send(
        &self,
        method: &'static str,
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<Vec<u8>, ProviderError> {
        trace!(method = method, url = url, "HTTP request starting");

        let response = match request.send().await {
            Ok(resp) => {
                debug!(
                    method = method,
                    url = url,
                    status = resp.status().as_u16(),
                    "HTTP response received"
                );
                resp
            }
            Err(e) => {
                warn!(
                    method = method,
                    url = url,
                    error = %e,
                    is_connect = e.is_connect(),
                    is_timeout = e.is_timeout(),
                    "HTTP request failed"
                );
                return Err(ProviderError::network(format!("Request failed: {}", e)));
            }
        };

        // Check HTTP status
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(MAX_ERROR_BODY).collect();
            warn!(
                method = method,
                url = url,
                status = status.as_u16(),
                "HTTP error status"
            );
            return Err(ProviderError::Network {
                status: Some(status.as_u16()),
                message: format!("{} {} failed: {}", method, url, excerpt.trim()),
            });
        }

        // Read response body
        match response.bytes().await {
            Ok(bytes) => {
                trace!(url = url, bytes = bytes.len(), "HTTP response body read");
                Ok(bytes.to_vec())
            }
            Err(e) => {
                warn!(url = url, error = %e, "Failed to read response body");
                Err(ProviderError::network(format!(
                    "Failed to read response: {}",
                    e
                )))
            }
        }
    }
}

impl AsyncHttpClient for AsyncReqwestClient {
    async fn get(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        self.send("GET", url, self.client.get(url)).await
    }

    async fn get_with_bearer(
        &self,
        url: &str,
        bearer_token: &str,
    ) -> Result<Vec<u8>, ProviderError> {
        let request = self.client.get(url).bearer_auth(bearer_token);
        self.send("GET", url, request).await
    }

    async fn post_json_with_bearer(
        &self,
        url: &str,
        bearer_token: &str,
        json_body: &str,
    ) -> Result<Vec<u8>, ProviderError> {
        let request = self
            .client
            .post(url)
            .bearer_auth(bearer_token)
            .header("Content-Type", "application/json")
            .body(json_body.to_string());
        self.send("POST", url, request).await
    }

    async fn post_form(&self, url: &str, fields: &[(&str, &str)]) -> Result<Vec<u8>, ProviderError> {
        let request = self.client.post(url).form(fields);
        self.send("POST", url, request).await
    }

    async fn delete_with_bearer(
        &self,
        url: &str,
        bearer_token: &str,
    ) -> Result<Vec<u8>, ProviderError> {
        let request = self.client.delete(url).bearer_auth(bearer_token);
        self.send("DELETE", url, request).await
    }
}
