use super::diagnostics::{self, ProbeOutcome};
use crate::types::{JobSnapshot, Screenshot, SubmitResponse};
use crate::{Error, ErrorContext, Result};
use bytes::Bytes;
use futures::StreamExt;
use reqwest::{Proxy, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

const ANALYZE_PATH: &str = "/analyze";
const HEALTH_PATH: &str = "/health";

/// Connection settings for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Service root, e.g. `http://localhost:8000/api`. Endpoint paths are appended to it.
    pub base_url: String,
    /// Upper bound for one request, response body included.
    pub timeout: Duration,
    pub proxy_url: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            proxy_url: None,
        }
    }
}

/// HTTP client for the analysis service.
///
/// Every call is bounded by the configured timeout and every failure is classified as
/// [`Error::Timeout`], [`Error::Network`] or [`Error::RequestFailed`].
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    origin: Url,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let origin = Url::parse(&base_url).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid service base URL: {}", e),
                ErrorContext::new()
                    .with_field_path("base_url")
                    .with_details(base_url.clone()),
            )
        })?;
        if config.timeout.is_zero() {
            return Err(Error::configuration_with_context(
                "request timeout must be greater than zero",
                ErrorContext::new().with_field_path("timeout"),
            ));
        }

        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        if let Some(proxy_url) = &config.proxy_url {
            let proxy = Proxy::all(proxy_url).map_err(|e| {
                Error::configuration_with_context(
                    format!("invalid proxy URL: {}", e),
                    ErrorContext::new().with_field_path("proxy_url"),
                )
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| {
            Error::configuration(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            base_url,
            origin,
            timeout: config.timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `{base_url}/{collection}/{job_id}`, with the id encoded as a single path segment.
    fn job_endpoint(&self, collection: &str, job_id: &str) -> Result<Url> {
        let mut url = self.origin.clone();
        url.path_segments_mut()
            .map_err(|_| {
                Error::configuration_with_context(
                    "service base URL cannot carry a path",
                    ErrorContext::new().with_field_path("base_url"),
                )
            })?
            .pop_if_empty()
            .push(collection)
            .push(job_id);
        Ok(url)
    }

    /// Submit `url` for analysis and return the service-issued job id.
    ///
    /// On failure a health probe is started in the background; its outcome is only logged.
    pub async fn submit(&self, url: &str) -> Result<String> {
        let start = Instant::now();
        let result = self.submit_once(url).await;
        match &result {
            Ok(id) => info!(
                analysis_id = id.as_str(),
                site = url,
                duration_ms = start.elapsed().as_millis() as u64,
                "analysis submitted"
            ),
            Err(e) => {
                warn!(
                    site = url,
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "analysis submission failed"
                );
                diagnostics::spawn_health_probe(
                    self.client.clone(),
                    self.endpoint(HEALTH_PATH),
                    self.timeout,
                );
            }
        }
        result
    }

    async fn submit_once(&self, url: &str) -> Result<String> {
        let request = self
            .client
            .post(self.endpoint(ANALYZE_PATH))
            .json(&serde_json::json!({ "url": url }));
        let body = self.call(request, "submit").await?;
        let resp: SubmitResponse = decode(&body)?;
        let id = resp.analysis_id.trim();
        if id.is_empty() {
            return Err(Error::runtime_with_context(
                "service returned an empty analysis id",
                ErrorContext::new().with_source("submit"),
            ));
        }
        Ok(id.to_string())
    }

    /// Fetch the current snapshot of a job.
    pub async fn fetch_status(&self, job_id: &str) -> Result<JobSnapshot> {
        let request = self
            .client
            .get(self.job_endpoint("analysis", job_id)?);
        let body = self.call(request, "fetch_status").await?;
        decode(&body)
    }

    /// Most recent analyses known to the service, newest first.
    pub async fn fetch_history(&self, limit: usize) -> Result<Vec<JobSnapshot>> {
        let request = self
            .client
            .get(self.endpoint("/history"))
            .query(&[("limit", limit)]);
        let body = self.call(request, "fetch_history").await?;
        decode(&body)
    }

    /// Screenshot descriptors for a job, with image URLs resolved against the service origin.
    ///
    /// Accepts both full descriptors and bare relative paths.
    pub async fn fetch_screenshots(&self, job_id: &str) -> Result<Vec<Screenshot>> {
        let request = self
            .client
            .get(self.job_endpoint("screenshots", job_id)?);
        let body = self.call(request, "fetch_screenshots").await?;
        let entries: Vec<ScreenshotEntry> = decode(&body)?;
        entries
            .into_iter()
            .enumerate()
            .map(|(idx, entry)| -> Result<Screenshot> {
                let mut shot = match entry {
                    ScreenshotEntry::Descriptor(shot) => shot,
                    ScreenshotEntry::Path(path) => Screenshot {
                        id: idx.to_string(),
                        device: String::new(),
                        resolution: String::new(),
                        url: path,
                        full_page_url: None,
                    },
                };
                shot.url = self.resolve(&shot.url)?;
                if let Some(full) = shot.full_page_url.take() {
                    shot.full_page_url = Some(self.resolve(&full)?);
                }
                Ok(shot)
            })
            .collect()
    }

    /// Download one image as raw bytes.
    pub async fn fetch_screenshot_bytes(&self, url: &str) -> Result<Bytes> {
        let absolute = self.resolve(url)?;
        self.call(self.client.get(absolute), "fetch_screenshot").await
    }

    /// Download every screenshot of a job, at most `concurrency` at a time, preserving order.
    pub async fn fetch_screenshot_images(
        &self,
        job_id: &str,
        concurrency: usize,
    ) -> Result<Vec<(Screenshot, Result<Bytes>)>> {
        let shots = self.fetch_screenshots(job_id).await?;
        let results: Vec<(Screenshot, Result<Bytes>)> = futures::stream::iter(shots)
            .map(|shot| async move {
                let bytes = self.fetch_screenshot_bytes(&shot.url).await;
                (shot, bytes)
            })
            .buffered(concurrency.max(1))
            .collect()
            .await;
        Ok(results)
    }

    /// Status code of `GET /health`. Non-success codes are returned, not raised.
    pub async fn health(&self) -> Result<u16> {
        let (status, _) = self
            .exchange(self.client.get(self.endpoint(HEALTH_PATH)), "health")
            .await?;
        Ok(status.as_u16())
    }

    /// Run the diagnostic probe in the foreground.
    pub async fn probe(&self) -> ProbeOutcome {
        diagnostics::probe_health(&self.client, &self.endpoint(HEALTH_PATH), self.timeout).await
    }

    fn resolve(&self, path: &str) -> Result<String> {
        self.origin.join(path).map(String::from).map_err(|e| {
            Error::validation_with_context(
                format!("cannot resolve screenshot path: {}", e),
                ErrorContext::new().with_details(path.to_string()),
            )
        })
    }

    /// One exchange that must end in a 2xx; the body is returned raw.
    async fn call(&self, request: reqwest::RequestBuilder, op: &'static str) -> Result<Bytes> {
        let start = Instant::now();
        let (status, body) = self.exchange(request, op).await?;
        if status.is_success() {
            debug!(
                operation = op,
                http_status = status.as_u16(),
                duration_ms = start.elapsed().as_millis() as u64,
                "request succeeded"
            );
            return Ok(body);
        }

        let message = error_message_from_body(&body)
            .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));
        info!(
            operation = op,
            http_status = status.as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "analysis service request failed"
        );
        Err(Error::RequestFailed {
            status: status.as_u16(),
            message,
        })
    }

    /// Send `request` and read the whole body under the timeout.
    ///
    /// Dropping the future on timeout aborts the in-flight request.
    async fn exchange(
        &self,
        request: reqwest::RequestBuilder,
        op: &'static str,
    ) -> Result<(StatusCode, Bytes)> {
        let call = async {
            let resp = request.send().await?;
            let status = resp.status();
            let body = resp.bytes().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(pair)) => Ok(pair),
            Ok(Err(e)) if e.is_timeout() => Err(self.timeout_error(op)),
            Ok(Err(e)) => Err(Error::network_with_context(
                e.to_string(),
                ErrorContext::new().with_source(op),
            )),
            Err(_) => Err(self.timeout_error(op)),
        }
    }

    fn timeout_error(&self, op: &'static str) -> Error {
        Error::Timeout {
            timeout_ms: self.timeout.as_millis() as u64,
            context: ErrorContext::new().with_source(op),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScreenshotEntry {
    Path(String),
    Descriptor(Screenshot),
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(body)?)
}

/// Pull a human-readable message out of an error body: `{"error": ...}` first, then
/// FastAPI's `{"detail": ...}`, then `{"message": ...}`.
fn error_message_from_body(body: &[u8]) -> Option<String> {
    let json: serde_json::Value = serde_json::from_slice(body).ok()?;
    ["error", "detail", "message"]
        .iter()
        .filter_map(|key| json.get(*key))
        .find_map(|v| match v {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            serde_json::Value::Object(o) => o
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string),
            _ => None,
        })
}
