use crate::client::core::AnalysisClient;
use crate::polling::PollConfig;
use crate::store::{FileHistory, HistoryBackend, JobStore, MemoryHistory};
use crate::transport::{HttpTransport, TransportConfig, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
use crate::Result;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

/// Builder for [`AnalysisClient`].
///
/// Anything not set explicitly falls back to the environment, then to built-in defaults:
/// - `AUDIT_API_BASE_URL` (default `http://localhost:8000/api`)
/// - `AUDIT_HTTP_TIMEOUT_MS` (default 30000)
/// - `AUDIT_POLL_INTERVAL_MS` (default 5000)
/// - `AUDIT_POLL_MAX_ATTEMPTS` (default 60)
/// - `AUDIT_POLL_BACKOFF_MULTIPLIER` (default 2)
/// - `AUDIT_POLL_FAIL_FAST` (`1`/`true` to abort polling on permanent 4xx)
/// - `AUDIT_HISTORY_PATH` (JSON file for history; in-memory when unset)
/// - `AUDIT_PROXY_URL`
pub struct AnalysisClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    proxy_url: Option<String>,
    poll_interval: Option<Duration>,
    max_attempts: Option<u32>,
    backoff_multiplier: Option<f64>,
    fail_fast_on_client_error: Option<bool>,
    history_path: Option<PathBuf>,
    history_backend: Option<Arc<dyn HistoryBackend>>,
    store: Option<Arc<JobStore>>,
}

impl AnalysisClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            timeout: None,
            proxy_url: None,
            poll_interval: None,
            max_attempts: None,
            backoff_multiplier: None,
            fail_fast_on_client_error: None,
            history_path: None,
            history_backend: None,
            store: None,
        }
    }

    /// Service root the endpoint paths are appended to.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn proxy_url(mut self, proxy_url: impl Into<String>) -> Self {
        self.proxy_url = Some(proxy_url.into());
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = Some(n.max(1));
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = Some(multiplier);
        self
    }

    /// Stop polling on the first permanent 4xx (e.g. unknown job) instead of retrying it.
    pub fn fail_fast_on_client_error(mut self, enable: bool) -> Self {
        self.fail_fast_on_client_error = Some(enable);
        self
    }

    /// Persist history as JSON at `path`.
    pub fn history_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.history_path = Some(path.into());
        self
    }

    /// Use a custom history backend. Takes precedence over [`history_path`](Self::history_path).
    pub fn history_backend(mut self, backend: Arc<dyn HistoryBackend>) -> Self {
        self.history_backend = Some(backend);
        self
    }

    /// Share an existing store instead of opening a new one.
    pub fn store(mut self, store: Arc<JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    fn poll_config(&self) -> PollConfig {
        let defaults = PollConfig::default();
        PollConfig {
            interval: self
                .poll_interval
                .or_else(|| env_parse::<u64>("AUDIT_POLL_INTERVAL_MS").map(Duration::from_millis))
                .unwrap_or(defaults.interval),
            max_attempts: self
                .max_attempts
                .or_else(|| env_parse::<u32>("AUDIT_POLL_MAX_ATTEMPTS").filter(|n| *n > 0))
                .unwrap_or(defaults.max_attempts),
            backoff_multiplier: self
                .backoff_multiplier
                .or_else(|| {
                    env_parse::<f64>("AUDIT_POLL_BACKOFF_MULTIPLIER")
                        .filter(|m| m.is_finite() && *m >= 1.0)
                })
                .unwrap_or(defaults.backoff_multiplier),
            fail_fast_on_client_error: self
                .fail_fast_on_client_error
                .or_else(|| {
                    std::env::var("AUDIT_POLL_FAIL_FAST")
                        .ok()
                        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes"))
                })
                .unwrap_or(defaults.fail_fast_on_client_error),
        }
    }

    fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            base_url: self
                .base_url
                .clone()
                .or_else(|| std::env::var("AUDIT_API_BASE_URL").ok())
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            timeout: self
                .timeout
                .or_else(|| {
                    env_parse::<u64>("AUDIT_HTTP_TIMEOUT_MS")
                        .filter(|ms| *ms > 0)
                        .map(Duration::from_millis)
                })
                .unwrap_or(DEFAULT_TIMEOUT),
            proxy_url: self
                .proxy_url
                .clone()
                .or_else(|| std::env::var("AUDIT_PROXY_URL").ok()),
        }
    }

    /// Build the client, opening the history store if none was supplied.
    pub async fn build(self) -> Result<AnalysisClient> {
        let transport = Arc::new(HttpTransport::new(&self.transport_config())?);
        let poll_config = self.poll_config();

        let store = match self.store {
            Some(store) => store,
            None => {
                let backend: Arc<dyn HistoryBackend> = match (self.history_backend, self.history_path) {
                    (Some(backend), _) => backend,
                    (None, Some(path)) => Arc::new(FileHistory::new(path)),
                    (None, None) => match std::env::var("AUDIT_HISTORY_PATH") {
                        Ok(path) if !path.trim().is_empty() => Arc::new(FileHistory::new(path)),
                        _ => Arc::new(MemoryHistory::new()),
                    },
                };
                let store = match JobStore::open(backend.clone()).await {
                    Ok(store) => store,
                    Err(e) => {
                        warn!(
                            backend = backend.name(),
                            error = %e,
                            "could not load analysis history, starting empty"
                        );
                        JobStore::detached(backend)
                    }
                };
                Arc::new(store)
            }
        };

        Ok(AnalysisClient {
            transport,
            store,
            poll_config,
            active: Mutex::new(None),
        })
    }
}

impl Default for AnalysisClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse::<T>().ok()
}
