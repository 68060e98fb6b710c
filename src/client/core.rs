use crate::client::builder::AnalysisClientBuilder;
use crate::client::validation::normalize_url;
use crate::polling::{FailureCallback, PollConfig, PollHandle, PollOutcome, Poller, StatusSource};
use crate::store::JobStore;
use crate::transport::{HttpTransport, ProbeOutcome};
use crate::types::JobSnapshot;
use crate::{Error, Result};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Entry point tying submission, polling and the job store together.
///
/// At most one job is active: [`analyze`](Self::analyze) supersedes whatever poll is
/// still running for a previous job.
pub struct AnalysisClient {
    pub(crate) transport: Arc<HttpTransport>,
    pub(crate) store: Arc<JobStore>,
    pub(crate) poll_config: PollConfig,
    pub(crate) active: Mutex<Option<CancellationToken>>,
}

impl AnalysisClient {
    /// Create a client configured from the environment.
    pub async fn new() -> Result<Self> {
        AnalysisClientBuilder::new().build().await
    }

    pub fn builder() -> AnalysisClientBuilder {
        AnalysisClientBuilder::new()
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn transport(&self) -> &Arc<HttpTransport> {
        &self.transport
    }

    pub fn poll_config(&self) -> &PollConfig {
        &self.poll_config
    }

    /// Validate `raw_url`, submit it, and start polling the new job in the background.
    ///
    /// - Invalid input fails with [`Error::Validation`] before any network call and
    ///   leaves the store untouched.
    /// - A failed submission is not retried; the job is moved to `error` and the error
    ///   is returned.
    /// - On success the returned handle resolves to the [`PollOutcome`]; the store
    ///   reflects every step along the way.
    pub async fn analyze(&self, raw_url: &str) -> Result<PollHandle> {
        let url = normalize_url(raw_url)?;

        let token = CancellationToken::new();
        self.replace_active(Some(token.clone()));
        let placeholder = self.store.start_analysis(url.clone());

        let job_id = match self.transport.submit(&url).await {
            Ok(id) => id,
            Err(e) => {
                self.store
                    .set_error_if_current(&placeholder.id, e.user_message());
                return Err(e);
            }
        };

        if token.is_cancelled() || !self.store.assign_server_id(&placeholder.id, &job_id) {
            return Err(Error::cancelled("analyze"));
        }

        info!(job_id = job_id.as_str(), url = url.as_str(), "polling analysis");
        let store = self.store.clone();
        let failed_id = job_id.clone();
        let on_failure: FailureCallback = Box::new(move |message| {
            store.set_error_if_current(&failed_id, message);
        });
        let source: Arc<dyn StatusSource> = self.transport.clone();
        let poller = Poller::new(source, self.store.clone(), self.poll_config.clone());
        Ok(poller.spawn_with_token(job_id, token, on_failure))
    }

    /// [`analyze`](Self::analyze) and wait for the poll to end.
    pub async fn analyze_and_wait(&self, raw_url: &str) -> Result<PollOutcome> {
        self.analyze(raw_url).await?.wait().await
    }

    /// Stop the active poll, if any, and mark its job as cancelled.
    ///
    /// Returns `false` when nothing was running: no analysis was started, it was already
    /// cancelled, or its job already finished.
    pub fn cancel(&self) -> bool {
        let Some(token) = self.replace_active(None) else {
            return false;
        };
        let was_running = !token.is_cancelled();
        token.cancel();
        if !was_running {
            return false;
        }
        match self.store.current().filter(|j| !j.is_terminal()) {
            Some(job) => self
                .store
                .set_error_if_current(&job.id, Error::cancelled("cancel").user_message()),
            None => false,
        }
    }

    /// Swap the active token for `next`; a replaced token is cancelled when `next` is set.
    fn replace_active(&self, next: Option<CancellationToken>) -> Option<CancellationToken> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        let previous = std::mem::replace(&mut *active, next);
        if let Some(prev) = &previous {
            if active.is_some() {
                prev.cancel();
            }
        }
        previous
    }

    /// Recent analyses as recorded by the service.
    pub async fn fetch_history(&self, limit: usize) -> Result<Vec<JobSnapshot>> {
        self.transport.fetch_history(limit).await
    }

    /// Run the health probe in the foreground.
    pub async fn probe(&self) -> ProbeOutcome {
        self.transport.probe().await
    }
}
