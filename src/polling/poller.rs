use super::{PollConfig, StatusSource};
use crate::client::error_classification::{classify_poll_failure, FailureAction};
use crate::store::JobStore;
use crate::types::{Job, JobStatus, JobUpdate};
use crate::{Error, ErrorContext, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Receives the user-facing message when polling gives up. Called at most once.
pub type FailureCallback = Box<dyn FnOnce(String) + Send + 'static>;

/// How a polling run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The service reported `completed`; the result is in the store and its history.
    Completed { job: Job, attempts: u32 },
    /// The service reported `error`; the result is in the store and its history.
    Failed { job: Job, attempts: u32 },
    /// The attempt budget ran out or a fatal error occurred; the failure callback ran.
    Aborted { attempts: u32, message: String },
    /// The cancellation token fired.
    Cancelled { attempts: u32 },
    /// The job was replaced or finalized by someone else; nothing more was applied.
    Superseded { attempts: u32 },
}

impl PollOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Completed { attempts, .. }
            | PollOutcome::Failed { attempts, .. }
            | PollOutcome::Aborted { attempts, .. }
            | PollOutcome::Cancelled { attempts }
            | PollOutcome::Superseded { attempts } => *attempts,
        }
    }
}

/// Drives one job's status to a terminal state.
pub struct Poller {
    source: Arc<dyn StatusSource>,
    store: Arc<JobStore>,
    config: PollConfig,
}

impl Poller {
    pub fn new(source: Arc<dyn StatusSource>, store: Arc<JobStore>, config: PollConfig) -> Self {
        Self {
            source,
            store,
            config,
        }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Run the loop on a new task with its own cancellation token.
    pub fn spawn(self, job_id: impl Into<String>, on_failure: FailureCallback) -> PollHandle {
        self.spawn_with_token(job_id, CancellationToken::new(), on_failure)
    }

    pub fn spawn_with_token(
        self,
        job_id: impl Into<String>,
        token: CancellationToken,
        on_failure: FailureCallback,
    ) -> PollHandle {
        let job_id = job_id.into();
        let task_token = token.clone();
        let task_job_id = job_id.clone();
        let task =
            tokio::spawn(async move { self.run(&task_job_id, &task_token, on_failure).await });
        PollHandle {
            job_id,
            token,
            task,
        }
    }

    /// Poll `job_id` until it reaches a terminal state, the budget runs out, or `token`
    /// is cancelled.
    pub async fn run(
        &self,
        job_id: &str,
        token: &CancellationToken,
        on_failure: FailureCallback,
    ) -> PollOutcome {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempts: u32 = 0;

        loop {
            if token.is_cancelled() {
                return PollOutcome::Cancelled { attempts };
            }
            attempts += 1;
            let result = self.source.fetch_status(job_id).await;

            // Results that land after cancellation are dropped.
            if token.is_cancelled() {
                debug!(job_id, attempt = attempts, "poll cancelled, discarding response");
                return PollOutcome::Cancelled { attempts };
            }

            let failure = match result {
                Ok(snapshot) if snapshot.status.is_terminal() => {
                    return self.finish(job_id, Job::from_snapshot(snapshot), attempts).await;
                }
                Ok(snapshot) => {
                    debug!(
                        job_id,
                        attempt = attempts,
                        status = %snapshot.status,
                        progress = snapshot.progress,
                        "status received"
                    );
                    let mut update = JobUpdate::from(snapshot);
                    // Any non-terminal answer means the service has picked the job up.
                    if update.status == Some(JobStatus::Pending) {
                        update.status = Some(JobStatus::Analyzing);
                    }
                    if !self.store.update_status_if_current(job_id, update) {
                        debug!(job_id, attempt = attempts, "job no longer current, stopping");
                        return PollOutcome::Superseded { attempts };
                    }
                    if attempts >= max_attempts {
                        Some(format!(
                            "The analysis is taking longer than expected (no result after {} status checks).",
                            attempts
                        ))
                    } else {
                        None
                    }
                }
                Err(err) => {
                    let action =
                        classify_poll_failure(&err, self.config.fail_fast_on_client_error);
                    if action == FailureAction::Abort {
                        Some(err.user_message())
                    } else if attempts >= max_attempts {
                        Some(format!(
                            "The analysis is taking longer than expected. Last error: {}",
                            err.user_message()
                        ))
                    } else {
                        debug!(
                            job_id,
                            attempt = attempts,
                            error = %err,
                            "status fetch failed, backing off"
                        );
                        if !self.wait(token, self.config.retry_delay()).await {
                            return PollOutcome::Cancelled { attempts };
                        }
                        continue;
                    }
                }
            };

            if let Some(message) = failure {
                if !self.store.is_current(job_id) {
                    return PollOutcome::Superseded { attempts };
                }
                warn!(job_id, attempts, message = message.as_str(), "polling aborted");
                on_failure(message.clone());
                return PollOutcome::Aborted { attempts, message };
            }

            if !self.wait(token, self.config.interval).await {
                return PollOutcome::Cancelled { attempts };
            }
        }
    }

    async fn finish(&self, job_id: &str, mut job: Job, attempts: u32) -> PollOutcome {
        job.id = job_id.to_string();
        if !self.store.complete_analysis_if_current(job_id, job.clone()).await {
            debug!(job_id, attempt = attempts, "job no longer current, dropping result");
            return PollOutcome::Superseded { attempts };
        }
        let job = self.store.current().unwrap_or(job);
        info!(
            job_id,
            attempts,
            status = %job.status,
            overall_score = job.score.overall,
            "analysis finished"
        );
        if job.status == JobStatus::Completed {
            PollOutcome::Completed { job, attempts }
        } else {
            PollOutcome::Failed { job, attempts }
        }
    }

    /// Sleep for `delay`; `false` if cancelled first.
    async fn wait(&self, token: &CancellationToken, delay: std::time::Duration) -> bool {
        tokio::select! {
            _ = token.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

/// Handle to a spawned polling task. Dropping it detaches the task.
pub struct PollHandle {
    job_id: String,
    token: CancellationToken,
    task: JoinHandle<PollOutcome>,
}

impl PollHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Stop polling. An in-flight fetch is allowed to finish but its result is discarded.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn wait(self) -> Result<PollOutcome> {
        self.task.await.map_err(|e| {
            Error::runtime_with_context(
                format!("polling task failed: {}", e),
                ErrorContext::new().with_source("poller"),
            )
        })
    }
}
