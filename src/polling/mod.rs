//! 轮询模块：驱动状态查询直至任务结束，带有界重试与退避。
//!
//! # Polling Module
//!
//! A [`Poller`] repeatedly asks a [`StatusSource`] for the snapshot of one job and feeds
//! each result into the [`JobStore`](crate::store::JobStore):
//!
//! - success, non-terminal: merge the snapshot, wait `interval`, poll again
//! - success, terminal: record the final result and stop
//! - failure: retry after `interval * backoff_multiplier` until the attempt budget is
//!   spent or the failure is classified as fatal, then hand a user-facing message to
//!   the failure callback
//!
//! Ticks never overlap, and the loop checks its cancellation token and the store's
//! current job id before applying anything.

mod poller;

pub use poller::{FailureCallback, PollHandle, PollOutcome, Poller};

use crate::transport::HttpTransport;
use crate::types::JobSnapshot;
use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5_000);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Where snapshots come from. Implemented by [`HttpTransport`]; tests script their own.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, job_id: &str) -> Result<JobSnapshot>;
}

#[async_trait]
impl StatusSource for HttpTransport {
    async fn fetch_status(&self, job_id: &str) -> Result<JobSnapshot> {
        HttpTransport::fetch_status(self, job_id).await
    }
}

/// Polling cadence and retry budget.
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    pub interval: Duration,
    /// Total status fetches allowed for one job.
    pub max_attempts: u32,
    /// Applied once to `interval` after a failed fetch; does not compound.
    pub backoff_multiplier: f64,
    /// Abort on 4xx responses (except 408/429) instead of retrying them.
    pub fail_fast_on_client_error: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            fail_fast_on_client_error: false,
        }
    }
}

impl PollConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_fail_fast_on_client_error(mut self, enable: bool) -> Self {
        self.fail_fast_on_client_error = enable;
        self
    }

    /// Delay before the tick that follows a failed fetch.
    pub fn retry_delay(&self) -> Duration {
        let multiplier = if self.backoff_multiplier.is_finite() {
            self.backoff_multiplier.max(1.0)
        } else {
            DEFAULT_BACKOFF_MULTIPLIER
        };
        self.interval.mul_f64(multiplier)
    }
}
