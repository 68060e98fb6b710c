//! 任务状态存储：当前任务的状态机与有界历史记录。
//!
//! # Job Store
//!
//! [`JobStore`] owns the single current [`Job`] and the bounded history list. It is
//! constructed explicitly by the application and shared by `Arc`; the polling task and
//! the submission flow only ever hold a job id and go through the mutation methods here.
//!
//! Every mutation replaces the published [`StoreState`] in one step, so observers obtained
//! from [`JobStore::subscribe`] never see a half-applied update.
//!
//! ```rust
//! use responsive_audit::store::JobStore;
//! use responsive_audit::types::{JobStatus, JobUpdate};
//!
//! let store = JobStore::new();
//! let job = store.start_analysis("https://example.com");
//! store.update_status(JobUpdate::new().status(JobStatus::Analyzing).current_step(2));
//! assert_eq!(store.current().unwrap().id, job.id);
//! ```

pub mod history;

pub use history::{FileHistory, HistoryBackend, MemoryHistory};

use crate::types::{Job, JobStatus, JobUpdate};
use crate::Result;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

/// Number of finished jobs kept in history.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Everything an observer can see, published as one value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    pub current: Option<Job>,
    /// Oldest first.
    pub history: Vec<Job>,
    pub loading: bool,
    pub error: Option<String>,
}

pub struct JobStore {
    state: watch::Sender<StoreState>,
    backend: Arc<dyn HistoryBackend>,
    history_limit: usize,
    /// Held across each save so writes land in mutation order.
    save_lock: Mutex<()>,
}

impl JobStore {
    /// A store with in-memory history.
    pub fn new() -> Self {
        Self::with_backend(Arc::new(MemoryHistory::new()), Vec::new())
    }

    /// Open a store over `backend`, loading previously persisted history.
    pub async fn open(backend: Arc<dyn HistoryBackend>) -> Result<Self> {
        let history = backend.load().await?;
        debug!(
            backend = backend.name(),
            entries = history.len(),
            "history loaded"
        );
        Ok(Self::with_backend(backend, history))
    }

    /// A store over `backend` that starts with empty history instead of loading it.
    ///
    /// The next history mutation overwrites whatever the backend held.
    pub fn detached(backend: Arc<dyn HistoryBackend>) -> Self {
        Self::with_backend(backend, Vec::new())
    }

    fn with_backend(backend: Arc<dyn HistoryBackend>, history: Vec<Job>) -> Self {
        let (state, _) = watch::channel(StoreState::default());
        let store = Self {
            state,
            backend,
            history_limit: DEFAULT_HISTORY_LIMIT,
            save_lock: Mutex::new(()),
        };
        store.state.send_modify(|s| {
            s.history = history;
            truncate_oldest(&mut s.history, store.history_limit);
        });
        store
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        let limit = self.history_limit;
        self.state
            .send_modify(|s| truncate_oldest(&mut s.history, limit));
        self
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    pub fn subscribe(&self) -> watch::Receiver<StoreState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> StoreState {
        self.state.borrow().clone()
    }

    pub fn current(&self) -> Option<Job> {
        self.state.borrow().current.clone()
    }

    pub fn current_id(&self) -> Option<String> {
        self.state.borrow().current.as_ref().map(|j| j.id.clone())
    }

    pub fn is_current(&self, job_id: &str) -> bool {
        self.state
            .borrow()
            .current
            .as_ref()
            .is_some_and(|j| j.id == job_id)
    }

    pub fn history(&self) -> Vec<Job> {
        self.state.borrow().history.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    pub fn error(&self) -> Option<String> {
        self.state.borrow().error.clone()
    }

    /// Replace whatever is current with a new `pending` job under a placeholder id.
    pub fn start_analysis(&self, url: impl Into<String>) -> Job {
        let job = Job::pending(Uuid::new_v4().to_string(), url);
        let published = job.clone();
        self.state.send_modify(|s| {
            s.current = Some(published);
            s.loading = true;
            s.error = None;
        });
        debug!(job_id = job.id.as_str(), url = job.url.as_str(), "analysis started");
        job
    }

    /// Swap the placeholder id for the one issued by the service.
    ///
    /// Returns `false` if the placeholder job is no longer current.
    pub fn assign_server_id(&self, placeholder: &str, server_id: &str) -> bool {
        self.state.send_if_modified(|s| match s.current.as_mut() {
            Some(job) if job.id == placeholder => {
                job.id = server_id.to_string();
                true
            }
            _ => false,
        })
    }

    /// Merge `update` into the current job.
    ///
    /// No-op when there is no current job or the current job is already terminal.
    pub fn update_status(&self, update: JobUpdate) -> bool {
        self.state
            .send_if_modified(|s| merge_into_current(s, None, update))
    }

    /// [`update_status`](Self::update_status), applied only while `job_id` is current.
    pub fn update_status_if_current(&self, job_id: &str, update: JobUpdate) -> bool {
        self.state
            .send_if_modified(|s| merge_into_current(s, Some(job_id), update))
    }

    /// Replace the current job with a terminal result and append it to history.
    pub async fn complete_analysis(&self, result: Job) {
        self.state.send_modify(|s| self.finish(s, result));
        self.persist().await;
    }

    /// [`complete_analysis`](Self::complete_analysis), applied only while `job_id` is current.
    pub async fn complete_analysis_if_current(&self, job_id: &str, result: Job) -> bool {
        let applied = self.state.send_if_modified(|s| {
            if !s.current.as_ref().is_some_and(|j| j.id == job_id) {
                return false;
            }
            self.finish(s, result);
            true
        });
        if applied {
            self.persist().await;
        }
        applied
    }

    fn finish(&self, s: &mut StoreState, mut result: Job) {
        if let Some(prev) = s.current.as_ref() {
            if result.id.is_empty() {
                result.id = prev.id.clone();
            }
            if result.url.is_empty() {
                result.url = prev.url.clone();
            }
            if result.created_at.is_none() {
                result.created_at = prev.created_at.clone();
            }
        }
        if !result.is_terminal() {
            result.status = JobStatus::Completed;
        }
        s.error = match result.status {
            JobStatus::Error => Some(
                result
                    .error
                    .clone()
                    .unwrap_or_else(|| "Analysis failed".to_string()),
            ),
            _ => None,
        };
        s.history.push(result.clone());
        truncate_oldest(&mut s.history, self.history_limit);
        s.current = Some(result);
        s.loading = false;
    }

    /// Move the current job to `error` and record `message` as the store's error.
    ///
    /// A job that already finished keeps its result; returns `false` in that case.
    pub fn set_error(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        self.state.send_if_modified(|s| fail_current(s, message))
    }

    /// [`set_error`](Self::set_error), applied only while `job_id` is current.
    pub fn set_error_if_current(&self, job_id: &str, message: impl Into<String>) -> bool {
        let message = message.into();
        self.state.send_if_modified(|s| {
            if !s.current.as_ref().is_some_and(|j| j.id == job_id) {
                return false;
            }
            fail_current(s, message)
        })
    }

    /// Drop the current job; history is untouched.
    pub fn clear_current(&self) {
        self.state.send_modify(|s| {
            s.current = None;
            s.loading = false;
            s.error = None;
        });
    }

    pub async fn clear_history(&self) {
        self.state.send_modify(|s| s.history.clear());
        self.persist().await;
    }

    /// Save the latest published history. Saves are serialized, so the last one to
    /// run always writes the newest list.
    async fn persist(&self) {
        let _guard = self.save_lock.lock().await;
        let history = self.state.borrow().history.clone();
        if let Err(e) = self.backend.save(&history).await {
            warn!(
                backend = self.backend.name(),
                error = %e,
                "failed to persist analysis history"
            );
        }
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

fn merge_into_current(s: &mut StoreState, expected_id: Option<&str>, update: JobUpdate) -> bool {
    let Some(job) = s.current.as_mut() else {
        return false;
    };
    if expected_id.is_some_and(|id| id != job.id) {
        return false;
    }
    if job.is_terminal() {
        debug!(job_id = job.id.as_str(), status = %job.status, "ignoring update for finished job");
        return false;
    }
    update.apply_to(job);
    true
}

fn fail_current(s: &mut StoreState, message: String) -> bool {
    if let Some(job) = s.current.as_mut() {
        if job.is_terminal() {
            debug!(job_id = job.id.as_str(), status = %job.status, "ignoring error for finished job");
            return false;
        }
        job.status = JobStatus::Error;
        job.error = Some(message.clone());
    }
    s.error = Some(message);
    s.loading = false;
    true
}

fn truncate_oldest(history: &mut Vec<Job>, limit: usize) {
    if history.len() > limit {
        let excess = history.len() - limit;
        history.drain(..excess);
    }
}
