//! Job lifecycle types: the client-owned [`Job`], the wire [`JobSnapshot`] and the
//! typed partial [`JobUpdate`] used to merge progress into the current job.

use super::report::{Issue, Recommendation, Score, Screenshot};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an analysis job.
///
/// `Pending -> Analyzing -> {Completed | Error}`. The last two are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Analyzing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Analyzing => "analyzing",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Body of a successful `POST /analyze`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub analysis_id: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: Option<JobStatus>,
}

/// Payload returned by a single status fetch.
///
/// Field names follow the service (snake_case); camelCase aliases are accepted for the
/// progress counters since some deployments proxy through a JS gateway.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSnapshot {
    pub id: String,
    pub url: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    pub progress: u32,
    pub message: String,
    pub screenshots: Vec<Screenshot>,
    pub issues: Vec<Issue>,
    pub recommendations: Vec<Recommendation>,
    pub score: Score,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(alias = "currentStep", skip_serializing_if = "Option::is_none")]
    pub current_step: Option<u32>,
    #[serde(alias = "totalSteps", skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<u32>,
}

/// One analysis request and its evolving or final result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Job {
    pub id: String,
    pub url: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    pub progress: u8,
    pub current_step: u32,
    pub total_steps: u32,
    pub status_message: String,
    pub screenshots: Vec<Screenshot>,
    pub issues: Vec<Issue>,
    pub recommendations: Vec<Recommendation>,
    pub summary: String,
    pub score: Score,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    /// A freshly submitted job with an empty result payload.
    pub fn pending(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            status: JobStatus::Pending,
            status_message: "Starting analysis...".to_string(),
            ..Default::default()
        }
    }

    /// Build a full job from a snapshot, dropping payload fields that do not belong to
    /// the snapshot's status.
    pub fn from_snapshot(snapshot: JobSnapshot) -> Self {
        let mut job = Job {
            id: snapshot.id.clone(),
            url: snapshot.url.clone(),
            created_at: snapshot.created_at.clone(),
            ..Default::default()
        };
        JobUpdate::from(snapshot).apply_to(&mut job);
        job
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Strongly-typed partial update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u32>,
    pub current_step: Option<u32>,
    pub total_steps: Option<u32>,
    pub status_message: Option<String>,
    pub screenshots: Option<Vec<Screenshot>>,
    pub issues: Option<Vec<Issue>>,
    pub recommendations: Option<Vec<Recommendation>>,
    pub summary: Option<String>,
    pub score: Option<Score>,
    pub error: Option<String>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn progress(mut self, progress: u32) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn current_step(mut self, step: u32) -> Self {
        self.current_step = Some(step);
        self
    }

    pub fn total_steps(mut self, total: u32) -> Self {
        self.total_steps = Some(total);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.status_message = Some(message.into());
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == JobUpdate::default()
    }

    /// Merge into `job` field by field.
    ///
    /// Progress is clamped to 100 and scores to their 0..=100 range. Result payload and
    /// `error` are only written when the resulting status allows them.
    pub fn apply_to(self, job: &mut Job) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(progress) = self.progress {
            job.progress = progress.min(100) as u8;
        }
        if let Some(step) = self.current_step {
            job.current_step = step;
        }
        if let Some(total) = self.total_steps {
            job.total_steps = total;
        }
        if let Some(message) = self.status_message {
            job.status_message = message;
        }

        if job.status == JobStatus::Completed {
            if let Some(screenshots) = self.screenshots {
                job.screenshots = screenshots;
            }
            if let Some(issues) = self.issues {
                job.issues = issues;
            }
            if let Some(recommendations) = self.recommendations {
                job.recommendations = recommendations;
            }
            if let Some(summary) = self.summary {
                job.summary = summary;
            }
            if let Some(score) = self.score {
                job.score = score.clamped();
            }
        }

        if job.status == JobStatus::Error {
            if let Some(error) = self.error {
                job.error = Some(error);
            }
        } else {
            job.error = None;
        }
    }
}

impl From<JobSnapshot> for JobUpdate {
    fn from(snapshot: JobSnapshot) -> Self {
        let completed = snapshot.status == JobStatus::Completed;
        let error = if snapshot.status == JobStatus::Error {
            // Older service builds only fill `message` on failure.
            snapshot.error.or_else(|| {
                (!snapshot.message.is_empty()).then(|| snapshot.message.clone())
            })
        } else {
            None
        };
        JobUpdate {
            status: Some(snapshot.status),
            progress: Some(snapshot.progress),
            current_step: snapshot.current_step,
            total_steps: snapshot.total_steps,
            status_message: Some(snapshot.message),
            screenshots: completed.then_some(snapshot.screenshots),
            issues: completed.then_some(snapshot.issues),
            recommendations: completed.then_some(snapshot.recommendations),
            summary: completed.then_some(snapshot.summary),
            score: completed.then_some(snapshot.score),
            error,
        }
    }
}
