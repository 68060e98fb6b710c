//! # responsive-audit
//!
//! 响应式分析服务的客户端运行时：提交任务、轮询状态、维护当前任务与历史记录。
//!
//! Client runtime for the responsive analysis service. It submits a URL for analysis,
//! tracks the resulting long-running job until it finishes, and keeps the report in a
//! store that any number of observers can watch.
//!
//! ## Overview
//!
//! The service analyzes a page asynchronously: `POST /analyze` returns a job id, and the
//! job's progress and final report are read from `GET /analysis/{id}`. This crate owns
//! the client side of that lifecycle:
//!
//! - **Transport**: [`transport::HttpTransport`] issues the calls with a per-request
//!   timeout and classifies every failure as a timeout, a network error or a failed
//!   request.
//! - **Polling**: [`polling::Poller`] drives status fetches on a fixed cadence with a
//!   bounded, single-step backoff, and stops on a terminal state, a fatal error, budget
//!   exhaustion, or cancellation.
//! - **Store**: [`store::JobStore`] is the single source of truth for the current job
//!   (`pending -> analyzing -> completed | error`) and the bounded history.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use responsive_audit::{AnalysisClient, PollOutcome};
//!
//! #[tokio::main]
//! async fn main() -> responsive_audit::Result<()> {
//!     let client = AnalysisClient::builder()
//!         .base_url("http://localhost:8000/api")
//!         .build()
//!         .await?;
//!
//!     let mut updates = client.store().subscribe();
//!     tokio::spawn(async move {
//!         while updates.changed().await.is_ok() {
//!             if let Some(job) = &updates.borrow_and_update().current {
//!                 println!("{}: {}", job.status, job.status_message);
//!             }
//!         }
//!     });
//!
//!     match client.analyze("example.com").await?.wait().await? {
//!         PollOutcome::Completed { job, .. } => println!("score {}", job.score.overall),
//!         other => println!("ended: {:?}", other),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Orchestration, URL validation and builder configuration |
//! | [`transport`] | HTTP calls, timeouts and diagnostics |
//! | [`polling`] | The polling loop and its configuration |
//! | [`store`] | Current-job state machine and history persistence |
//! | [`types`] | Job, snapshot and report types |

pub mod client;
pub mod polling;
pub mod store;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use client::{normalize_url, AnalysisClient, AnalysisClientBuilder};
pub use polling::{PollConfig, PollHandle, PollOutcome, Poller, StatusSource};
pub use store::{JobStore, StoreState};
pub use transport::{HttpTransport, TransportConfig};
pub use types::{Job, JobSnapshot, JobStatus, JobUpdate, Score};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
