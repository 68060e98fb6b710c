//! 类型模块：分析任务、状态快照与报告数据。
//!
//! # Types Module
//!
//! Strongly-typed representations of everything the analysis service sends back and
//! everything the client keeps about a job.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Job`] | The client-owned job, current or archived in history |
//! | [`JobStatus`] | `pending`, `analyzing`, `completed`, `error` |
//! | [`JobSnapshot`] | Payload of one status fetch |
//! | [`JobUpdate`] | Typed partial update merged into the current job |
//! | [`Score`], [`Issue`], [`Recommendation`], [`Screenshot`] | Report payload |

pub mod job;
pub mod report;

pub use job::{Job, JobSnapshot, JobStatus, JobUpdate, SubmitResponse};
pub use report::{
    DeviceType, Issue, IssueType, Priority, Recommendation, RecommendationCategory, Score,
    Screenshot,
};
