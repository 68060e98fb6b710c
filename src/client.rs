//! Analysis client: submission, active-job bookkeeping and configuration.
//!
//! Implementation details are split into submodules under `src/client/`.

pub mod builder;
pub mod core;
pub mod error_classification;
pub mod validation;

pub use builder::AnalysisClientBuilder;
pub use core::AnalysisClient;
pub use error_classification::{classify_poll_failure, FailureAction};
pub use validation::normalize_url;
