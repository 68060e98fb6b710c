//! 传输层：与分析服务的 HTTP 通信、超时控制与故障诊断。
//!
//! # Transport Module
//!
//! [`HttpTransport`] speaks the analysis service's REST protocol:
//!
//! | Call | Endpoint |
//! |------|----------|
//! | [`HttpTransport::submit`] | `POST /analyze` |
//! | [`HttpTransport::fetch_status`] | `GET /analysis/{id}` |
//! | [`HttpTransport::fetch_history`] | `GET /history?limit=N` |
//! | [`HttpTransport::fetch_screenshots`] | `GET /screenshots/{id}` |
//! | [`HttpTransport::health`] | `GET /health` |
//!
//! Paths are appended to the configured base URL. The [`diagnostics`] submodule holds
//! the fire-and-forget health probe run after a failed submission.

pub mod diagnostics;
mod http;

pub use diagnostics::ProbeOutcome;
pub use http::{HttpTransport, TransportConfig, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
