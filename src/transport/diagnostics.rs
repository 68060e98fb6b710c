//! Best-effort health probing, used to annotate submission failures in the logs.

use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Result of one health probe. Never escalated as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Reachable { status: u16, elapsed_ms: u64 },
    Unreachable { reason: String },
}

impl ProbeOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeOutcome::Reachable { status, .. } if (200..300).contains(status))
    }
}

/// Probe `health_url` once and log what happened.
pub async fn probe_health(
    client: &reqwest::Client,
    health_url: &str,
    timeout: Duration,
) -> ProbeOutcome {
    let start = Instant::now();
    let outcome = match tokio::time::timeout(timeout, client.get(health_url).send()).await {
        Ok(Ok(resp)) => ProbeOutcome::Reachable {
            status: resp.status().as_u16(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        },
        Ok(Err(e)) => ProbeOutcome::Unreachable {
            reason: e.to_string(),
        },
        Err(_) => ProbeOutcome::Unreachable {
            reason: format!("no response within {} ms", timeout.as_millis()),
        },
    };

    match &outcome {
        ProbeOutcome::Reachable { status, elapsed_ms } if outcome.is_healthy() => info!(
            health_url,
            http_status = *status,
            elapsed_ms = *elapsed_ms,
            "analysis service health probe succeeded"
        ),
        ProbeOutcome::Reachable { status, elapsed_ms } => warn!(
            health_url,
            http_status = *status,
            elapsed_ms = *elapsed_ms,
            "analysis service health probe returned a non-success status"
        ),
        ProbeOutcome::Unreachable { reason } => warn!(
            health_url,
            reason = reason.as_str(),
            "analysis service health probe failed"
        ),
    }
    outcome
}

/// Fire a probe in the background. The caller does not wait for it.
pub fn spawn_health_probe(
    client: reqwest::Client,
    health_url: String,
    timeout: Duration,
) -> JoinHandle<ProbeOutcome> {
    tokio::spawn(async move { probe_health(&client, &health_url, timeout).await })
}
