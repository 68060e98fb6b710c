//! Error classification logic for the polling loop.

use crate::Error;

/// What the polling loop should do after a failed status fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Back off and try again, budget permitting.
    Retry,
    /// Stop now; retrying cannot help.
    Abort,
}

/// Classify a status-fetch failure.
///
/// Timeouts, transport failures and non-success responses are transient. With
/// `fail_fast_on_client_error`, 4xx responses other than 408 and 429 abort immediately
/// (e.g. the job is unknown to the service).
pub fn classify_poll_failure(error: &Error, fail_fast_on_client_error: bool) -> FailureAction {
    if !error.is_transient() {
        return FailureAction::Abort;
    }
    match error.status() {
        Some(status) if fail_fast_on_client_error && is_permanent_client_status(status) => {
            FailureAction::Abort
        }
        _ => FailureAction::Retry,
    }
}

pub(crate) fn is_permanent_client_status(status: u16) -> bool {
    (400..500).contains(&status) && status != 408 && status != 429
}
