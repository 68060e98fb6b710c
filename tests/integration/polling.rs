//! Poller behaviour with a scripted status source and paused time

use async_trait::async_trait;
use responsive_audit::polling::FailureCallback;
use responsive_audit::{
    Error, ErrorContext, JobSnapshot, JobStatus, JobStore, PollConfig, PollOutcome, Poller,
    Result, Score, StatusSource,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

const INTERVAL: Duration = Duration::from_millis(5_000);

/// Replays a fixed script and records when each fetch happened.
struct ScriptedSource {
    script: Mutex<VecDeque<Result<JobSnapshot>>>,
    calls: Mutex<Vec<Instant>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedSource {
    fn new(script: Vec<Result<JobSnapshot>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
            gate: None,
        })
    }

    fn gated(script: Vec<Result<JobSnapshot>>, gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
            gate: Some(gate),
        })
    }

    fn calls(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusSource for ScriptedSource {
    async fn fetch_status(&self, _job_id: &str) -> Result<JobSnapshot> {
        self.calls.lock().unwrap().push(Instant::now());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(analyzing(50)))
    }
}

fn analyzing(progress: u32) -> JobSnapshot {
    JobSnapshot {
        status: JobStatus::Analyzing,
        progress,
        message: format!("{progress}% done"),
        ..Default::default()
    }
}

fn completed(overall: u8) -> JobSnapshot {
    JobSnapshot {
        status: JobStatus::Completed,
        progress: 100,
        summary: "Looks good on most devices".to_string(),
        score: Score {
            mobile: overall,
            tablet: overall,
            desktop: overall,
            overall,
        },
        ..Default::default()
    }
}

fn unreachable() -> Error {
    Error::network_with_context("connection refused", ErrorContext::new())
}

fn counting_callback() -> (FailureCallback, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let cb: FailureCallback = Box::new(move |msg| sink.lock().unwrap().push(msg));
    (cb, seen)
}

fn config() -> PollConfig {
    PollConfig::new().with_interval(INTERVAL).with_max_attempts(60)
}

#[tokio::test(start_paused = true)]
async fn polls_until_completed_at_interval() {
    let store = Arc::new(JobStore::new());
    let job = store.start_analysis("https://example.com");
    let source = ScriptedSource::new(vec![
        Ok(analyzing(10)),
        Ok(analyzing(40)),
        Ok(analyzing(80)),
        Ok(completed(91)),
    ]);
    let (cb, failures) = counting_callback();

    let poller = Poller::new(source.clone(), store.clone(), config());
    let outcome = poller.spawn(job.id.clone(), cb).wait().await.unwrap();

    match outcome {
        PollOutcome::Completed { job: done, attempts } => {
            assert_eq!(attempts, 4);
            assert_eq!(done.score.overall, 91);
            assert_eq!(done.id, job.id);
            assert_eq!(done.url, "https://example.com");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let calls = source.calls();
    assert_eq!(calls.len(), 4);
    for pair in calls.windows(2) {
        assert!(pair[1] - pair[0] >= INTERVAL);
    }
    assert!(failures.lock().unwrap().is_empty());
    assert_eq!(store.history().len(), 1);
    assert!(!store.is_loading());
}

#[tokio::test(start_paused = true)]
async fn pending_snapshot_moves_job_to_analyzing() {
    let store = Arc::new(JobStore::new());
    let job = store.start_analysis("https://example.com");
    let pending = JobSnapshot {
        status: JobStatus::Pending,
        progress: 5,
        ..Default::default()
    };
    let source = ScriptedSource::new(vec![Ok(pending), Ok(completed(70))]);
    let mut updates = store.subscribe();
    let (cb, _) = counting_callback();

    let handle = Poller::new(source, store.clone(), config()).spawn(job.id.clone(), cb);

    updates.changed().await.unwrap();
    let seen = updates.borrow_and_update().current.clone().unwrap();
    assert_eq!(seen.status, JobStatus::Analyzing);
    assert_eq!(seen.progress, 5);

    assert!(matches!(handle.wait().await.unwrap(), PollOutcome::Completed { .. }));
}

#[tokio::test(start_paused = true)]
async fn exhausting_attempts_reports_failure_once() {
    let store = Arc::new(JobStore::new());
    let job = store.start_analysis("https://example.com");
    let max = 5;
    let source = ScriptedSource::new((0..max).map(|_| Err(unreachable())).collect());
    let (cb, failures) = counting_callback();

    let poller = Poller::new(
        source.clone(),
        store.clone(),
        config().with_max_attempts(max),
    );
    let outcome = poller.spawn(job.id.clone(), cb).wait().await.unwrap();

    assert!(matches!(outcome, PollOutcome::Aborted { attempts: 5, .. }), "{outcome:?}");
    assert_eq!(source.calls().len(), max as usize);
    assert_eq!(failures.lock().unwrap().len(), 1);
    // The callback owns the store transition; the poller itself does not mark the job.
    assert_eq!(store.current().unwrap().status, JobStatus::Pending);
}

#[tokio::test(start_paused = true)]
async fn non_terminal_ticks_count_against_budget() {
    let store = Arc::new(JobStore::new());
    let job = store.start_analysis("https://example.com");
    let source = ScriptedSource::new(Vec::new());
    let (cb, failures) = counting_callback();

    let outcome = Poller::new(source.clone(), store.clone(), config().with_max_attempts(3))
        .spawn(job.id.clone(), cb)
        .wait()
        .await
        .unwrap();

    assert!(matches!(outcome, PollOutcome::Aborted { attempts: 3, .. }));
    assert_eq!(source.calls().len(), 3);
    let messages = failures.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("longer than expected"));
}

#[tokio::test(start_paused = true)]
async fn failed_fetch_backs_off_once() {
    let store = Arc::new(JobStore::new());
    let job = store.start_analysis("https://example.com");
    let source = ScriptedSource::new(vec![
        Ok(analyzing(10)),
        Err(unreachable()),
        Ok(analyzing(30)),
        Err(unreachable()),
        Ok(completed(80)),
    ]);
    let (cb, _) = counting_callback();

    let outcome = Poller::new(source.clone(), store.clone(), config())
        .spawn(job.id.clone(), cb)
        .wait()
        .await
        .unwrap();
    assert!(matches!(outcome, PollOutcome::Completed { attempts: 5, .. }));

    let calls = source.calls();
    let gaps: Vec<Duration> = calls.windows(2).map(|p| p[1] - p[0]).collect();
    assert_eq!(gaps.len(), 4);
    assert!(gaps[0] >= INTERVAL && gaps[0] < INTERVAL * 2);
    assert!(gaps[1] >= INTERVAL * 2 && gaps[1] < INTERVAL * 3);
    assert!(gaps[2] >= INTERVAL && gaps[2] < INTERVAL * 2);
    // A second failure waits the same single-step delay, it does not compound.
    assert!(gaps[3] >= INTERVAL * 2 && gaps[3] < INTERVAL * 3);
}

#[tokio::test(start_paused = true)]
async fn undecodable_response_aborts_immediately() {
    let store = Arc::new(JobStore::new());
    let job = store.start_analysis("https://example.com");
    let bad_body = serde_json::from_str::<JobSnapshot>("not json").unwrap_err();
    let source = ScriptedSource::new(vec![Err(Error::from(bad_body))]);
    let (cb, failures) = counting_callback();

    let outcome = Poller::new(source.clone(), store, config())
        .spawn(job.id, cb)
        .wait()
        .await
        .unwrap();

    assert!(matches!(outcome, PollOutcome::Aborted { attempts: 1, .. }));
    assert_eq!(source.calls().len(), 1);
    assert_eq!(failures.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn fail_fast_stops_on_unknown_job() {
    let store = Arc::new(JobStore::new());
    let job = store.start_analysis("https://example.com");
    let not_found = Error::RequestFailed {
        status: 404,
        message: "Analysis not found".to_string(),
    };
    let source = ScriptedSource::new(vec![Err(not_found)]);
    let (cb, failures) = counting_callback();

    let outcome = Poller::new(
        source.clone(),
        store,
        config().with_fail_fast_on_client_error(true),
    )
    .spawn(job.id, cb)
    .wait()
    .await
    .unwrap();

    match outcome {
        PollOutcome::Aborted { attempts, message } => {
            assert_eq!(attempts, 1);
            assert_eq!(message, "Analysis not found");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(failures.lock().unwrap().as_slice(), ["Analysis not found"]);
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_polling() {
    let store = Arc::new(JobStore::new());
    let job = store.start_analysis("https://example.com");
    let source = ScriptedSource::new(Vec::new());
    let (cb, failures) = counting_callback();

    let handle = Poller::new(source.clone(), store.clone(), config()).spawn(job.id.clone(), cb);
    tokio::time::sleep(INTERVAL * 2 + Duration::from_millis(10)).await;
    handle.cancel();
    let outcome = handle.wait().await.unwrap();

    assert!(matches!(outcome, PollOutcome::Cancelled { attempts: 3 }), "{outcome:?}");
    let calls_at_cancel = source.calls().len();
    tokio::time::sleep(INTERVAL * 10).await;
    assert_eq!(source.calls().len(), calls_at_cancel);
    assert!(failures.lock().unwrap().is_empty());
    assert!(store.history().is_empty());
}

#[tokio::test(start_paused = true)]
async fn response_after_cancel_is_discarded() {
    let store = Arc::new(JobStore::new());
    let job = store.start_analysis("https://example.com");
    let gate = Arc::new(Notify::new());
    let source = ScriptedSource::gated(vec![Ok(completed(99))], gate.clone());
    let (cb, _) = counting_callback();

    let handle = Poller::new(source.clone(), store.clone(), config()).spawn(job.id.clone(), cb);
    while source.calls().is_empty() {
        tokio::task::yield_now().await;
    }
    handle.cancel();
    gate.notify_one();

    let outcome = handle.wait().await.unwrap();
    assert!(matches!(outcome, PollOutcome::Cancelled { attempts: 1 }));
    assert_eq!(store.current().unwrap().status, JobStatus::Pending);
    assert!(store.history().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stale_response_does_not_touch_newer_job() {
    let store = Arc::new(JobStore::new());
    let first = store.start_analysis("https://first.example");
    let gate = Arc::new(Notify::new());
    let source = ScriptedSource::gated(vec![Ok(completed(10))], gate.clone());
    let (cb, failures) = counting_callback();

    let handle = Poller::new(source.clone(), store.clone(), config()).spawn(first.id.clone(), cb);
    while source.calls().is_empty() {
        tokio::task::yield_now().await;
    }

    let second = store.start_analysis("https://second.example");
    gate.notify_one();

    let outcome = handle.wait().await.unwrap();
    assert!(matches!(outcome, PollOutcome::Superseded { attempts: 1 }));

    let current = store.current().unwrap();
    assert_eq!(current.id, second.id);
    assert_eq!(current.status, JobStatus::Pending);
    assert!(store.history().is_empty());
    assert!(failures.lock().unwrap().is_empty());
}
