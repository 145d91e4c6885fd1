//! Leadership gate tests: term lifecycle around elector transitions.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use endpoint_health_checker::core::cluster::election::LeaderEvent;
use endpoint_health_checker::core::{
    HealthChecker, LeadershipGate, Scheduler, TargetSet, Watcher,
};

use crate::common::{wait_until, CountingStream, FailingStream, RecordingClient, ScriptedElector};

const SETTLE: Duration = Duration::from_secs(5);

fn gate_with_stream(
    stream: Arc<dyn endpoint_health_checker::core::cluster::stream::WorkloadStream>,
) -> (
    LeadershipGate,
    futures::channel::mpsc::UnboundedSender<LeaderEvent>,
) {
    let targets = Arc::new(TargetSet::new());
    let client = RecordingClient::new();
    let checker = Arc::new(HealthChecker::new(client, 0, Duration::from_millis(50)));
    let watcher = Arc::new(Watcher::new(Arc::clone(&targets), stream));
    let scheduler = Arc::new(Scheduler::new(
        targets,
        checker,
        Duration::from_millis(20),
        1,
    ));
    let (elector, transitions) = ScriptedElector::new();
    (LeadershipGate::new(elector, watcher, scheduler), transitions)
}

#[tokio::test]
async fn test_watcher_runs_only_while_leading() {
    let stream = Arc::new(CountingStream::default());
    let (gate, transitions) = gate_with_stream(stream.clone());

    let stop = CancellationToken::new();
    let handle = tokio::spawn({
        let stop = stop.clone();
        async move { gate.run(stop).await }
    });

    // Not leading yet: nothing starts.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(stream.watch_calls.load(Ordering::SeqCst), 0);

    transitions
        .unbounded_send(LeaderEvent::Acquired)
        .unwrap();
    wait_until(SETTLE, || stream.watch_calls.load(Ordering::SeqCst) == 1).await;

    // Demotion tears the term down without exiting; re-acquisition starts a
    // fresh watcher.
    transitions
        .unbounded_send(LeaderEvent::Released)
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    transitions
        .unbounded_send(LeaderEvent::Acquired)
        .unwrap();
    wait_until(SETTLE, || stream.watch_calls.load(Ordering::SeqCst) == 2).await;

    stop.cancel();
    let result = tokio::time::timeout(SETTLE, handle).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_observed_leaders_do_not_start_terms() {
    let stream = Arc::new(CountingStream::default());
    let (gate, transitions) = gate_with_stream(stream.clone());

    let stop = CancellationToken::new();
    let handle = tokio::spawn({
        let stop = stop.clone();
        async move { gate.run(stop).await }
    });

    transitions
        .unbounded_send(LeaderEvent::NewLeader("other_replica".to_string()))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(stream.watch_calls.load(Ordering::SeqCst), 0);

    stop.cancel();
    let result = tokio::time::timeout(SETTLE, handle).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_cache_sync_failure_is_fatal() {
    let (gate, transitions) = gate_with_stream(Arc::new(FailingStream));

    let stop = CancellationToken::new();
    let handle = tokio::spawn({
        let stop = stop.clone();
        async move { gate.run(stop).await }
    });

    transitions
        .unbounded_send(LeaderEvent::Acquired)
        .unwrap();

    let result = tokio::time::timeout(SETTLE, handle).await.unwrap().unwrap();
    assert!(result.is_err());
}

#[tokio::test]
async fn test_elector_stream_end_shuts_down() {
    let stream = Arc::new(CountingStream::default());
    let (gate, transitions) = gate_with_stream(stream);

    let stop = CancellationToken::new();
    let handle = tokio::spawn({
        let stop = stop.clone();
        async move { gate.run(stop).await }
    });

    drop(transitions);
    let result = tokio::time::timeout(SETTLE, handle).await.unwrap().unwrap();
    assert!(result.is_ok());
}
