//! Watcher tests: membership derivation from watch events.

use std::sync::Arc;
use std::time::Duration;

use futures::channel::mpsc;
use tokio_util::sync::CancellationToken;

use endpoint_health_checker::core::cluster::stream::{Deleted, WatchEvent};
use endpoint_health_checker::core::cluster::types::{
    ConditionStatus, Workload, WorkloadPhase, ENABLED_ANNOTATION,
};
use endpoint_health_checker::core::{TargetSet, Watcher};

use crate::common::{wait_until, workload, ScriptedStream};

const SETTLE: Duration = Duration::from_secs(2);

fn spawn_watcher(
    initial: Vec<Workload>,
) -> (
    Arc<TargetSet>,
    mpsc::UnboundedSender<WatchEvent>,
    CancellationToken,
) {
    let targets = Arc::new(TargetSet::new());
    let (stream, events) = ScriptedStream::new(initial);
    let watcher = Watcher::new(Arc::clone(&targets), stream);
    let stop = CancellationToken::new();
    tokio::spawn({
        let stop = stop.clone();
        async move { watcher.run(stop).await }
    });
    (targets, events, stop)
}

/// Deliver a recognizable marker event and wait for it, so preceding events
/// are known to have been applied before asserting absences.
async fn settle(targets: &TargetSet, events: &mpsc::UnboundedSender<WatchEvent>) {
    events
        .unbounded_send(WatchEvent::Added(workload("sentinel", "sentinel", "203.0.113.99")))
        .unwrap();
    wait_until(SETTLE, || targets.get("203.0.113.99").is_some()).await;
}

#[tokio::test]
async fn test_initial_list_installs_eligible_targets() {
    let (targets, _events, stop) = spawn_watcher(vec![workload("default", "a", "10.0.0.1")]);
    wait_until(SETTLE, || targets.get("10.0.0.1").is_some()).await;
    stop.cancel();
}

#[tokio::test]
async fn test_ineligible_adds_are_ignored() {
    let empty_address = workload("default", "a", "");
    let mut not_ready = workload("default", "b", "10.0.0.2");
    not_ready.conditions[0].status = ConditionStatus::False;
    let mut not_running = workload("default", "c", "10.0.0.3");
    not_running.phase = WorkloadPhase::Pending;

    let (targets, events, stop) =
        spawn_watcher(vec![empty_address, not_ready, not_running]);
    settle(&targets, &events).await;

    assert_eq!(targets.stats().total, 1); // only the sentinel
    stop.cancel();
}

#[tokio::test]
async fn test_annotation_flip_creates_entry_on_update() {
    let mut disabled = workload("default", "a", "10.0.0.1");
    disabled
        .annotations
        .insert(ENABLED_ANNOTATION.to_string(), "false".to_string());

    let (targets, events, stop) = spawn_watcher(vec![disabled]);
    settle(&targets, &events).await;
    assert!(targets.get("10.0.0.1").is_none());

    events
        .unbounded_send(WatchEvent::Updated(workload("default", "a", "10.0.0.1")))
        .unwrap();
    wait_until(SETTLE, || targets.get("10.0.0.1").is_some()).await;
    stop.cancel();
}

#[tokio::test]
async fn test_update_changing_address_leaves_old_entry_until_delete() {
    let (targets, events, stop) = spawn_watcher(vec![workload("default", "a", "10.0.0.1")]);
    wait_until(SETTLE, || targets.get("10.0.0.1").is_some()).await;

    events
        .unbounded_send(WatchEvent::Updated(workload("default", "a", "10.0.0.2")))
        .unwrap();
    wait_until(SETTLE, || targets.get("10.0.0.2").is_some()).await;
    // The stale entry persists until its own delete event arrives.
    assert!(targets.get("10.0.0.1").is_some());

    events
        .unbounded_send(WatchEvent::Deleted(Deleted::Object(workload(
            "default", "a", "10.0.0.1",
        ))))
        .unwrap();
    wait_until(SETTLE, || targets.get("10.0.0.1").is_none()).await;
    assert!(targets.get("10.0.0.2").is_some());
    stop.cancel();
}

#[tokio::test]
async fn test_tombstone_delete_is_unwrapped() {
    let (targets, events, stop) = spawn_watcher(vec![workload("default", "a", "10.0.0.1")]);
    wait_until(SETTLE, || targets.get("10.0.0.1").is_some()).await;

    events
        .unbounded_send(WatchEvent::Deleted(Deleted::Tombstone(workload(
            "default", "a", "10.0.0.1",
        ))))
        .unwrap();
    wait_until(SETTLE, || targets.get("10.0.0.1").is_none()).await;
    stop.cancel();
}

#[tokio::test]
async fn test_delete_without_address_falls_back_to_identity() {
    let (targets, events, stop) = spawn_watcher(vec![workload("default", "a", "10.0.0.1")]);
    wait_until(SETTLE, || targets.get("10.0.0.1").is_some()).await;

    let mut gone = workload("default", "a", "10.0.0.1");
    gone.address.clear();
    events
        .unbounded_send(WatchEvent::Deleted(Deleted::Object(gone)))
        .unwrap();
    wait_until(SETTLE, || targets.get("10.0.0.1").is_none()).await;
    stop.cancel();
}

#[tokio::test]
async fn test_disabling_update_does_not_remove_entry() {
    let (targets, events, stop) = spawn_watcher(vec![workload("default", "a", "10.0.0.1")]);
    wait_until(SETTLE, || targets.get("10.0.0.1").is_some()).await;

    let mut disabled = workload("default", "a", "10.0.0.1");
    disabled
        .annotations
        .insert(ENABLED_ANNOTATION.to_string(), "false".to_string());
    events
        .unbounded_send(WatchEvent::Updated(disabled))
        .unwrap();
    settle(&targets, &events).await;

    // Removal is delete-driven only.
    assert!(targets.get("10.0.0.1").is_some());
    stop.cancel();
}
