//! Health checker tests against real loopback listeners and a recording
//! client.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use endpoint_health_checker::core::cluster::types::{
    ConditionStatus, Workload, HEALTH_CONDITION_TYPE, READY_CONDITION_TYPE,
};
use endpoint_health_checker::core::{
    CheckOutcome, HealthChecker, Target, TargetSet, Verdict,
};

use crate::common::{with_gate, with_ports, workload, RecordingClient};

const ATTEMPT_TIMEOUT: Duration = Duration::from_millis(200);

async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn target_for(workload: &Workload) -> (Arc<TargetSet>, Arc<Target>) {
    let targets = Arc::new(TargetSet::new());
    assert!(targets.upsert(workload));
    let target = targets.get(&workload.address).unwrap();
    (targets, target)
}

#[tokio::test]
async fn test_healthy_no_gate_records_without_patch() {
    let (_listener, port) = listener().await;
    let web = with_ports(workload("default", "web-0", "127.0.0.1"), &[port]);

    let client = RecordingClient::new();
    client.insert(web.clone());
    let (_targets, target) = target_for(&web);
    let checker = HealthChecker::new(client.clone(), 0, ATTEMPT_TIMEOUT);

    let outcome = checker.check(&target).await.unwrap();
    assert_eq!(outcome, CheckOutcome::Recorded(Verdict::Healthy));
    assert_eq!(target.last_verdict(), Verdict::Healthy);
    assert_eq!(client.patch_count(), 0);

    // Same verdict again: suppressed before any API traffic.
    let outcome = checker.check(&target).await.unwrap();
    assert_eq!(outcome, CheckOutcome::Unchanged(Verdict::Healthy));
    assert_eq!(client.patch_count(), 0);
}

#[tokio::test]
async fn test_unreachable_port_patches_ready_false_once() {
    let (listener, port) = listener().await;
    let web = with_ports(workload("default", "web-0", "127.0.0.1"), &[port]);

    let client = RecordingClient::new();
    client.insert(web.clone());
    let (_targets, target) = target_for(&web);
    let checker = HealthChecker::new(client.clone(), 0, ATTEMPT_TIMEOUT);

    assert_eq!(
        checker.check(&target).await.unwrap(),
        CheckOutcome::Recorded(Verdict::Healthy)
    );

    drop(listener);
    let outcome = checker.check(&target).await.unwrap();
    assert_eq!(outcome, CheckOutcome::Patched(Verdict::Unhealthy));
    assert_eq!(client.patch_count(), 1);

    let patch = &client.patches()[0];
    let ready = patch
        .conditions
        .iter()
        .find(|c| c.condition_type == READY_CONDITION_TYPE)
        .unwrap();
    assert_eq!(ready.status, ConditionStatus::False);

    // Still unhealthy: exactly one patch per transition.
    assert_eq!(
        checker.check(&target).await.unwrap(),
        CheckOutcome::Unchanged(Verdict::Unhealthy)
    );
    assert_eq!(client.patch_count(), 1);
}

#[tokio::test]
async fn test_gate_flips_with_reachability() {
    let (listener, port) = listener().await;
    let web = with_gate(with_ports(workload("default", "web-0", "127.0.0.1"), &[port]));

    let client = RecordingClient::new();
    client.insert(web.clone());
    let (_targets, target) = target_for(&web);
    let checker = HealthChecker::new(client.clone(), 0, ATTEMPT_TIMEOUT);

    // Healthy with a declared gate: the gate condition is written True.
    assert_eq!(
        checker.check(&target).await.unwrap(),
        CheckOutcome::Patched(Verdict::Healthy)
    );
    let patches = client.patches();
    let gate = patches[0]
        .conditions
        .iter()
        .find(|c| c.condition_type == HEALTH_CONDITION_TYPE)
        .unwrap();
    assert_eq!(gate.status, ConditionStatus::True);
    let ready = patches[0]
        .conditions
        .iter()
        .find(|c| c.condition_type == READY_CONDITION_TYPE)
        .unwrap();
    assert_eq!(ready.status, ConditionStatus::True);

    // Unreachable: the gate flips False and ready is forced False.
    drop(listener);
    assert_eq!(
        checker.check(&target).await.unwrap(),
        CheckOutcome::Patched(Verdict::Unhealthy)
    );
    let patches = client.patches();
    assert_eq!(patches.len(), 2);
    for condition_type in [HEALTH_CONDITION_TYPE, READY_CONDITION_TYPE] {
        let condition = patches[1]
            .conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
            .unwrap();
        assert_eq!(condition.status, ConditionStatus::False);
    }
}

#[tokio::test]
async fn test_any_failing_port_fails_the_target() {
    let (_live, live_port) = listener().await;
    let (closed, closed_port) = listener().await;
    drop(closed);
    let web = with_ports(
        workload("default", "web-0", "127.0.0.1"),
        &[live_port, closed_port],
    );

    let client = RecordingClient::new();
    client.insert(web.clone());
    let (_targets, target) = target_for(&web);
    let checker = HealthChecker::new(client.clone(), 0, ATTEMPT_TIMEOUT);

    assert_eq!(
        checker.check(&target).await.unwrap(),
        CheckOutcome::Patched(Verdict::Unhealthy)
    );
}

#[tokio::test]
async fn test_vanished_workload_surfaces_not_found() {
    let (_listener, port) = listener().await;
    let web = with_gate(with_ports(workload("default", "web-0", "127.0.0.1"), &[port]));

    let client = RecordingClient::new();
    client.insert(web.clone());
    let (_targets, target) = target_for(&web);
    // The object is deleted between the watch event and this check.
    client.remove("default", "web-0");
    let checker = HealthChecker::new(client.clone(), 0, ATTEMPT_TIMEOUT);

    let err = checker.check(&target).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(target.last_verdict(), Verdict::Unknown);
    assert_eq!(client.patch_count(), 0);
}

#[tokio::test]
async fn test_failed_patch_leaves_verdict_for_retry() {
    let (_listener, port) = listener().await;
    let web = with_gate(with_ports(workload("default", "web-0", "127.0.0.1"), &[port]));

    let client = RecordingClient::new();
    client.insert(web.clone());
    let (_targets, target) = target_for(&web);
    let checker = HealthChecker::new(client.clone(), 0, ATTEMPT_TIMEOUT);

    client.set_fail_patches(true);
    assert!(checker.check(&target).await.is_err());
    // Verdict not recorded: the next tick retries the write.
    assert_eq!(target.last_verdict(), Verdict::Unknown);

    client.set_fail_patches(false);
    assert_eq!(
        checker.check(&target).await.unwrap(),
        CheckOutcome::Patched(Verdict::Healthy)
    );
    assert_eq!(target.last_verdict(), Verdict::Healthy);
}

#[tokio::test]
async fn test_non_ip_address_is_an_error() {
    let web = with_ports(workload("default", "web-0", "not-an-ip"), &[80]);
    let client = RecordingClient::new();
    client.insert(web.clone());
    let (_targets, target) = target_for(&web);
    let checker = HealthChecker::new(client.clone(), 0, ATTEMPT_TIMEOUT);

    assert!(checker.check(&target).await.is_err());
    assert_eq!(client.patch_count(), 0);
}
