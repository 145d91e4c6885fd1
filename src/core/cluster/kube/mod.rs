/*!
Kubernetes-backed collaborators: a pod watch stream, a pod status client
and a Lease elector.

The rest of the crate only sees the `cluster` traits; everything
API-machinery-specific stays behind this module and the `kubernetes`
feature.
*/

pub mod elector;

use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Pod, Probe};
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::{watcher, WatchStreamExt};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::core::cluster::client::{ClientError, WorkloadClient};
use crate::core::cluster::stream::{Deleted, StreamError, WatchEvent, WorkloadStream};
use crate::core::cluster::types::{
    Condition, ConditionStatus, Container, ProbeHandler, ReadinessGate, Workload, WorkloadPhase,
};

pub use elector::KubeLeaseElector;

/// Namespace-scoped pod access backed by the cluster API.
pub struct PodClient {
    client: kube::Client,
}

impl PodClient {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait::async_trait]
impl WorkloadClient for PodClient {
    async fn get(&self, namespace: &str, name: &str) -> Result<Workload, ClientError> {
        match self.pods(namespace).get(name).await {
            Ok(pod) => Ok(workload_from_pod(pod)),
            Err(kube::Error::Api(response)) if response.code == 404 => {
                Err(ClientError::NotFound {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                })
            }
            Err(err) => Err(ClientError::Api(err.to_string())),
        }
    }

    async fn patch_conditions(
        &self,
        namespace: &str,
        name: &str,
        conditions: &[Condition],
    ) -> Result<(), ClientError> {
        let patch = serde_json::json!({ "status": { "conditions": conditions } });
        match self
            .pods(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(response)) if response.code == 404 => {
                Err(ClientError::NotFound {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                })
            }
            Err(err) => Err(ClientError::Api(err.to_string())),
        }
    }
}

/// All-namespace pod watch mapped onto the generic event model.
pub struct PodStream {
    client: kube::Client,
}

impl PodStream {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl WorkloadStream for PodStream {
    async fn watch(
        &self,
        stop: CancellationToken,
    ) -> Result<BoxStream<'static, WatchEvent>, StreamError> {
        let api: Api<Pod> = Api::all(self.client.clone());
        let mut events = watcher(api, watcher::Config::default())
            .default_backoff()
            .boxed();

        // The watcher fronts its initial list with a restart event; nothing
        // is trustworthy before it lands.
        let initial = match events.next().await {
            Some(Ok(watcher::Event::Restarted(pods))) => pods,
            Some(Ok(other)) => {
                return Err(StreamError::SyncFailed(format!(
                    "unexpected event before initial list: {other:?}"
                )))
            }
            Some(Err(err)) => return Err(StreamError::SyncFailed(err.to_string())),
            None => {
                return Err(StreamError::SyncFailed(
                    "watch stream ended before initial list".to_string(),
                ))
            }
        };

        let head = futures::stream::iter(
            initial
                .into_iter()
                .map(|pod| WatchEvent::Added(workload_from_pod(pod))),
        );
        let rest = events.flat_map(|item| {
            let mapped: Vec<WatchEvent> = match item {
                Ok(watcher::Event::Applied(pod)) => {
                    vec![WatchEvent::Updated(workload_from_pod(pod))]
                }
                Ok(watcher::Event::Deleted(pod)) => {
                    vec![WatchEvent::Deleted(Deleted::Object(workload_from_pod(pod)))]
                }
                // Relist after an interruption: replay adds for the full
                // current set, upsert makes the replay idempotent.
                Ok(watcher::Event::Restarted(pods)) => pods
                    .into_iter()
                    .map(|pod| WatchEvent::Added(workload_from_pod(pod)))
                    .collect(),
                Err(err) => {
                    warn!(%err, "watch interrupted, backing off until relist");
                    Vec::new()
                }
            };
            futures::stream::iter(mapped)
        });

        Ok(head
            .chain(rest)
            .take_until(stop.cancelled_owned())
            .boxed())
    }
}

fn phase_from_pod(phase: Option<&str>) -> WorkloadPhase {
    match phase {
        Some("Pending") => WorkloadPhase::Pending,
        Some("Running") => WorkloadPhase::Running,
        Some("Succeeded") => WorkloadPhase::Succeeded,
        Some("Failed") => WorkloadPhase::Failed,
        _ => WorkloadPhase::Unknown,
    }
}

fn condition_status(status: &str) -> ConditionStatus {
    match status {
        "True" => ConditionStatus::True,
        "False" => ConditionStatus::False,
        _ => ConditionStatus::Unknown,
    }
}

/// Only numeric probe ports are carried; a named port would need a lookup
/// through the container's port list and is skipped instead.
fn probe_handler(probe: &Probe) -> Option<ProbeHandler> {
    if let Some(tcp) = &probe.tcp_socket {
        if let k8s_openapi::apimachinery::pkg::util::intstr::IntOrString::Int(port) = &tcp.port {
            return u16::try_from(*port).ok().map(|port| ProbeHandler::Tcp { port });
        }
    }
    if let Some(http) = &probe.http_get {
        if let k8s_openapi::apimachinery::pkg::util::intstr::IntOrString::Int(port) = &http.port {
            return u16::try_from(*port).ok().map(|port| ProbeHandler::Http { port });
        }
    }
    if let Some(grpc) = &probe.grpc {
        return u16::try_from(grpc.port).ok().map(|port| ProbeHandler::Grpc { port });
    }
    None
}

/// Project a pod down to the slice of state the controller consumes.
pub fn workload_from_pod(pod: Pod) -> Workload {
    let status = pod.status.unwrap_or_default();
    let spec = pod.spec.unwrap_or_default();

    let conditions = status
        .conditions
        .unwrap_or_default()
        .into_iter()
        .map(|c| Condition {
            condition_type: c.type_,
            status: condition_status(&c.status),
            last_probe_time: c.last_probe_time.map(|t| t.0),
            last_transition_time: c.last_transition_time.map(|t| t.0),
        })
        .collect();

    let readiness_gates = spec
        .readiness_gates
        .unwrap_or_default()
        .into_iter()
        .map(|g| ReadinessGate {
            condition_type: g.condition_type,
        })
        .collect();

    let containers = spec
        .containers
        .into_iter()
        .map(|c| Container {
            name: c.name,
            liveness_probe: c.liveness_probe.as_ref().and_then(probe_handler),
            readiness_probe: c.readiness_probe.as_ref().and_then(probe_handler),
        })
        .collect();

    Workload {
        namespace: pod.metadata.namespace.unwrap_or_default(),
        name: pod.metadata.name.unwrap_or_default(),
        annotations: pod.metadata.annotations.unwrap_or_default().into_iter().collect(),
        phase: phase_from_pod(status.phase.as_deref()),
        address: status.pod_ip.unwrap_or_default(),
        conditions,
        readiness_gates,
        containers,
    }
}
