//! Workload object model shared by the watch stream, the target set and the
//! status writer.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Annotation opting a workload into active probing when set to `"true"`.
pub const ENABLED_ANNOTATION: &str = "endpoint-health-checker.io/enabled";

/// Condition type written by this controller; also recognised as a legacy
/// readiness-gate opt-in when declared on the workload.
pub const HEALTH_CONDITION_TYPE: &str = "endpointHealthCheckSuccess";

/// The cluster's standard ready condition type.
pub const READY_CONDITION_TYPE: &str = "Ready";

/// Coarse workload lifecycle phase as reported by the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WorkloadPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    #[default]
    Unknown,
}

/// Condition status; the wire format uses capitalised strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// One entry of a workload's status conditions array.
///
/// Serializes with the cluster's field names so the vector can be shipped
/// verbatim inside a `{"status":{"conditions":[...]}}` merge patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: ConditionStatus,
    #[serde(rename = "lastProbeTime", skip_serializing_if = "Option::is_none")]
    pub last_probe_time: Option<DateTime<Utc>>,
    #[serde(rename = "lastTransitionTime", skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    pub fn new(condition_type: impl Into<String>, status: ConditionStatus) -> Self {
        Self {
            condition_type: condition_type.into(),
            status,
            last_probe_time: None,
            last_transition_time: None,
        }
    }

    /// Set the condition's outcome and stamp both timestamps.
    ///
    /// The transition timestamp is overwritten on every write, not only on
    /// true transitions; consumers see it move with each patch.
    pub fn stamp(&mut self, status: ConditionStatus, now: DateTime<Utc>) {
        self.status = status;
        self.last_probe_time = Some(now);
        self.last_transition_time = Some(now);
    }
}

/// A readiness-gate declaration on the workload spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessGate {
    #[serde(rename = "conditionType")]
    pub condition_type: String,
}

/// Kind of probe a container declares; only the port matters here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeHandler {
    Tcp { port: u16 },
    Http { port: u16 },
    Grpc { port: u16 },
}

impl ProbeHandler {
    pub fn port(&self) -> u16 {
        match self {
            Self::Tcp { port } | Self::Http { port } | Self::Grpc { port } => *port,
        }
    }
}

/// Container slice of the workload spec carrying probe declarations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liveness_probe: Option<ProbeHandler>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readiness_probe: Option<ProbeHandler>,
}

/// The slice of a cluster workload object this controller consumes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(default)]
    pub phase: WorkloadPhase,
    /// Network address at which the workload is reachable; empty until the
    /// cluster has assigned one.
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub readiness_gates: Vec<ReadinessGate>,
    #[serde(default)]
    pub containers: Vec<Container>,
}

impl Workload {
    pub fn is_running(&self) -> bool {
        self.phase == WorkloadPhase::Running
    }

    /// Whether the cluster's own ready condition is present and affirmative.
    pub fn is_ready(&self) -> bool {
        self.conditions
            .iter()
            .any(|c| c.condition_type == READY_CONDITION_TYPE && c.status == ConditionStatus::True)
    }

    /// Whether the workload opted into probing, either via the annotation or
    /// the legacy readiness-gate declaration.
    pub fn opted_in(&self) -> bool {
        if self
            .annotations
            .get(ENABLED_ANNOTATION)
            .is_some_and(|v| v == "true")
        {
            return true;
        }
        self.has_health_gate()
    }

    /// Whether the workload declares the health readiness gate.
    pub fn has_health_gate(&self) -> bool {
        self.readiness_gates
            .iter()
            .any(|g| g.condition_type == HEALTH_CONDITION_TYPE)
    }

    /// The conjunction of predicates a workload must satisfy to be probed.
    pub fn eligible(&self) -> bool {
        self.is_running() && !self.address.is_empty() && self.is_ready() && self.opted_in()
    }

    /// TCP ports derived from the containers' probe declarations,
    /// deduplicated across liveness/readiness and probe kinds, in
    /// first-seen order. Empty means the endpoint is probed via ICMP.
    pub fn probe_ports(&self) -> Vec<u16> {
        let mut ports = Vec::new();
        for container in &self.containers {
            for handler in [&container.liveness_probe, &container.readiness_probe]
                .into_iter()
                .flatten()
            {
                let port = handler.port();
                if !ports.contains(&port) {
                    ports.push(port);
                }
            }
        }
        ports
    }
}
