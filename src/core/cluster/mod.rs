//! External collaborator interfaces: the object stream, the object client
//! and the leadership lease, plus the workload model they exchange.

pub mod client;
pub mod election;
pub mod stream;
pub mod types;

#[cfg(feature = "kubernetes")]
pub mod kube;

pub use client::{ClientError, WorkloadClient};
pub use election::{ElectionConfig, LeaderEvent, LeaseElector};
pub use stream::{Deleted, StreamError, WatchEvent, WorkloadStream};
pub use types::{
    Condition, ConditionStatus, Container, ProbeHandler, ReadinessGate, Workload, WorkloadPhase,
    ENABLED_ANNOTATION, HEALTH_CONDITION_TYPE, READY_CONDITION_TYPE,
};
