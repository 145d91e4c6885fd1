/*!
Health checker: probes one target, computes a verdict and writes it back.

Status patches are rate-limited upstream, so the checker never touches the
API when the verdict matches the last one it wrote; every transition costs
exactly one get and at most one patch.
*/

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::core::cluster::client::{ClientError, WorkloadClient};
use crate::core::cluster::types::{
    Condition, ConditionStatus, Workload, HEALTH_CONDITION_TYPE, READY_CONDITION_TYPE,
};
use crate::core::probe::{icmp, tcp, ProbeError};
use crate::core::targets::{Target, Verdict};

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("target address {address:?} is not an IP address: {source}")]
    Address {
        address: String,
        source: std::net::AddrParseError,
    },
    /// Probe setup failure (unreachability is a verdict, not an error).
    #[error(transparent)]
    Probe(ProbeError),
    #[error(transparent)]
    Client(#[from] ClientError),
}

impl CheckError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Client(err) if err.is_not_found())
    }
}

/// How a check concluded, for task-level logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Verdict matched the last written one; no API traffic.
    Unchanged(Verdict),
    /// Verdict recorded without a patch: the endpoint is healthy and the
    /// workload declares no readiness gate, so the cluster's own readiness
    /// logic owns the ready condition.
    Recorded(Verdict),
    /// Verdict written back via a status patch.
    Patched(Verdict),
}

pub struct HealthChecker {
    client: Arc<dyn WorkloadClient>,
    retries: u32,
    attempt_timeout: Duration,
}

impl HealthChecker {
    pub fn new(client: Arc<dyn WorkloadClient>, retries: u32, attempt_timeout: Duration) -> Self {
        Self {
            client,
            retries,
            attempt_timeout,
        }
    }

    /// Probe the target and, if the verdict changed, patch the workload's
    /// status conditions. A vanished workload surfaces as a not-found error;
    /// the watcher deletes the entry shortly after, so no corrective action
    /// is taken here.
    pub async fn check(&self, target: &Target) -> Result<CheckOutcome, CheckError> {
        let verdict = self.probe_target(target).await?;
        if verdict == target.last_verdict() {
            return Ok(CheckOutcome::Unchanged(verdict));
        }

        let workload = self.client.get(&target.namespace, &target.name).await?;
        let healthy = verdict == Verdict::Healthy;
        match patched_conditions(&workload, healthy, Utc::now()) {
            None => {
                target.record_verdict(verdict);
                Ok(CheckOutcome::Recorded(verdict))
            }
            Some(conditions) => {
                self.client
                    .patch_conditions(&target.namespace, &target.name, &conditions)
                    .await?;
                // Recorded only after the write lands; a failed patch leaves
                // the verdict untouched and the next tick retries.
                target.record_verdict(verdict);
                Ok(CheckOutcome::Patched(verdict))
            }
        }
    }

    /// TCP over every declared port (all must pass), ICMP when none are
    /// declared.
    async fn probe_target(&self, target: &Target) -> Result<Verdict, CheckError> {
        let ip: IpAddr = target.address.parse().map_err(|source| CheckError::Address {
            address: target.address.clone(),
            source,
        })?;

        if target.ports.is_empty() {
            match icmp::probe(ip, self.retries, self.attempt_timeout).await {
                Ok(()) => Ok(Verdict::Healthy),
                Err(err) if err.is_unreachable() => {
                    debug!(address = %target.address, %err, "icmp probe exhausted");
                    Ok(Verdict::Unhealthy)
                }
                Err(err) => Err(CheckError::Probe(err)),
            }
        } else {
            for &port in &target.ports {
                match tcp::probe(ip, port, self.retries, self.attempt_timeout).await {
                    Ok(()) => {}
                    Err(err) if err.is_unreachable() => {
                        debug!(address = %target.address, port, %err, "tcp probe exhausted");
                        return Ok(Verdict::Unhealthy);
                    }
                    Err(err) => return Err(CheckError::Probe(err)),
                }
            }
            Ok(Verdict::Healthy)
        }
    }
}

/// Compute the patched conditions array, or `None` when no write is needed.
///
/// A declared readiness gate is set to the verdict; an unhealthy verdict
/// additionally forces the standard ready condition to `False`. A healthy
/// workload without a gate is left alone.
fn patched_conditions(
    workload: &Workload,
    healthy: bool,
    now: DateTime<Utc>,
) -> Option<Vec<Condition>> {
    let has_gate = workload.has_health_gate();
    if healthy && !has_gate {
        return None;
    }

    let mut conditions = workload.conditions.clone();
    if has_gate {
        let status = if healthy {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        };
        set_condition(&mut conditions, HEALTH_CONDITION_TYPE, status, now);
    }
    if !healthy {
        set_condition(&mut conditions, READY_CONDITION_TYPE, ConditionStatus::False, now);
    }
    Some(conditions)
}

/// Locate a condition by type and mutate it in place, stamping both
/// timestamps; append it when absent.
fn set_condition(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    status: ConditionStatus,
    now: DateTime<Utc>,
) {
    match conditions
        .iter_mut()
        .find(|c| c.condition_type == condition_type)
    {
        Some(existing) => existing.stamp(status, now),
        None => {
            let mut condition = Condition::new(condition_type, status);
            condition.stamp(status, now);
            conditions.push(condition);
        }
    }
}
