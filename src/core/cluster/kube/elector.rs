/*!
Lease-backed leader election over `coordination.k8s.io/v1`.

One Lease object is the lock: the holder refreshes `renewTime` every retry
period and other candidates take over once `renewTime + leaseDuration` has
passed. Write conflicts mean another candidate won the race and are never
errors. A holder that cannot renew within the renew deadline demotes
itself; the stale record it leaves behind simply ages out.
*/

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::channel::mpsc;
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::{Api, ObjectMeta, PostParams};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::cluster::election::{ElectionConfig, LeaderEvent, LeaseElector};

pub struct KubeLeaseElector {
    api: Api<Lease>,
    lease_name: String,
    config: ElectionConfig,
}

enum Attempt {
    Acquired,
    /// Someone else holds a live lease.
    Held(String),
    /// Lost a write race; try again next period.
    Conflict,
}

enum Renewal {
    Renewed,
    /// The lease now names another holder.
    LostTo(String),
}

impl KubeLeaseElector {
    pub fn new(
        client: kube::Client,
        namespace: &str,
        lease_name: &str,
        config: ElectionConfig,
    ) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            lease_name: lease_name.to_string(),
            config,
        }
    }

    fn fresh_spec(&self, transitions: i32) -> LeaseSpec {
        let now = MicroTime(Utc::now());
        LeaseSpec {
            holder_identity: Some(self.config.identity.clone()),
            lease_duration_seconds: Some(self.config.lease_duration.as_secs() as i32),
            acquire_time: Some(now.clone()),
            renew_time: Some(now),
            lease_transitions: Some(transitions),
        }
    }

    /// One acquisition attempt: create the Lease if absent, take it over if
    /// expired or already ours, otherwise report the live holder.
    async fn try_acquire(&self) -> Result<Attempt, kube::Error> {
        let existing = match self.api.get_opt(&self.lease_name).await? {
            Some(lease) => lease,
            None => {
                let lease = Lease {
                    metadata: ObjectMeta {
                        name: Some(self.lease_name.clone()),
                        ..ObjectMeta::default()
                    },
                    spec: Some(self.fresh_spec(0)),
                };
                return match self.api.create(&PostParams::default(), &lease).await {
                    Ok(_) => Ok(Attempt::Acquired),
                    Err(kube::Error::Api(response)) if response.code == 409 => {
                        Ok(Attempt::Conflict)
                    }
                    Err(err) => Err(err),
                };
            }
        };

        let spec = existing.spec.clone().unwrap_or_default();
        let holder = spec.holder_identity.clone().unwrap_or_default();
        if !holder.is_empty() && holder != self.config.identity && !lease_expired(&spec) {
            return Ok(Attempt::Held(holder));
        }

        let transitions = spec.lease_transitions.unwrap_or(0)
            + i32::from(!holder.is_empty() && holder != self.config.identity);
        let mut replacement = existing;
        replacement.spec = Some(self.fresh_spec(transitions));
        match self
            .api
            .replace(&self.lease_name, &PostParams::default(), &replacement)
            .await
        {
            Ok(_) => Ok(Attempt::Acquired),
            Err(kube::Error::Api(response)) if response.code == 409 => Ok(Attempt::Conflict),
            Err(err) => Err(err),
        }
    }

    /// Refresh `renewTime` on a lease we believe we hold.
    async fn renew(&self) -> Result<Renewal, kube::Error> {
        let Some(mut lease) = self.api.get_opt(&self.lease_name).await? else {
            return Ok(Renewal::LostTo(String::new()));
        };
        let mut spec = lease.spec.clone().unwrap_or_default();
        let holder = spec.holder_identity.clone().unwrap_or_default();
        if holder != self.config.identity {
            return Ok(Renewal::LostTo(holder));
        }

        spec.renew_time = Some(MicroTime(Utc::now()));
        lease.spec = Some(spec);
        match self
            .api
            .replace(&self.lease_name, &PostParams::default(), &lease)
            .await
        {
            Ok(_) => Ok(Renewal::Renewed),
            Err(kube::Error::Api(response)) if response.code == 409 => {
                Ok(Renewal::LostTo(String::new()))
            }
            Err(err) => Err(err),
        }
    }

    /// Best-effort release so the next candidate need not wait out the
    /// lease duration.
    async fn release(&self) {
        let lease = match self.api.get_opt(&self.lease_name).await {
            Ok(Some(lease)) => lease,
            _ => return,
        };
        let mut spec = lease.spec.clone().unwrap_or_default();
        if spec.holder_identity.as_deref() != Some(self.config.identity.as_str()) {
            return;
        }
        spec.holder_identity = Some(String::new());
        let mut released = lease;
        released.spec = Some(spec);
        if let Err(err) = self
            .api
            .replace(&self.lease_name, &PostParams::default(), &released)
            .await
        {
            debug!(%err, "best-effort lease release failed");
        }
    }

    async fn election_loop(self: Arc<Self>, stop: CancellationToken, tx: mpsc::UnboundedSender<LeaderEvent>) {
        let mut observed_holder = String::new();
        'candidate: loop {
            // Acquisition phase.
            loop {
                if stop.is_cancelled() {
                    return;
                }
                match self.try_acquire().await {
                    Ok(Attempt::Acquired) => break,
                    Ok(Attempt::Held(holder)) => {
                        if holder != observed_holder {
                            observed_holder = holder.clone();
                            let _ = tx.unbounded_send(LeaderEvent::NewLeader(holder));
                        }
                    }
                    Ok(Attempt::Conflict) => {}
                    Err(err) => warn!(%err, "lease acquisition attempt failed"),
                }
                tokio::select! {
                    _ = stop.cancelled() => return,
                    _ = tokio::time::sleep(self.config.retry_period) => {}
                }
            }

            observed_holder = self.config.identity.clone();
            if tx.unbounded_send(LeaderEvent::Acquired).is_err() {
                return;
            }
            info!(lease = %self.lease_name, "lease acquired");

            // Renewal phase.
            let mut last_renewed = Instant::now();
            loop {
                tokio::select! {
                    _ = stop.cancelled() => {
                        self.release().await;
                        return;
                    }
                    _ = tokio::time::sleep(self.config.retry_period) => {}
                }
                match self.renew().await {
                    Ok(Renewal::Renewed) => last_renewed = Instant::now(),
                    Ok(Renewal::LostTo(holder)) => {
                        warn!(new_holder = %holder, "lease taken over");
                        let _ = tx.unbounded_send(LeaderEvent::Released);
                        if !holder.is_empty() {
                            observed_holder = holder.clone();
                            let _ = tx.unbounded_send(LeaderEvent::NewLeader(holder));
                        }
                        continue 'candidate;
                    }
                    Err(err) => {
                        warn!(%err, "lease renewal failed");
                        if last_renewed.elapsed() >= self.config.renew_deadline {
                            warn!("renew deadline exceeded, relinquishing leadership");
                            let _ = tx.unbounded_send(LeaderEvent::Released);
                            continue 'candidate;
                        }
                    }
                }
            }
        }
    }
}

impl LeaseElector for KubeLeaseElector {
    fn run(&self, stop: CancellationToken) -> BoxStream<'static, LeaderEvent> {
        let (tx, rx) = mpsc::unbounded();
        let elector = Arc::new(Self {
            api: self.api.clone(),
            lease_name: self.lease_name.clone(),
            config: self.config.clone(),
        });
        tokio::spawn(elector.election_loop(stop, tx));
        rx.boxed()
    }
}

/// A lease with no renew time is treated as expired.
fn lease_expired(spec: &LeaseSpec) -> bool {
    let Some(renew_time) = &spec.renew_time else {
        return true;
    };
    let duration = spec
        .lease_duration_seconds
        .map(|secs| Duration::from_secs(secs.max(0) as u64))
        .unwrap_or(Duration::ZERO);
    let age = Utc::now().signed_duration_since(renew_time.0);
    age.to_std().map(|age| age >= duration).unwrap_or(false)
}
