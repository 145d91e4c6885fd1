/*!
In-memory working set of probe targets.

Membership is event-driven: only the watcher mutates it, keyed by endpoint
address with last-writer-wins on collisions. Snapshots hand out `Arc`
handles whose mutable fields (`in_flight`, `last_verdict`) are atomic, so a
worker can keep operating on a handle after the entry behind it was
replaced or removed, and no lock is ever held across I/O.
*/

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::core::cluster::types::Workload;

/// Tri-state reachability verdict as last written to the workload status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Unknown,
    Healthy,
    Unhealthy,
}

impl Verdict {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Healthy,
            2 => Self::Unhealthy,
            _ => Self::Unknown,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Healthy => 1,
            Self::Unhealthy => 2,
        }
    }
}

/// A workload endpoint selected for probing.
#[derive(Debug)]
pub struct Target {
    pub namespace: String,
    pub name: String,
    pub address: String,
    /// TCP ports to probe; empty means ICMP mode.
    pub ports: Vec<u16>,
    in_flight: AtomicBool,
    last_verdict: AtomicU8,
}

impl Target {
    fn from_workload(workload: &Workload) -> Self {
        Self {
            namespace: workload.namespace.clone(),
            name: workload.name.clone(),
            address: workload.address.clone(),
            ports: workload.probe_ports(),
            in_flight: AtomicBool::new(false),
            last_verdict: AtomicU8::new(Verdict::Unknown.as_u8()),
        }
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn set_in_flight(&self, in_flight: bool) {
        self.in_flight.store(in_flight, Ordering::Release);
    }

    pub fn last_verdict(&self) -> Verdict {
        Verdict::from_u8(self.last_verdict.load(Ordering::Acquire))
    }

    pub fn record_verdict(&self, verdict: Verdict) {
        self.last_verdict.store(verdict.as_u8(), Ordering::Release);
    }
}

/// Total and per-namespace tallies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetStats {
    pub total: usize,
    pub per_namespace: HashMap<String, usize>,
}

/// Thread-safe working set keyed by endpoint address.
#[derive(Debug, Default)]
pub struct TargetSet {
    inner: RwLock<HashMap<String, Arc<Target>>>,
}

impl TargetSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or overwrite the entry for the workload's address if it
    /// passes the eligibility predicates, resetting the in-flight flag and
    /// the recorded verdict. An ineligible workload is a no-op: removal is
    /// delete-driven only, so an edit that merely disables opt-in leaves an
    /// existing entry in place.
    ///
    /// Returns whether an entry was installed.
    pub fn upsert(&self, workload: &Workload) -> bool {
        if !workload.eligible() {
            return false;
        }
        let target = Arc::new(Target::from_workload(workload));
        debug!(
            namespace = %target.namespace,
            name = %target.name,
            address = %target.address,
            ports = ?target.ports,
            "installing probe target"
        );
        self.inner
            .write()
            .unwrap()
            .insert(target.address.clone(), target);
        true
    }

    /// Remove the entry at the workload's address. Returns whether an entry
    /// was removed.
    pub fn delete(&self, workload: &Workload) -> bool {
        let removed = self.inner.write().unwrap().remove(&workload.address);
        if let Some(target) = &removed {
            debug!(
                namespace = %target.namespace,
                name = %target.name,
                address = %target.address,
                "removing probe target"
            );
        }
        removed.is_some()
    }

    /// Linear scan removing the first entry matching the identity. Used for
    /// delete events that carry no address.
    pub fn delete_by_identity(&self, namespace: &str, name: &str) -> bool {
        let mut inner = self.inner.write().unwrap();
        let address = inner
            .values()
            .find(|t| t.namespace == namespace && t.name == name)
            .map(|t| t.address.clone());
        match address {
            Some(address) => {
                inner.remove(&address);
                debug!(namespace, name, %address, "removing probe target by identity");
                true
            }
            None => false,
        }
    }

    /// Flip the in-flight flag of the entry at `address`. Returns whether
    /// the entry existed.
    pub fn mark_in_flight(&self, address: &str, in_flight: bool) -> bool {
        match self.inner.read().unwrap().get(address) {
            Some(target) => {
                target.set_in_flight(in_flight);
                true
            }
            None => false,
        }
    }

    /// Stable handles to every entry not currently being probed.
    pub fn available_snapshot(&self) -> Vec<Arc<Target>> {
        self.inner
            .read()
            .unwrap()
            .values()
            .filter(|t| !t.in_flight())
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> TargetStats {
        let inner = self.inner.read().unwrap();
        let mut per_namespace: HashMap<String, usize> = HashMap::new();
        for target in inner.values() {
            *per_namespace.entry(target.namespace.clone()).or_default() += 1;
        }
        TargetStats {
            total: inner.len(),
            per_namespace,
        }
    }

    pub fn get(&self, address: &str) -> Option<Arc<Target>> {
        self.inner.read().unwrap().get(address).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().is_empty()
    }
}
