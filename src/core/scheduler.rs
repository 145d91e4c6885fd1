/*!
Probe scheduler: a single ticker fanning work out to the fixed pool.

Each tick snapshots the targets with no probe in flight, flags them and
submits one checker task per target. Submission never blocks and ticks are
never skipped for backlog; the in-flight flag alone keeps a slow target
from being dispatched twice. A tick that finds every entry flagged simply
dispatches nothing, so there are no catch-up bursts.
*/

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::core::checker::{CheckOutcome, HealthChecker};
use crate::core::pool::WorkerPool;
use crate::core::targets::{Target, TargetSet};

/// Hard ceiling on a single task, independent of the probe envelope. Not a
/// budget — a last-resort bound on a wedged check.
const TASK_DEADLINE: Duration = Duration::from_secs(10);

pub struct Scheduler {
    targets: Arc<TargetSet>,
    checker: Arc<HealthChecker>,
    interval: Duration,
    workers: usize,
}

impl Scheduler {
    pub fn new(
        targets: Arc<TargetSet>,
        checker: Arc<HealthChecker>,
        interval: Duration,
        workers: usize,
    ) -> Self {
        Self {
            targets,
            checker,
            interval,
            workers,
        }
    }

    /// Tick until `stop` fires, then drain the pool and return.
    pub async fn run(&self, stop: CancellationToken) {
        let pool = WorkerPool::new(self.workers);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval = ?self.interval, workers = self.workers, "scheduler started");
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => self.dispatch(&pool, &stop),
            }
        }

        debug!("scheduler stopping, draining worker pool");
        pool.shutdown().await;
    }

    fn dispatch(&self, pool: &WorkerPool, stop: &CancellationToken) {
        let snapshot = self.targets.available_snapshot();
        let stats = self.targets.stats();
        trace!(
            total = stats.total,
            available = snapshot.len(),
            backlog = pool.backlog(),
            "tick"
        );

        for target in snapshot {
            if !self.targets.mark_in_flight(&target.address, true) {
                // Entry vanished since the snapshot.
                continue;
            }
            let checker = Arc::clone(&self.checker);
            let stop = stop.clone();
            pool.submit(run_task(checker, target, stop));
        }
    }
}

async fn run_task(checker: Arc<HealthChecker>, target: Arc<Target>, stop: CancellationToken) {
    if stop.is_cancelled() {
        target.set_in_flight(false);
        return;
    }

    match tokio::time::timeout(TASK_DEADLINE, checker.check(&target)).await {
        Ok(Ok(outcome)) => match outcome {
            CheckOutcome::Unchanged(verdict) => {
                trace!(address = %target.address, ?verdict, "verdict unchanged");
            }
            CheckOutcome::Recorded(verdict) => {
                debug!(address = %target.address, ?verdict, "verdict recorded, no gate to patch");
            }
            CheckOutcome::Patched(verdict) => {
                info!(address = %target.address, ?verdict, "status conditions patched");
            }
        },
        Ok(Err(err)) if err.is_not_found() => {
            // The watcher will drop the entry shortly; nothing to correct.
            info!(address = %target.address, %err, "workload gone before status write");
        }
        Ok(Err(err)) => {
            // Verdict was not recorded; the next tick retries at the probe
            // interval.
            warn!(address = %target.address, %err, "health check failed");
        }
        Err(_) => {
            warn!(address = %target.address, deadline = ?TASK_DEADLINE, "health check exceeded deadline");
        }
    }

    target.set_in_flight(false);
}
