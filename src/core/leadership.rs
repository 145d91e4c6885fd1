/*!
Leadership gate: runs the watcher and scheduler only while this replica
holds the cluster-wide lease.

Demotion tears the probe machinery down without exiting the process, since
re-acquisition is possible. A demoted holder that has not yet observed its
demotion may write a few late status patches; those are ordinary writes the
next leader's verdicts overwrite.
*/

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::cluster::election::{LeaderEvent, LeaseElector};
use crate::core::cluster::stream::StreamError;
use crate::core::scheduler::Scheduler;
use crate::core::watcher::Watcher;

/// How one leadership term ended, fatal watcher failure aside.
enum TermEnd {
    /// The elector reported demotion.
    Released,
    /// The root stop signal fired or the elector stream ended.
    Shutdown,
    /// The watch stream ended while we were still leading.
    WatcherStopped,
}

pub struct LeadershipGate {
    elector: Arc<dyn LeaseElector>,
    watcher: Arc<Watcher>,
    scheduler: Arc<Scheduler>,
}

impl LeadershipGate {
    pub fn new(
        elector: Arc<dyn LeaseElector>,
        watcher: Arc<Watcher>,
        scheduler: Arc<Scheduler>,
    ) -> Self {
        Self {
            elector,
            watcher,
            scheduler,
        }
    }

    /// Participate in elections until `stop` fires. Returns an error only
    /// for the fatal case: a watcher that could not sync its cache while we
    /// were leading.
    pub async fn run(&self, stop: CancellationToken) -> Result<(), StreamError> {
        let mut events = self.elector.run(stop.clone());

        loop {
            tokio::select! {
                _ = stop.cancelled() => return Ok(()),
                event = events.next() => match event {
                    Some(LeaderEvent::Acquired) => {
                        info!("leadership acquired, starting watcher and scheduler");
                        match self.lead(&mut events, &stop).await? {
                            TermEnd::Shutdown => return Ok(()),
                            TermEnd::Released | TermEnd::WatcherStopped => {}
                        }
                    }
                    Some(LeaderEvent::NewLeader(identity)) => {
                        info!(leader = %identity, "observed new leader");
                    }
                    // Not leading; nothing to tear down.
                    Some(LeaderEvent::Released) => {}
                    None => return Ok(()),
                },
            }
        }
    }

    /// One leadership term: watcher and scheduler run under a child token
    /// until demotion, shutdown or watcher failure.
    async fn lead(
        &self,
        events: &mut BoxStream<'static, LeaderEvent>,
        stop: &CancellationToken,
    ) -> Result<TermEnd, StreamError> {
        let term = stop.child_token();

        let mut watcher_task = tokio::spawn({
            let watcher = Arc::clone(&self.watcher);
            let term = term.clone();
            async move { watcher.run(term).await }
        });
        let scheduler_task = tokio::spawn({
            let scheduler = Arc::clone(&self.scheduler);
            let term = term.clone();
            async move { scheduler.run(term).await }
        });

        let mut watcher_joined = false;
        let end: Result<TermEnd, StreamError> = loop {
            tokio::select! {
                _ = stop.cancelled() => break Ok(TermEnd::Shutdown),
                joined = &mut watcher_task => {
                    watcher_joined = true;
                    break match joined {
                        Ok(Ok(())) => {
                            warn!("watch stream ended while leading");
                            Ok(TermEnd::WatcherStopped)
                        }
                        Ok(Err(err)) => Err(err),
                        Err(join_err) => Err(StreamError::SyncFailed(format!(
                            "watcher task panicked: {join_err}"
                        ))),
                    };
                }
                event = events.next() => match event {
                    Some(LeaderEvent::Released) => {
                        warn!("leadership lost, stopping watcher and scheduler");
                        break Ok(TermEnd::Released);
                    }
                    Some(LeaderEvent::NewLeader(identity)) => {
                        info!(leader = %identity, "observed new leader");
                    }
                    Some(LeaderEvent::Acquired) => {}
                    None => break Ok(TermEnd::Shutdown),
                },
            }
        };

        term.cancel();
        if !watcher_joined {
            let _ = watcher_task.await;
        }
        let _ = scheduler_task.await;

        end
    }
}
