/*!
Object watcher: derives target set membership from the cluster object
stream.

Add and update events both re-run the eligibility predicates through
`upsert`, so resync replays are naturally idempotent and an update that
merely disables opt-in does not remove an existing entry. Membership only
shrinks on delete events.
*/

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::cluster::stream::{Deleted, StreamError, WatchEvent, WorkloadStream};
use crate::core::targets::TargetSet;

pub struct Watcher {
    targets: Arc<TargetSet>,
    stream: Arc<dyn WorkloadStream>,
}

impl Watcher {
    pub fn new(targets: Arc<TargetSet>, stream: Arc<dyn WorkloadStream>) -> Self {
        Self { targets, stream }
    }

    /// Start the stream, blocking until the initial list is cached, then
    /// apply events until `stop` fires or the stream ends. A failed initial
    /// sync is fatal: the working set cannot be trusted without it.
    pub async fn run(&self, stop: CancellationToken) -> Result<(), StreamError> {
        let mut events = self.stream.watch(stop.clone()).await?;
        info!("object cache synced, consuming watch events");

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                event = events.next() => match event {
                    Some(event) => self.apply(event),
                    None => break,
                },
            }
        }
        Ok(())
    }

    fn apply(&self, event: WatchEvent) {
        match event {
            WatchEvent::Added(workload) | WatchEvent::Updated(workload) => {
                self.targets.upsert(&workload);
            }
            WatchEvent::Deleted(deleted) => {
                if matches!(deleted, Deleted::Tombstone(_)) {
                    debug!("unwrapping tombstone delete event");
                }
                let workload = deleted.into_inner();
                if workload.address.is_empty() {
                    // Fall back to an identity scan when the delete event
                    // carries no address.
                    self.targets
                        .delete_by_identity(&workload.namespace, &workload.name);
                } else {
                    self.targets.delete(&workload);
                }
            }
        }
    }
}
