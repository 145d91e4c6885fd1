//! Cluster object watch stream abstraction.

use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::core::cluster::types::Workload;

/// Payload of a delete event.
///
/// When the underlying stream misses the actual deletion it synthesizes a
/// tombstone wrapping the last-known object.
#[derive(Debug, Clone, PartialEq)]
pub enum Deleted {
    Object(Workload),
    Tombstone(Workload),
}

impl Deleted {
    /// The last-known object, with any tombstone wrapper removed.
    pub fn into_inner(self) -> Workload {
        match self {
            Self::Object(workload) | Self::Tombstone(workload) => workload,
        }
    }
}

/// One event from the shared object cache.
///
/// Resyncs are delivered as a replay of `Added` events for every object the
/// cache currently holds.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    Added(Workload),
    Updated(Workload),
    Deleted(Deleted),
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The initial list could not be loaded; the core cannot start without
    /// a synced cache.
    #[error("initial cache sync failed: {0}")]
    SyncFailed(String),
}

/// A shared, cached object stream.
///
/// `watch` resolves only after the initial list has been loaded, with that
/// list replayed as the first `Added` events of the returned stream. The
/// implementation owns reconnection; interruptions surface to the consumer
/// as nothing more than a resync replay.
#[async_trait::async_trait]
pub trait WorkloadStream: Send + Sync {
    async fn watch(
        &self,
        stop: CancellationToken,
    ) -> Result<BoxStream<'static, WatchEvent>, StreamError>;
}
