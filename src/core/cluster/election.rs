//! Leader-election lease abstraction.

use std::time::Duration;

use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

/// Lease parameters; validated at configuration time
/// (`renew_deadline < lease_duration`).
#[derive(Debug, Clone)]
pub struct ElectionConfig {
    pub lease_duration: Duration,
    pub renew_deadline: Duration,
    pub retry_period: Duration,
    pub identity: String,
}

/// Leadership transitions observed by this replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaderEvent {
    /// This replica acquired the lease.
    Acquired,
    /// This replica lost the lease; re-acquisition remains possible.
    Released,
    /// Another holder was observed.
    NewLeader(String),
}

/// Lease-backed mutual exclusion.
///
/// `run` drives the acquire/renew loop until `stop` fires, emitting
/// transitions as they are observed. A demoted holder may briefly keep
/// running before it sees `Released`; late status writes from it are
/// ordinary writes the next leader overwrites.
pub trait LeaseElector: Send + Sync {
    fn run(&self, stop: CancellationToken) -> BoxStream<'static, LeaderEvent>;
}
