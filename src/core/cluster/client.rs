//! Cluster object client abstraction.
//!
//! The health checker talks to the cluster through this trait so production
//! code can bind the real API client while tests inject mocks.

use crate::core::cluster::types::{Condition, Workload};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The object disappeared between the watch event and the call.
    #[error("workload {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },
    /// Any other API failure, including write conflicts; callers retry on
    /// the next scheduling interval.
    #[error("cluster API error: {0}")]
    Api(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Namespace-scoped access to workload objects.
#[async_trait::async_trait]
pub trait WorkloadClient: Send + Sync {
    /// Fetch the current object by identity, distinguishing not-found from
    /// other failures.
    async fn get(&self, namespace: &str, name: &str) -> Result<Workload, ClientError>;

    /// Apply a merge-style status subresource patch carrying only the
    /// conditions array.
    async fn patch_conditions(
        &self,
        namespace: &str,
        name: &str,
        conditions: &[Condition],
    ) -> Result<(), ClientError>;
}
