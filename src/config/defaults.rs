//! Named defaults for the runtime configuration.

/// Scheduler tick period.
pub const PROBE_INTERVAL_MS: u64 = 1_000;

/// Ceiling for one probe attempt.
pub const PROBE_TIMEOUT_MS: u64 = 1_000;

/// Worker pool size.
pub const WORKERS: usize = 10;

/// Probe attempts beyond the first.
pub const PROBE_RETRIES: u32 = 3;

/// Lease validity once acquired.
pub const LEASE_DURATION_MS: u64 = 4_000;

/// Renewal give-up bound; must stay below the lease duration.
pub const RENEW_DEADLINE_MS: u64 = 2_000;

/// Acquisition/renewal retry cadence.
pub const RETRY_PERIOD_MS: u64 = 500;

/// Namespace of the leadership lease object.
pub const LEASE_NAMESPACE: &str = "kube-system";

/// Name of the leadership lease object.
pub const LEASE_NAME: &str = "endpoint-health-checker";
