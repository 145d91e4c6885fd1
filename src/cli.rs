use clap::Parser;

use crate::config::defaults;

#[derive(Parser, Debug)]
#[command(name = "endpoint-health-checker")]
#[command(version = concat!("Ver:", env!("CARGO_PKG_VERSION")))]
#[command(about = "Active TCP/ICMP endpoint probing for cluster workloads")]
pub struct Cli {
    /// Scheduler tick period in milliseconds
    #[arg(long = "probe-interval-ms", default_value_t = defaults::PROBE_INTERVAL_MS)]
    pub probe_interval_ms: u64,

    /// Ceiling for a single probe attempt in milliseconds
    #[arg(long = "probe-timeout-ms", default_value_t = defaults::PROBE_TIMEOUT_MS)]
    pub probe_timeout_ms: u64,

    /// Number of concurrent probe workers
    #[arg(long = "workers", default_value_t = defaults::WORKERS)]
    pub workers: usize,

    /// Probe attempts beyond the first before an endpoint is declared
    /// unreachable. The distribution chart has historically shipped 10;
    /// the binary default stays at 3.
    #[arg(long = "probe-retries", default_value_t = defaults::PROBE_RETRIES)]
    pub probe_retries: u32,

    /// How long a held leadership lease remains valid, in milliseconds
    #[arg(long = "lease-duration-ms", default_value_t = defaults::LEASE_DURATION_MS)]
    pub lease_duration_ms: u64,

    /// Give up renewing a held lease after this long, in milliseconds.
    /// Must be strictly less than the lease duration.
    #[arg(long = "renew-deadline-ms", default_value_t = defaults::RENEW_DEADLINE_MS)]
    pub renew_deadline_ms: u64,

    /// Cadence of lease acquisition and renewal attempts in milliseconds
    #[arg(long = "retry-period-ms", default_value_t = defaults::RETRY_PERIOD_MS)]
    pub retry_period_ms: u64,

    /// Namespace holding the leadership lease object
    #[arg(long = "lease-namespace", default_value = defaults::LEASE_NAMESPACE)]
    pub lease_namespace: String,

    /// Name of the leadership lease object
    #[arg(long = "lease-name", default_value = defaults::LEASE_NAME)]
    pub lease_name: String,

    /// Lease holder identity; defaults to "<hostname>_<uuid>"
    #[arg(long = "identity")]
    pub identity: Option<String>,

    /// Default log directive when RUST_LOG is unset
    #[arg(long = "log-level", default_value = "info")]
    pub log_level: String,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
