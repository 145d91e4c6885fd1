//! Runtime configuration assembled from the command line.

pub mod defaults;

use std::time::Duration;

use crate::cli::Cli;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be positive")]
    NonPositiveDuration { name: &'static str },
    #[error("worker count must be greater than zero")]
    NoWorkers,
    #[error("renew deadline ({renew:?}) must be strictly less than lease duration ({lease:?})")]
    RenewDeadlineTooLong { renew: Duration, lease: Duration },
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Scheduler tick period.
    pub probe_interval: Duration,
    /// Ceiling for a single probe attempt.
    pub probe_timeout: Duration,
    /// Worker pool size.
    pub workers: usize,
    /// Probe attempts beyond the first.
    pub probe_retries: u32,
    /// Lease validity once acquired.
    pub lease_duration: Duration,
    /// Renewal give-up bound.
    pub renew_deadline: Duration,
    /// Lease acquisition/renewal cadence.
    pub retry_period: Duration,
    /// Namespace of the leadership lease object.
    pub lease_namespace: String,
    /// Name of the leadership lease object.
    pub lease_name: String,
    /// Lease holder identity.
    pub identity: String,
}

impl Config {
    /// Build a configuration from parsed CLI flags and validate it.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let config = Self {
            probe_interval: Duration::from_millis(cli.probe_interval_ms),
            probe_timeout: Duration::from_millis(cli.probe_timeout_ms),
            workers: cli.workers,
            probe_retries: cli.probe_retries,
            lease_duration: Duration::from_millis(cli.lease_duration_ms),
            renew_deadline: Duration::from_millis(cli.renew_deadline_ms),
            retry_period: Duration::from_millis(cli.retry_period_ms),
            lease_namespace: cli.lease_namespace.clone(),
            lease_name: cli.lease_name.clone(),
            identity: cli
                .identity
                .clone()
                .unwrap_or_else(default_identity),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("probe interval", self.probe_interval),
            ("probe timeout", self.probe_timeout),
            ("lease duration", self.lease_duration),
            ("renew deadline", self.renew_deadline),
            ("retry period", self.retry_period),
        ] {
            if value.is_zero() {
                return Err(ConfigError::NonPositiveDuration { name });
            }
        }
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.renew_deadline >= self.lease_duration {
            return Err(ConfigError::RenewDeadlineTooLong {
                renew: self.renew_deadline,
                lease: self.lease_duration,
            });
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_millis(defaults::PROBE_INTERVAL_MS),
            probe_timeout: Duration::from_millis(defaults::PROBE_TIMEOUT_MS),
            workers: defaults::WORKERS,
            probe_retries: defaults::PROBE_RETRIES,
            lease_duration: Duration::from_millis(defaults::LEASE_DURATION_MS),
            renew_deadline: Duration::from_millis(defaults::RENEW_DEADLINE_MS),
            retry_period: Duration::from_millis(defaults::RETRY_PERIOD_MS),
            lease_namespace: defaults::LEASE_NAMESPACE.to_string(),
            lease_name: defaults::LEASE_NAME.to_string(),
            identity: default_identity(),
        }
    }
}

/// Holder identity in the conventional "<hostname>_<uuid>" form, so replicas
/// on the same node remain distinguishable.
fn default_identity() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string());
    format!("{}_{}", host, uuid::Uuid::new_v4())
}
