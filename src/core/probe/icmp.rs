//! ICMP echo probe.
//!
//! Requires the privilege to open raw sockets; a permission failure is
//! reported as a setup error rather than an unreachable endpoint.

use std::io::ErrorKind;
use std::net::IpAddr;
use std::time::Duration;

use tokio::time::timeout;

use super::ProbeError;

const PAYLOAD: [u8; 8] = [0; 8];

/// Probe `ip` with an echo request per attempt, waiting up to the
/// per-attempt timeout for a reply. Unlike the TCP probe, failed attempts
/// retry immediately; the reply wait already consumes the attempt budget.
pub async fn probe(ip: IpAddr, retries: u32, attempt_timeout: Duration) -> Result<(), ProbeError> {
    let attempts = retries + 1;
    let mut last_cause = String::new();

    for _ in 1..=attempts {
        match timeout(attempt_timeout, surge_ping::ping(ip, &PAYLOAD)).await {
            Ok(Ok((_reply, _rtt))) => return Ok(()),
            Ok(Err(surge_ping::SurgeError::IOError(err)))
                if err.kind() == ErrorKind::PermissionDenied =>
            {
                return Err(ProbeError::Setup(err));
            }
            Ok(Err(err)) => last_cause = err.to_string(),
            Err(_) => last_cause = format!("no echo reply within {attempt_timeout:?}"),
        }
    }

    Err(ProbeError::Unreachable {
        attempts,
        cause: last_cause,
    })
}
