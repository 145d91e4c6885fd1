//! TCP connect probe.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};

use super::ProbeError;

/// Probe `<ip>:<port>` by establishing a transport connection and closing it
/// immediately. Any connect-phase failure (refused, unreachable, timeout)
/// counts as a failed attempt.
///
/// Attempts that fail faster than the per-attempt timeout are spaced out to
/// the timeout boundary, so a burst of quick refusals cannot pile all
/// retries into the start of a single probe interval.
pub async fn probe(
    ip: IpAddr,
    port: u16,
    retries: u32,
    attempt_timeout: Duration,
) -> Result<(), ProbeError> {
    let addr = SocketAddr::new(ip, port);
    let attempts = retries + 1;
    let mut last_cause = String::new();

    for attempt in 1..=attempts {
        let started = Instant::now();
        match timeout(attempt_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                drop(stream);
                return Ok(());
            }
            Ok(Err(err)) => last_cause = err.to_string(),
            Err(_) => last_cause = format!("connect timed out after {attempt_timeout:?}"),
        }

        if attempt < attempts {
            if let Some(remainder) = attempt_timeout.checked_sub(started.elapsed()) {
                tokio::time::sleep(remainder).await;
            }
        }
    }

    Err(ProbeError::Unreachable {
        attempts,
        cause: last_cause,
    })
}
