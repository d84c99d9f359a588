//! Single, bounded reachability checks.
//!
//! Probes never fail to their caller: malformed addresses, resolution errors,
//! refused connections, timeouts and OS-level failures all collapse into
//! [`ProbeResult::failed`]. Causes are logged at `debug`/`trace` level only.
use std::time::{Duration, Instant};

mod ping;
mod port;

pub use ping::check_ping;
pub use port::check_port;

/// Default bound for a single ping.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(1);
/// Default bound for a single TCP connect.
pub const DEFAULT_PORT_TIMEOUT: Duration = Duration::from_secs(2);

/// Outcome of a single probe. `latency_ms` is `0.0` for failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeResult {
    pub success: bool,
    pub latency_ms: f64,
}

impl ProbeResult {
    pub fn succeeded(latency_ms: f64) -> Self {
        Self {
            success: true,
            latency_ms: latency_ms.max(0.0),
        }
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            latency_ms: 0.0,
        }
    }
}

/// Performs the network checks for the monitoring engine.
///
/// [`SystemProber`] talks to the network; tests substitute scripted probers.
pub trait Prober: Send + Sync + 'static {
    fn ping(
        &self,
        address: &str,
        timeout: Duration,
    ) -> impl std::future::Future<Output = ProbeResult> + Send;

    fn connect(
        &self,
        address: &str,
        port: u16,
        timeout: Duration,
    ) -> impl std::future::Future<Output = ProbeResult> + Send;
}

/// Probes backed by the system `ping` utility and TCP sockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProber;

impl Prober for SystemProber {
    async fn ping(&self, address: &str, timeout: Duration) -> ProbeResult {
        check_ping(address, timeout).await
    }

    async fn connect(&self, address: &str, port: u16, timeout: Duration) -> ProbeResult {
        check_port(address, port, timeout).await
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_has_zero_latency() {
        let result = ProbeResult::failed();
        assert!(!result.success);
        assert_eq!(result.latency_ms, 0.0);
    }

    #[test]
    fn test_succeeded_clamps_negative_latency() {
        assert_eq!(ProbeResult::succeeded(-1.0).latency_ms, 0.0);
        assert_eq!(ProbeResult::succeeded(4.5).latency_ms, 4.5);
    }
}
