use std::time::{Duration, Instant};

use tokio::net::TcpStream;

use super::{ProbeResult, elapsed_ms};

/// Attempts a TCP handshake with `address:port`.
///
/// Name resolution counts towards `timeout`. The connection is closed right
/// after the handshake completes.
pub async fn check_port(address: &str, port: u16, timeout: Duration) -> ProbeResult {
    let address = address.trim();
    if address.is_empty() || port == 0 {
        return ProbeResult::failed();
    }

    let started = Instant::now();
    match tokio::time::timeout(timeout, TcpStream::connect((address, port))).await {
        Ok(Ok(_stream)) => ProbeResult::succeeded(elapsed_ms(started)),
        Ok(Err(err)) => {
            log::trace!(target: "probe", "connect to `{}:{}` failed: {}", address, port, err);
            ProbeResult::failed()
        }
        Err(_) => {
            log::trace!(target: "probe", "connect to `{}:{}` timed out", address, port);
            ProbeResult::failed()
        }
    }
}
