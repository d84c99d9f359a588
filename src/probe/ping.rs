use std::process::Stdio;
use std::time::{Duration, Instant};

use super::{ProbeResult, elapsed_ms};

/// Extra time granted to the `ping` process on top of its own timeout before
/// it is killed.
const PROCESS_GRACE: Duration = Duration::from_secs(1);

/// Sends a single echo request to `address` using the system `ping` utility.
///
/// The latency reported by `ping` is used when it can be parsed from its
/// output; otherwise the wall-clock time of the successful invocation is used.
pub async fn check_ping(address: &str, timeout: Duration) -> ProbeResult {
    let address = address.trim();
    if address.is_empty() || address.starts_with('-') {
        log::debug!(target: "probe", "refusing to ping invalid address `{}`", address);
        return ProbeResult::failed();
    }

    let mut command = tokio::process::Command::new("ping");
    command
        .args(ping_args(address, timeout))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let started = Instant::now();
    let output = match tokio::time::timeout(timeout + PROCESS_GRACE, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            log::debug!(target: "probe", "failed to run ping for `{}`: {}", address, err);
            return ProbeResult::failed();
        }
        Err(_) => {
            log::debug!(target: "probe", "ping for `{}` did not exit in time", address);
            return ProbeResult::failed();
        }
    };
    let elapsed = elapsed_ms(started);

    if !output.status.success() {
        log::trace!(target: "probe", "ping for `{}` exited with {}", address, output.status);
        return ProbeResult::failed();
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    ProbeResult::succeeded(parse_latency_ms(&stdout).unwrap_or(elapsed))
}

fn ping_args(address: &str, timeout: Duration) -> Vec<String> {
    let secs = timeout.as_secs().max(1).to_string();
    let mut args: Vec<String> = if cfg!(windows) {
        let millis = timeout.as_millis().max(1).to_string();
        vec!["-n".into(), "1".into(), "-w".into(), millis]
    } else if cfg!(target_os = "macos") {
        vec!["-c".into(), "1".into(), "-t".into(), secs]
    } else {
        vec!["-c".into(), "1".into(), "-W".into(), secs]
    };
    args.push(address.to_owned());
    args
}

/// Extracts the round-trip time from `time=0.045 ms` or `time<1ms` fragments.
fn parse_latency_ms(output: &str) -> Option<f64> {
    let lower = output.to_ascii_lowercase();
    let start = lower.find("time=").or_else(|| lower.find("time<"))? + "time=".len();
    let number: String = lower[start..]
        .chars()
        .skip_while(|c| c.is_whitespace())
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    number.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_latency_linux_output() {
        let output = "\
PING 127.0.0.1 (127.0.0.1) 56(84) bytes of data.
64 bytes from 127.0.0.1: icmp_seq=1 ttl=64 time=0.045 ms

--- 127.0.0.1 ping statistics ---
1 packets transmitted, 1 received, 0% packet loss, time 0ms
";
        assert_eq!(parse_latency_ms(output), Some(0.045));
    }

    #[test]
    fn test_parse_latency_windows_output() {
        let output = "Reply from 10.0.0.1: bytes=32 time<1ms TTL=128";
        assert_eq!(parse_latency_ms(output), Some(1.0));
        let output = "Reply from 10.0.0.1: bytes=32 Time=17ms TTL=128";
        assert_eq!(parse_latency_ms(output), Some(17.0));
    }

    #[test]
    fn test_parse_latency_missing() {
        assert_eq!(parse_latency_ms("Request timed out."), None);
        assert_eq!(parse_latency_ms(""), None);
    }

    #[test]
    fn test_ping_args_end_with_address() {
        let args = ping_args("10.0.0.1", Duration::from_millis(1500));
        assert_eq!(args.last().map(String::as_str), Some("10.0.0.1"));
        assert!(args.contains(&"1".to_owned()));
    }

    #[tokio::test]
    async fn test_check_ping_rejects_option_like_address() {
        let result = check_ping("-f", Duration::from_secs(1)).await;
        assert_eq!(result, ProbeResult::failed());
        let result = check_ping("   ", Duration::from_secs(1)).await;
        assert_eq!(result, ProbeResult::failed());
    }

    #[tokio::test]
    async fn test_check_ping_unreachable_is_dead_and_bounded() {
        let started = Instant::now();
        // TEST-NET-1, never routed.
        let result = check_ping("192.0.2.1", Duration::from_secs(1)).await;
        assert!(!result.success);
        assert_eq!(result.latency_ms, 0.0);
        assert!(started.elapsed() < Duration::from_secs(1) + PROCESS_GRACE + Duration::from_secs(1));
    }

    #[tokio::test]
    #[ignore = "requires a `ping` binary permitted to send ICMP"]
    async fn test_check_ping_loopback() {
        let result = check_ping("127.0.0.1", Duration::from_secs(1)).await;
        assert!(result.success);
        assert!(result.latency_ms >= 0.0);
    }
}
