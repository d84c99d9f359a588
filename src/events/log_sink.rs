use super::{EventSink, StatusEvent};
use crate::node::{ProbeReading, Status};

/// Writes one `Connection Status` line per check and highlights transitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn notify(&self, event: &StatusEvent) {
        log::info!(
            target: "connection",
            "{}",
            status_line("Connection", &event.device_name, event.ping)
        );
        if let Some(port) = event.port {
            log::info!(
                target: "connection",
                "{}",
                status_line("Port", &event.device_name, port)
            );
        }

        if event.ping_changed() {
            log_transition(event, "ping", event.previous_ping, event.ping.status);
        }
        if let Some(port) = event.port.filter(|_| event.port_changed()) {
            log_transition(event, "port", event.previous_port, port.status);
        }
    }
}

fn status_line(check: &str, device_name: &str, reading: ProbeReading) -> String {
    format!(
        "{} Status | {} | {} | {}ms",
        check, device_name, reading.status, reading.latency_ms
    )
}

fn transition_line(event: &StatusEvent, check: &str, from: Status, to: Status) -> String {
    format!(
        "{} `{}` ({}) changed {} -> {}",
        check, event.device_name, event.device_id, from, to
    )
}

/// Losing a device is a warning, everything else is informational.
fn transition_level(to: Status) -> log::Level {
    match to {
        Status::Dead => log::Level::Warn,
        _ => log::Level::Info,
    }
}

fn log_transition(event: &StatusEvent, check: &str, from: Status, to: Status) {
    log::log!(
        target: "connection",
        transition_level(to),
        "{}",
        transition_line(event, check, from, to)
    );
}
