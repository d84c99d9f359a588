//! Threshold-based alerting on top of status events.
//!
//! [`AlertSink`] counts consecutive failed checks per device and asks an
//! [`AlertDispatcher`] to notify the device's recipients once the configured
//! threshold is reached, at most once per alert interval. After an outage was
//! reported, the first healthy check sends a recovery notice. Delivery itself
//! (e.g. SMTP) is up to the dispatcher.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::events::{EventSink, StatusEvent};
use crate::node::{AlertSettings, NodeId};
use crate::registry::{self, Registry};

/// Delivers an alert to a list of recipients.
pub trait AlertDispatcher: Send + Sync + 'static {
    /// Returns `true` if the alert was handed off successfully.
    fn send_alert(&self, recipients: &[String], subject: &str, body: &str) -> bool;
}

/// Dispatcher that only logs alerts. Used when no transport is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDispatcher;

impl AlertDispatcher for LogDispatcher {
    fn send_alert(&self, recipients: &[String], subject: &str, body: &str) -> bool {
        log::warn!(
            target: "alert",
            "{} (to: {}): {}",
            subject,
            recipients.join(", "),
            body.replace('\n', " | ")
        );
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AlertKind {
    Outage,
    Recovery,
}

#[derive(Debug, Clone, PartialEq)]
struct Alert {
    kind: AlertKind,
    recipients: Vec<String>,
    subject: String,
    body: String,
}

#[derive(Debug, Default)]
struct DeviceAlertState {
    consecutive_failures: u32,
    last_alert_at: Option<Instant>,
    outage_reported: bool,
}

pub struct AlertSink<D> {
    registry: Arc<Registry>,
    dispatcher: D,
    states: Mutex<HashMap<NodeId, DeviceAlertState>>,
}

impl<D: AlertDispatcher> AlertSink<D> {
    pub fn new(registry: Arc<Registry>, dispatcher: D) -> Self {
        Self {
            registry,
            dispatcher,
            states: Mutex::new(HashMap::new()),
        }
    }

    fn evaluate(&self, event: &StatusEvent, settings: &AlertSettings, now: Instant) -> Option<Alert> {
        let mut states = self.states.lock();
        let state = states.entry(event.device_id.clone()).or_default();
        let deliverable = settings.enabled && !settings.emails.is_empty();
        let recipients = || settings.emails.iter().cloned().collect::<Vec<_>>();

        if event.is_healthy() {
            state.consecutive_failures = 0;
            if !std::mem::take(&mut state.outage_reported) || !deliverable {
                return None;
            }
            return Some(Alert {
                kind: AlertKind::Recovery,
                recipients: recipients(),
                subject: format!("[pingforest] {} recovered", event.device_name),
                body: describe(event, 0),
            });
        }

        if !event.is_failure() {
            return None;
        }
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        if !deliverable || state.consecutive_failures < settings.threshold_count.max(1) {
            return None;
        }
        let interval = Duration::from_secs(settings.interval_minutes.saturating_mul(60));
        if state
            .last_alert_at
            .is_some_and(|last| now.duration_since(last) < interval)
        {
            return None;
        }

        Some(Alert {
            kind: AlertKind::Outage,
            recipients: recipients(),
            subject: format!("[pingforest] {} is unreachable", event.device_name),
            body: describe(event, state.consecutive_failures),
        })
    }

    fn mark_sent(&self, id: &NodeId, kind: AlertKind, now: Instant) {
        if kind == AlertKind::Outage {
            if let Some(state) = self.states.lock().get_mut(id) {
                state.last_alert_at = Some(now);
                state.outage_reported = true;
            }
        }
    }

    fn handle(&self, event: &StatusEvent, settings: &AlertSettings, now: Instant) {
        let Some(alert) = self.evaluate(event, settings, now) else {
            return;
        };
        if self
            .dispatcher
            .send_alert(&alert.recipients, &alert.subject, &alert.body)
        {
            self.mark_sent(&event.device_id, alert.kind, now);
        } else {
            log::warn!(
                target: "alert",
                "failed to deliver alert for device `{}`",
                event.device_id
            );
        }
    }
}

impl<D: AlertDispatcher> EventSink for AlertSink<D> {
    fn name(&self) -> &str {
        "alert"
    }

    fn notify(&self, event: &StatusEvent) {
        match self.registry.get(&event.device_id) {
            Ok(node) => self.handle(event, &node.alert, Instant::now()),
            Err(registry::Error::NotFound(_)) => {
                self.states.lock().remove(&event.device_id);
            }
            Err(err) => log::error!(target: "alert", "{err}"),
        }
    }
}

fn describe(event: &StatusEvent, failures: u32) -> String {
    let mut body = format!(
        "Device: {} ({})\nChecked at: {}\nPing: {} ({} ms)",
        event.device_name,
        event.device_id,
        event.checked_at,
        event.ping.status,
        event.ping.latency_ms
    );
    if let Some(port) = event.port {
        body.push_str(&format!("\nPort: {} ({} ms)", port.status, port.latency_ms));
    }
    if failures > 0 {
        body.push_str(&format!("\nConsecutive failed checks: {failures}"));
    }
    body
}
