//! Status-change notifications.
//!
//! The monitoring engine publishes one [`StatusEvent`] per completed check.
//! Every subscriber owns a bounded queue; publishing never waits for a
//! subscriber. When a subscriber's queue is full the event is dropped for that
//! subscriber and a warning is logged.
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Mutex, RwLock};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::node::{NodeId, ProbeReading, Status};

mod log_sink;

pub use log_sink::LogSink;

/// Per-subscriber queue capacity used when none is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Result of one completed check of one device.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StatusEvent {
    pub device_id: NodeId,
    pub device_name: String,
    pub ping: ProbeReading,
    /// `None` if the device has no port configured.
    pub port: Option<ProbeReading>,
    #[serde(with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
    pub previous_ping: Status,
    pub previous_port: Status,
}

impl StatusEvent {
    pub fn ping_changed(&self) -> bool {
        self.ping.status != self.previous_ping
    }

    pub fn port_changed(&self) -> bool {
        self.port
            .is_some_and(|port| port.status != self.previous_port)
    }

    /// Returns `true` if any configured check failed.
    pub fn is_failure(&self) -> bool {
        self.ping.status == Status::Dead
            || self.port.is_some_and(|port| port.status == Status::Dead)
    }

    /// Returns `true` if every configured check succeeded.
    pub fn is_healthy(&self) -> bool {
        self.ping.status.is_reachable()
            && self.port.is_none_or(|port| port.status.is_reachable())
    }
}

/// Consumer of status events, e.g. logging or alerting.
///
/// Each subscribed sink runs on its own thread, so `notify` may block (for
/// example on an SMTP round-trip) without delaying the engine or other sinks.
pub trait EventSink: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn notify(&self, event: &StatusEvent);
}

struct Subscriber {
    name: String,
    tx: mpsc::Sender<Arc<StatusEvent>>,
}

/// Fan-out of status events to all subscribers.
pub struct EventBus {
    capacity: usize,
    subscribers: RwLock<Vec<Subscriber>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl EventBus {
    /// Creates a bus whose subscribers each buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: RwLock::new(Vec::new()),
            threads: Mutex::new(Vec::new()),
        }
    }

    /// Runs `sink` on a dedicated thread until the bus is closed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the thread cannot be spawned.
    pub fn subscribe(&self, sink: Arc<dyn EventSink>) -> std::io::Result<()> {
        let name = sink.name().to_owned();
        let mut rx = self.subscribe_channel(&name);
        let handle = std::thread::Builder::new()
            .name(format!("sink-{name}"))
            .spawn(move || {
                while let Some(event) = rx.blocking_recv() {
                    sink.notify(&event);
                }
                log::debug!("Event sink `{}` stopped", sink.name());
            })?;
        self.threads.lock().push(handle);
        Ok(())
    }

    /// Returns a raw receiver for consumers that drive their own loop.
    pub fn subscribe_channel(&self, name: &str) -> mpsc::Receiver<Arc<StatusEvent>> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers.write().push(Subscriber {
            name: name.to_owned(),
            tx,
        });
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Delivers `event` to every subscriber without waiting.
    pub fn publish(&self, event: StatusEvent) {
        let event = Arc::new(event);
        let mut any_closed = false;
        for subscriber in self.subscribers.read().iter() {
            match subscriber.tx.try_send(Arc::clone(&event)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => log::warn!(
                    target: "event bus",
                    "queue of `{}` is full, dropping event for device `{}`",
                    subscriber.name,
                    event.device_id
                ),
                Err(TrySendError::Closed(_)) => any_closed = true,
            }
        }

        if any_closed {
            self.subscribers.write().retain(|subscriber| {
                let open = !subscriber.tx.is_closed();
                if !open {
                    log::debug!(target: "event bus", "removing closed subscriber `{}`", subscriber.name);
                }
                open
            });
        }
    }

    /// Disconnects all subscribers and waits for sink threads to drain their
    /// queues.
    pub async fn close(&self) {
        self.subscribers.write().clear();
        let threads: Vec<_> = self.threads.lock().drain(..).collect();
        if threads.is_empty() {
            return;
        }

        let joined = tokio::task::spawn_blocking(move || {
            for thread in threads {
                if thread.join().is_err() {
                    log::error!(target: "event bus", "event sink thread panicked");
                }
            }
        })
        .await;
        if let Err(err) = joined {
            log::error!(target: "event bus", "failed to join event sink threads: {}", err);
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_event(ping: Status, port: Option<Status>) -> StatusEvent {
    let reading = |status: Status| ProbeReading {
        status,
        latency_ms: if status.is_reachable() { 1.0 } else { 0.0 },
    };
    StatusEvent {
        device_id: NodeId::new("device-1").unwrap(),
        device_name: "DB-01".into(),
        ping: reading(ping),
        port: port.map(reading),
        checked_at: OffsetDateTime::now_utc(),
        previous_ping: Status::Unknown,
        previous_port: Status::Unknown,
    }
}
