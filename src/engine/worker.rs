use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::watch;

use crate::events::{EventBus, StatusEvent};
use crate::node::{Node, NodeId, ObservedStatus};
use crate::probe::Prober;
use crate::registry::{self, Registry};

use super::{EngineSettings, Error, Result};

/// Everything a check needs, shared by all workers of one engine.
pub(super) struct CheckContext<P> {
    pub(super) registry: Arc<Registry>,
    pub(super) prober: P,
    pub(super) events: Arc<EventBus>,
    pub(super) settings: EngineSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Recorded,
    Removed,
    /// A stop arrived while probing; nothing was recorded.
    Stopped,
}

impl<P: Prober> CheckContext<P> {
    /// Probes `node` once, stores the result, and publishes a status event.
    ///
    /// The port probe is skipped if `stop_rx` fired during the ping.
    async fn check(&self, node: &Node, stop_rx: &watch::Receiver<bool>) -> Result<Outcome> {
        let settings = &self.settings;
        let ping = self.prober.ping(&node.address, settings.ping_timeout).await;
        if *stop_rx.borrow() {
            return Ok(Outcome::Stopped);
        }
        let port = match node.monitored_port() {
            Some(port) => Some(
                self.prober
                    .connect(&node.address, port, settings.port_timeout)
                    .await,
            ),
            None => None,
        };

        let ping = settings.latency_policy.classify(ping);
        let port = port.map(|result| settings.latency_policy.classify(result));
        let checked_at = OffsetDateTime::now_utc();
        let previous = node.status.unwrap_or_default();
        let observed = ObservedStatus {
            ping,
            port: port.unwrap_or_default(),
            last_checked_at: Some(checked_at),
        };

        match self.registry.record_status(&node.id, observed) {
            Ok(()) => {}
            Err(registry::Error::NotFound(_)) => return Ok(Outcome::Removed),
            Err(source) => {
                return Err(Error::Record {
                    id: node.id.clone(),
                    source,
                });
            }
        }

        self.events.publish(StatusEvent {
            device_id: node.id.clone(),
            device_name: node.name.clone(),
            ping,
            port,
            checked_at,
            previous_ping: previous.ping.status,
            previous_port: previous.port.status,
        });
        Ok(Outcome::Recorded)
    }
}

/// Polling loop of a single device.
pub(super) struct Worker<P> {
    id: NodeId,
    context: Arc<CheckContext<P>>,
    stop_rx: watch::Receiver<bool>,
}

impl<P: Prober> Worker<P> {
    pub(super) fn new(
        id: NodeId,
        context: Arc<CheckContext<P>>,
        stop_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            context,
            stop_rx,
        }
    }

    pub(super) async fn run(mut self) {
        log::debug!(target: "monitor engine", "worker for `{}` started", self.id);
        while !*self.stop_rx.borrow() {
            // Configuration is re-read every cycle; a removed device ends the worker.
            let node = match self.context.registry.get(&self.id) {
                Ok(node) => node,
                Err(_) => break,
            };

            let delay = if node.is_monitored() {
                let interval = node.poll_interval.as_duration();
                match self.check(node).await {
                    Ok(Outcome::Recorded) => interval,
                    Ok(Outcome::Removed | Outcome::Stopped) => break,
                    Err(err) => {
                        log::error!(target: "monitor engine", "{err}");
                        interval
                    }
                }
            } else {
                self.context.settings.idle_delay
            };

            let stopped = tokio::select! {
                _ = self.stop_rx.wait_for(|stop| *stop) => true,
                _ = tokio::time::sleep(delay) => false,
            };
            if stopped {
                break;
            }
        }
        log::debug!(target: "monitor engine", "worker for `{}` stopped", self.id);
    }

    /// Runs one check on its own task so a panic inside a probe is contained.
    async fn check(&self, node: Node) -> Result<Outcome> {
        let context = Arc::clone(&self.context);
        let stop_rx = self.stop_rx.clone();
        let task = tokio::spawn(async move { context.check(&node, &stop_rx).await });
        match task.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => Err(Error::Panicked {
                id: self.id.clone(),
            }),
            Err(_) => Err(Error::Cancelled {
                id: self.id.clone(),
            }),
        }
    }
}
