//! Concurrent polling scheduler.
//!
//! The engine owns one worker task per device. Each worker repeatedly probes
//! its device, records the result in the [`Registry`], publishes a
//! [`StatusEvent`](crate::events::StatusEvent), and sleeps for the device's
//! poll interval. Workers are independent: a slow, failing, or panicking
//! device never affects the others.
//!
//! # Lifecycle
//!
//! Every worker is tracked by a handle holding its stop signal and join
//! handle. Stopping a worker always waits for its task to finish, so no worker
//! outlives [`MonitorEngine::stop_all`]. A stop request interrupts the sleep
//! between checks immediately; an in-flight probe is allowed to finish, which
//! is bounded by the probe timeout.
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::events::EventBus;
use crate::node::{LatencyPolicy, NodeId};
use crate::probe::{self, Prober, SystemProber};
use crate::registry::Registry;

mod error;
mod worker;

pub use error::{Error, Result};

use worker::{CheckContext, Worker};

/// Timing and classification parameters shared by all workers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub ping_timeout: Duration,
    pub port_timeout: Duration,
    pub latency_policy: LatencyPolicy,
    /// Pause between registry lookups for devices without an address.
    pub idle_delay: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            ping_timeout: probe::DEFAULT_PING_TIMEOUT,
            port_timeout: probe::DEFAULT_PORT_TIMEOUT,
            latency_policy: LatencyPolicy::disabled(),
            idle_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
struct WorkerHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    fn signal(&self) {
        self.stop_tx.send_replace(true);
    }

    async fn join(self) {
        if let Err(err) = self.join.await {
            log::error!(target: "monitor engine", "worker task failed: {}", err);
        }
    }

    async fn shutdown(self) {
        self.signal();
        self.join().await;
    }
}

pub struct MonitorEngine<P = SystemProber> {
    registry: Arc<Registry>,
    context: Arc<CheckContext<P>>,
    workers: DashMap<NodeId, WorkerHandle>,
}

impl<P> std::fmt::Debug for MonitorEngine<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorEngine")
            .field("workers", &self.workers.len())
            .finish()
    }
}

impl<P: Prober> MonitorEngine<P> {
    pub fn new(
        registry: Arc<Registry>,
        prober: P,
        events: Arc<EventBus>,
        settings: EngineSettings,
    ) -> Self {
        let context = Arc::new(CheckContext {
            registry: Arc::clone(&registry),
            prober,
            events,
            settings,
        });
        Self {
            registry,
            context,
            workers: DashMap::new(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.context.settings
    }

    /// Starts a worker for every device currently in the registry.
    ///
    /// Devices that already have a worker get a fresh one.
    pub async fn start_all(&self) {
        let devices = self.registry.list_devices();
        let count = devices.len();
        for device in devices {
            self.restart(device.id).await;
        }
        log::info!("Started monitoring {} devices", count);
    }

    /// Restarts the worker of `id` so that its current configuration takes
    /// effect. Any in-flight result of the previous worker may still be
    /// written, but is superseded by the next check.
    ///
    /// If `id` no longer resolves to a device its worker is stopped instead.
    pub async fn reconcile(&self, id: &NodeId) {
        match self.registry.get(id) {
            Ok(node) if node.is_device() => self.restart(node.id).await,
            _ => {
                self.stop(id).await;
            }
        }
    }

    /// Stops the worker of `id` and waits for it to finish.
    ///
    /// Returns `false` if no worker was running for `id`.
    pub async fn stop(&self, id: &NodeId) -> bool {
        match self.workers.remove(id) {
            Some((_, handle)) => {
                handle.shutdown().await;
                true
            }
            None => false,
        }
    }

    /// Stops every worker and waits until all of them have finished.
    pub async fn stop_all(&self) {
        let ids: Vec<NodeId> = self.workers.iter().map(|entry| entry.key().clone()).collect();
        let handles: Vec<WorkerHandle> = ids
            .iter()
            .filter_map(|id| self.workers.remove(id).map(|(_, handle)| handle))
            .collect();

        // Signal everyone first so shutdown takes as long as the slowest
        // worker, not the sum of all of them.
        for handle in &handles {
            handle.signal();
        }
        let count = handles.len();
        for handle in handles {
            handle.join().await;
        }
        log::info!("Stopped {} workers", count);
    }

    /// Aligns the worker set with the registry: stops workers whose device is
    /// gone and starts workers for devices that have none.
    pub async fn sync_with_registry(&self) {
        let devices = self.registry.list_devices();
        let device_ids: HashSet<&NodeId> = devices.iter().map(|device| &device.id).collect();

        let stale: Vec<NodeId> = self
            .workers
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|id| !device_ids.contains(id))
            .collect();
        for id in &stale {
            self.stop(id).await;
        }

        let missing: Vec<NodeId> = devices
            .iter()
            .filter(|device| !self.is_running(&device.id))
            .map(|device| device.id.clone())
            .collect();
        for id in missing {
            self.restart(id).await;
        }
    }

    /// Returns `true` if a worker for `id` exists and has not finished.
    pub fn is_running(&self, id: &NodeId) -> bool {
        self.workers
            .get(id)
            .is_some_and(|handle| !handle.join.is_finished())
    }

    pub fn running_count(&self) -> usize {
        self.workers
            .iter()
            .filter(|entry| !entry.value().join.is_finished())
            .count()
    }

    async fn restart(&self, id: NodeId) {
        self.stop(&id).await;

        let (stop_tx, stop_rx) = watch::channel(false);
        let worker = Worker::new(id.clone(), Arc::clone(&self.context), stop_rx);
        let handle = WorkerHandle {
            stop_tx,
            join: tokio::spawn(worker.run()),
        };
        // A concurrent restart of the same device may have won the race.
        if let Some(previous) = self.workers.insert(id, handle) {
            previous.shutdown().await;
        }
    }
}
