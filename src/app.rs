//! Application context.
//!
//! [`App`] owns the registry, the monitoring engine and the event bus, and
//! routes every tree mutation through the registry first and the engine
//! second, so that workers always follow the stored configuration.
use std::sync::Arc;

use crate::engine::{EngineSettings, MonitorEngine};
use crate::events::EventBus;
use crate::node::{NewNode, Node, NodeId, NodePatch};
use crate::probe::{Prober, SystemProber};
use crate::registry::{self, Registry};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Registry(#[from] registry::Error),
    #[error("registry update was cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

pub struct App<P = SystemProber> {
    registry: Arc<Registry>,
    events: Arc<EventBus>,
    engine: MonitorEngine<P>,
}

impl<P> std::fmt::Debug for App<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("registry", &self.registry)
            .field("events", &self.events)
            .field("engine", &self.engine)
            .finish()
    }
}

impl<P: Prober> App<P> {
    pub fn new(
        registry: Arc<Registry>,
        prober: P,
        events: Arc<EventBus>,
        settings: EngineSettings,
    ) -> Self {
        let engine = MonitorEngine::new(
            Arc::clone(&registry),
            prober,
            Arc::clone(&events),
            settings,
        );
        Self {
            registry,
            events,
            engine,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn engine(&self) -> &MonitorEngine<P> {
        &self.engine
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Starts monitoring every registered device.
    pub async fn start(&self) {
        self.engine.start_all().await;
    }

    /// Registers `node` (with its descendants) and starts monitoring every
    /// device among them.
    ///
    /// # Errors
    ///
    /// Propagates the registry's error; nothing is started in that case.
    pub async fn add_node(&self, node: NewNode, parent_id: Option<&NodeId>) -> Result<NodeId> {
        let parent_id = parent_id.cloned();
        let mut added = self
            .blocking(move |registry| registry.add_subtree(node, parent_id.as_ref()))
            .await?;
        for id in &added {
            self.engine.reconcile(id).await;
        }
        // Pre-order: the root of the new subtree comes first.
        Ok(added.swap_remove(0))
    }

    /// Applies `patch` to `id` and restarts its worker if it is a device.
    ///
    /// # Errors
    ///
    /// Propagates the registry's error.
    pub async fn update_node(&self, id: &NodeId, patch: NodePatch) -> Result<Node> {
        let target = id.clone();
        let node = self
            .blocking(move |registry| registry.update_fields(&target, patch))
            .await?;
        if node.is_device() {
            self.engine.reconcile(id).await;
        }
        Ok(node)
    }

    /// Moves `id` below `new_parent`. Workers are unaffected.
    ///
    /// # Errors
    ///
    /// Propagates the registry's error.
    pub async fn move_node(&self, id: &NodeId, new_parent: Option<&NodeId>) -> Result<()> {
        let id = id.clone();
        let new_parent = new_parent.cloned();
        self.blocking(move |registry| registry.move_node(&id, new_parent.as_ref()))
            .await
    }

    /// Removes `id` and its descendants and stops their workers.
    ///
    /// # Errors
    ///
    /// Propagates the registry's error.
    pub async fn remove_node(&self, id: &NodeId) -> Result<Vec<NodeId>> {
        let target = id.clone();
        let removed = self
            .blocking(move |registry| registry.remove(&target))
            .await?;
        for id in &removed {
            self.engine.stop(id).await;
        }
        Ok(removed)
    }

    /// Stops all workers, then lets event sinks drain their queues.
    pub async fn shutdown(&self) {
        self.engine.stop_all().await;
        self.events.close().await;
        log::info!("Monitoring stopped");
    }

    /// Runs a registry mutation, including the tree save it triggers, on the
    /// blocking thread pool.
    async fn blocking<T, F>(&self, mutate: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Registry) -> registry::Result<T> + Send + 'static,
    {
        let registry = Arc::clone(&self.registry);
        match tokio::task::spawn_blocking(move || mutate(&registry)).await {
            Ok(result) => Ok(result?),
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => Err(Error::Cancelled),
        }
    }
}
