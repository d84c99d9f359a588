/// Pingforest: hierarchical reachability monitoring for network devices.
///
/// Devices are organized in a tree of groups. Every device is polled on its own
/// schedule with an ICMP ping and, optionally, a TCP connect to a port. The
/// latest observed status is kept in the registry, persisted configuration is
/// stored as JSON, and status changes fan out to logging and alerting sinks.
use std::sync::Arc;

use alert::{AlertSink, LogDispatcher};
use app::App;
use config::Config;
use events::{EventBus, LogSink};
use node::{NewNode, PollInterval};
use persistence::JsonFileStore;
use probe::SystemProber;
use registry::Registry;

pub mod alert;
pub mod api;
pub mod app;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod fsutil;
pub mod node;
pub mod persistence;
pub mod probe;
pub mod registry;

/// Polling interval of the demo devices.
const DEMO_POLL_INTERVAL_SECS: u64 = 2;

/// Runs the monitor until Ctrl-C is received.
///
/// Loads the persisted tree (seeding a demo group if it is empty and seeding is
/// enabled), starts a worker per device, and serves the status API. On
/// shutdown every worker is stopped and the event sinks are drained.
///
/// # Errors
///
/// Possible errors include:
/// - Invalid `PINGFOREST_*` environment variables.
/// - An unreadable or malformed tree file.
/// - Failure to bind the API address.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    log::debug!("Configuration: {:?}", config);

    let store = Arc::new(JsonFileStore::new(config.data_file.clone()));
    let registry = Arc::new(Registry::open(store)?);
    log::info!(
        "Loaded {} nodes from `{}`",
        registry.len(),
        config.data_file.display()
    );
    if registry.is_empty() && config.seed_demo {
        seed_demo_tree(&registry)?;
    }

    let events = Arc::new(EventBus::new(config.event_queue_capacity));
    events.subscribe(Arc::new(LogSink))?;
    events.subscribe(Arc::new(AlertSink::new(
        Arc::clone(&registry),
        LogDispatcher,
    )))?;

    let app = Arc::new(App::new(
        registry,
        SystemProber,
        events,
        config.engine_settings(),
    ));
    app.start().await;

    let served = api::serve(Arc::clone(&app), config.api_addr.as_str(), async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::error!("failed to listen for Ctrl-C: {}", err);
        }
        log::info!("Shutting down");
    })
    .await;

    app.shutdown().await;
    served?;
    Ok(())
}

fn seed_demo_tree(registry: &Registry) -> Result<(), Box<dyn std::error::Error>> {
    let interval = PollInterval::from_secs(DEMO_POLL_INTERVAL_SECS)?;
    let group = NewNode::group("Database Servers")
        .with_child(NewNode::device("DB-01", "127.0.0.1").with_poll_interval(interval))
        .with_child(NewNode::device("DB-02", "192.168.99.99").with_poll_interval(interval));
    registry.add(group, None)?;
    log::info!("Seeded demo devices");
    Ok(())
}
