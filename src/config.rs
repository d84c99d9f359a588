//! Runtime configuration read from environment variables.
//!
//! | Variable                        | Default            |
//! |---------------------------------|--------------------|
//! | `PINGFOREST_DATA_FILE`          | `tree_data.json`   |
//! | `PINGFOREST_API_ADDR`           | `127.0.0.1:3000`   |
//! | `PINGFOREST_PING_TIMEOUT_MS`    | `1000`             |
//! | `PINGFOREST_PORT_TIMEOUT_MS`    | `2000`             |
//! | `PINGFOREST_WARNING_LATENCY_MS` | unset (no warning) |
//! | `PINGFOREST_EVENT_QUEUE`        | `64`               |
//! | `PINGFOREST_SEED_DEMO`          | `true`             |
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::engine::EngineSettings;
use crate::events::DEFAULT_QUEUE_CAPACITY;
use crate::node::LatencyPolicy;
use crate::probe::{DEFAULT_PING_TIMEOUT, DEFAULT_PORT_TIMEOUT};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid value for `{key}`: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_file: PathBuf,
    pub api_addr: String,
    pub ping_timeout: Duration,
    pub port_timeout: Duration,
    pub warning_latency_ms: Option<f64>,
    pub event_queue_capacity: usize,
    /// Populate an empty tree with a small demo group.
    pub seed_demo: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("tree_data.json"),
            api_addr: "127.0.0.1:3000".to_owned(),
            ping_timeout: DEFAULT_PING_TIMEOUT,
            port_timeout: DEFAULT_PORT_TIMEOUT,
            warning_latency_ms: None,
            event_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            seed_demo: true,
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] if a variable is set but cannot be
    /// parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps variable names to
    /// values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] if a variable is set but cannot be
    /// parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Config::default();
        if let Some(path) = lookup("PINGFOREST_DATA_FILE") {
            config.data_file = PathBuf::from(path);
        }
        if let Some(addr) = lookup("PINGFOREST_API_ADDR") {
            config.api_addr = addr;
        }
        if let Some(ms) = parse::<u64>(&lookup, "PINGFOREST_PING_TIMEOUT_MS", |ms| *ms > 0)? {
            config.ping_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse::<u64>(&lookup, "PINGFOREST_PORT_TIMEOUT_MS", |ms| *ms > 0)? {
            config.port_timeout = Duration::from_millis(ms);
        }
        config.warning_latency_ms = parse::<f64>(&lookup, "PINGFOREST_WARNING_LATENCY_MS", |ms| {
            ms.is_finite() && *ms >= 0.0
        })?;
        if let Some(capacity) = parse::<usize>(&lookup, "PINGFOREST_EVENT_QUEUE", |c| *c > 0)? {
            config.event_queue_capacity = capacity;
        }
        if let Some(seed) = parse::<bool>(&lookup, "PINGFOREST_SEED_DEMO", |_| true)? {
            config.seed_demo = seed;
        }

        Ok(config)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        let latency_policy = match self.warning_latency_ms {
            Some(threshold) => LatencyPolicy::with_warning_threshold(threshold),
            None => LatencyPolicy::disabled(),
        };
        EngineSettings {
            ping_timeout: self.ping_timeout,
            port_timeout: self.port_timeout,
            latency_policy,
            ..EngineSettings::default()
        }
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    valid: impl Fn(&T) -> bool,
) -> Result<Option<T>> {
    let Some(value) = lookup(key) else {
        return Ok(None);
    };
    match value.trim().parse::<T>() {
        Ok(parsed) if valid(&parsed) => Ok(Some(parsed)),
        _ => Err(Error::InvalidValue { key, value }),
    }
}
