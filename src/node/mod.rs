//! Monitored entities and their observed state.
//!
//! A node is either a [`NodeKind::Group`], which only organizes other nodes,
//! or a [`NodeKind::Device`], which carries a network address, an optional TCP
//! port, and a polling interval. Devices additionally carry an
//! [`ObservedStatus`] that only the monitoring engine writes.
//!
//! # Key Components
//!
//! - [`NodeId`]: Opaque, never-reused identifier.
//! - [`Node`]: Snapshot of a registered node, as handed out by the registry.
//! - [`NewNode`]: A node (and optionally its descendants) to be registered.
//! - [`NodePatch`]: Editable fields for an existing node.
//! - [`LatencyPolicy`]: Transition from probe results to [`Status`].
use std::collections::BTreeSet;
use std::time::Duration;

mod error;
mod id;
mod status;

pub use error::{Error, Result};
pub use id::NodeId;
pub use status::{LatencyPolicy, ObservedStatus, ProbeReading, Status};

/// Polling interval used when none is configured.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Group,
    Device,
}

/// Seconds between two checks of a device. Always at least one second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct PollInterval(u64);

impl PollInterval {
    /// # Errors
    ///
    /// Returns [`Error::InvalidPollInterval`] if `secs` is zero.
    pub fn from_secs(secs: u64) -> Result<Self> {
        if secs == 0 {
            return Err(Error::InvalidPollInterval(secs));
        }
        Ok(Self(secs))
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.0)
    }
}

impl Default for PollInterval {
    fn default() -> Self {
        Self(DEFAULT_POLL_INTERVAL_SECS)
    }
}

impl TryFrom<u64> for PollInterval {
    type Error = Error;

    fn try_from(secs: u64) -> Result<Self> {
        Self::from_secs(secs)
    }
}

impl From<PollInterval> for u64 {
    fn from(interval: PollInterval) -> Self {
        interval.0
    }
}

/// Alerting configuration. The core stores it; only the alert sink reads it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub enabled: bool,
    pub threshold_count: u32,
    pub emails: BTreeSet<String>,
    pub interval_minutes: u64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold_count: 3,
            emails: BTreeSet::new(),
            interval_minutes: 30,
        }
    }
}

/// Snapshot of a registered node.
///
/// Snapshots are owned copies: later registry mutations never change a
/// snapshot that was already handed out.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub parent_id: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub address: String,
    pub port: Option<u16>,
    pub poll_interval: PollInterval,
    pub alert: AlertSettings,
    /// `Some` for devices, `None` for groups.
    pub status: Option<ObservedStatus>,
}

impl Node {
    pub fn is_device(&self) -> bool {
        self.kind == NodeKind::Device
    }

    /// The configured port, if port checks are enabled for this node.
    pub fn monitored_port(&self) -> Option<u16> {
        self.port.filter(|port| *port > 0)
    }

    /// Returns `true` if the node is a device with a non-empty address.
    pub fn is_monitored(&self) -> bool {
        self.is_device() && !self.address.trim().is_empty()
    }
}

/// A node to be registered, including any pre-populated descendants.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNode {
    /// Keeps an existing identity, e.g. when importing a persisted tree.
    pub id: Option<NodeId>,
    pub name: String,
    pub kind: NodeKind,
    pub address: String,
    pub port: Option<u16>,
    pub poll_interval: PollInterval,
    pub alert: AlertSettings,
    pub children: Vec<NewNode>,
}

impl NewNode {
    pub fn group(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Group)
    }

    pub fn device(name: impl Into<String>, address: impl Into<String>) -> Self {
        let mut node = Self::new(name, NodeKind::Device);
        node.address = address.into();
        node
    }

    fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: None,
            name: name.into(),
            kind,
            address: String::new(),
            port: None,
            poll_interval: PollInterval::default(),
            alert: AlertSettings::default(),
            children: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = Some(id);
        self
    }

    /// Enables port checks. A port of `0` disables them.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port).filter(|port| *port > 0);
        self
    }

    pub fn with_poll_interval(mut self, interval: PollInterval) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_alert(mut self, alert: AlertSettings) -> Self {
        self.alert = alert;
        self
    }

    pub fn with_child(mut self, child: NewNode) -> Self {
        self.children.push(child);
        self
    }
}

/// Editable fields of an existing node. `None` leaves a field untouched.
///
/// `port` distinguishes "leave as is" (`None`) from "disable port checks"
/// (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodePatch {
    pub name: Option<String>,
    pub address: Option<String>,
    #[serde(default, deserialize_with = "present_option")]
    pub port: Option<Option<u16>>,
    pub poll_interval: Option<PollInterval>,
    pub alert: Option<AlertSettings>,
}

impl NodePatch {
    /// Returns `true` if the patch sets a field that only devices carry.
    pub fn touches_device_fields(&self) -> bool {
        self.address.is_some() || self.port.is_some() || self.poll_interval.is_some()
    }

    /// Returns `true` if applying the patch changes what a worker probes.
    pub fn changes_target(&self, node: &Node) -> bool {
        let address_changed = self
            .address
            .as_ref()
            .is_some_and(|address| *address != node.address);
        let port_changed = self
            .port
            .is_some_and(|port| port.filter(|p| *p > 0) != node.monitored_port());
        address_changed || port_changed
    }
}

fn present_option<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::Deserialize<'de>,
{
    serde::Deserialize::deserialize(deserializer).map(Some)
}
