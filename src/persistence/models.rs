use std::collections::BTreeSet;

use crate::node::{AlertSettings, NewNode, NodeId, NodeKind, PollInterval};
use crate::registry::TreeNode;

use super::Error;

/// On-disk representation of a node and its descendants.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NodeRecord {
    pub id: Option<NodeId>,
    pub name: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: NodeKind,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub port: Option<i64>,
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
    #[serde(default)]
    pub enable_email_alert: bool,
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold_count: u32,
    #[serde(default)]
    pub alert_emails: BTreeSet<String>,
    #[serde(default = "default_alert_interval")]
    pub alert_interval_minutes: u64,
    #[serde(default)]
    pub children: Vec<NodeRecord>,
}

fn default_kind() -> NodeKind {
    NodeKind::Device
}

fn default_check_interval() -> u64 {
    PollInterval::default().as_secs()
}

fn default_alert_threshold() -> u32 {
    AlertSettings::default().threshold_count
}

fn default_alert_interval() -> u64 {
    AlertSettings::default().interval_minutes
}

impl From<&TreeNode> for NodeRecord {
    fn from(tree: &TreeNode) -> Self {
        let node = &tree.node;
        Self {
            id: Some(node.id.clone()),
            name: node.name.clone(),
            kind: node.kind,
            ip_address: node.address.clone(),
            port: node.port.map(i64::from),
            check_interval_seconds: node.poll_interval.as_secs(),
            enable_email_alert: node.alert.enabled,
            alert_threshold_count: node.alert.threshold_count,
            alert_emails: node.alert.emails.clone(),
            alert_interval_minutes: node.alert.interval_minutes,
            children: tree.children.iter().map(NodeRecord::from).collect(),
        }
    }
}

impl TryFrom<NodeRecord> for NewNode {
    type Error = Error;

    /// Out-of-range ports (`<= 0` or above 65535) disable port checks, the same
    /// way an absent port does.
    fn try_from(record: NodeRecord) -> Result<Self, Self::Error> {
        let poll_interval = PollInterval::from_secs(record.check_interval_seconds).map_err(
            |source| Error::InvalidNode {
                name: record.name.clone(),
                source,
            },
        )?;
        let children = record
            .children
            .into_iter()
            .map(NewNode::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(NewNode {
            id: record.id,
            name: record.name,
            kind: record.kind,
            address: record.ip_address,
            port: record
                .port
                .and_then(|port| u16::try_from(port).ok())
                .filter(|port| *port > 0),
            poll_interval,
            alert: AlertSettings {
                enabled: record.enable_email_alert,
                threshold_count: record.alert_threshold_count,
                emails: record.alert_emails,
                interval_minutes: record.alert_interval_minutes,
            },
            children,
        })
    }
}
