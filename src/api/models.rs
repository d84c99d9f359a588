use crate::node::{AlertSettings, NewNode, NodeId, NodeKind, PollInterval};

/// Body of `POST /nodes`.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateNode {
    pub name: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub poll_interval: PollInterval,
    #[serde(default)]
    pub alert: AlertSettings,
}

impl CreateNode {
    /// Splits the request into the node to register and its parent.
    pub fn into_parts(self) -> (NewNode, Option<NodeId>) {
        let node = match self.kind {
            NodeKind::Group => NewNode::group(self.name),
            NodeKind::Device => NewNode::device(self.name, self.address),
        };
        let node = match self.port {
            Some(port) => node.with_port(port),
            None => node,
        };
        let node = node
            .with_poll_interval(self.poll_interval)
            .with_alert(self.alert);
        (node, self.parent_id)
    }
}

/// Body of `PUT /nodes/{id}/parent`. A missing parent moves the node to the
/// top level.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MoveNode {
    #[serde(default)]
    pub parent_id: Option<NodeId>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Created {
    pub id: NodeId,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Removed {
    pub removed: Vec<NodeId>,
}
