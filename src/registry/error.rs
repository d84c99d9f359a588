use crate::node::NodeId;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("node `{0}` not found")]
    NotFound(NodeId),
    #[error("node id `{0}` is already registered")]
    DuplicateId(NodeId),
    #[error("moving node `{id}` below `{parent}` would create a cycle")]
    Cycle { id: NodeId, parent: NodeId },
    #[error("node `{0}` is not a device")]
    NotADevice(NodeId),
    #[error("failed to load persisted tree: {0}")]
    Load(#[source] crate::persistence::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
