use crate::node::NodeId;

/// Unexpected faults inside a worker iteration. They are logged and the worker
/// carries on with its next check.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to record status for device `{id}`: {source}")]
    Record {
        id: NodeId,
        #[source]
        source: crate::registry::Error,
    },
    #[error("check for device `{id}` panicked")]
    Panicked { id: NodeId },
    #[error("check task for device `{id}` was cancelled")]
    Cancelled { id: NodeId },
}

pub type Result<T> = std::result::Result<T, Error>;
