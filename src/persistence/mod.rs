//! Serialization of the node tree.
//!
//! The registry hands the full tree to a [`TreeStore`] after every structural
//! mutation and asks it for the initial tree at startup. Observed status is
//! never persisted; a reloaded tree starts with every device unknown.
mod error;
mod json;
mod models;

pub use error::{Error, Result};
pub use json::JsonFileStore;
pub use models::NodeRecord;

use crate::node::NewNode;
use crate::registry::TreeNode;

/// Loads and saves the full node tree.
///
/// Implementations must be idempotent: saving a tree and loading it again
/// yields the same structure and device configuration.
pub trait TreeStore: Send + Sync {
    fn load(&self) -> Result<Vec<NewNode>>;

    fn save(&self, roots: &[TreeNode]) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod memory {
    use parking_lot::Mutex;

    use super::*;

    /// Keeps the serialized records in memory.
    #[derive(Debug, Default)]
    pub(crate) struct MemoryStore {
        pub(crate) records: Mutex<Vec<NodeRecord>>,
        pub(crate) saves: Mutex<usize>,
    }

    impl TreeStore for MemoryStore {
        fn load(&self) -> Result<Vec<NewNode>> {
            self.records
                .lock()
                .iter()
                .cloned()
                .map(NewNode::try_from)
                .collect()
        }

        fn save(&self, roots: &[TreeNode]) -> Result<()> {
            *self.records.lock() = roots.iter().map(NodeRecord::from).collect();
            *self.saves.lock() += 1;
            Ok(())
        }
    }
}
