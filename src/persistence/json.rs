use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::fsutil;
use crate::node::NewNode;
use crate::registry::TreeNode;

use super::{Error, NodeRecord, Result, TreeStore};

/// Stores the tree as a pretty-printed JSON array of root records.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TreeStore for JsonFileStore {
    /// A missing file is an empty tree.
    fn load(&self) -> Result<Vec<NewNode>> {
        let reader = match fsutil::open_file_reader(&self.path) {
            Ok(reader) => reader,
            Err(err) if err.source.kind() == ErrorKind::NotFound => {
                log::info!("No tree file at `{}`, starting empty", self.path.display());
                return Ok(Vec::new());
            }
            Err(err) => {
                return Err(Error::Read {
                    path: err.path,
                    source: err.source,
                });
            }
        };

        let records: Vec<NodeRecord> =
            serde_json::from_reader(reader).map_err(|source| Error::Decode {
                path: self.path.clone(),
                source,
            })?;
        records.into_iter().map(NewNode::try_from).collect()
    }

    fn save(&self, roots: &[TreeNode]) -> Result<()> {
        let records: Vec<NodeRecord> = roots.iter().map(NodeRecord::from).collect();
        let contents = serde_json::to_vec_pretty(&records).map_err(Error::Encode)?;
        fsutil::write_atomic(&self.path, &contents).map_err(|err| Error::Write {
            path: err.path,
            source: err.source,
        })?;
        log::trace!("Saved {} root nodes to `{}`", records.len(), self.path.display());
        Ok(())
    }
}
