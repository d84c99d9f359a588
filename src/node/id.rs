use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use super::{Error, Result};

/// The maximum allowed length for a [`NodeId`].
const NODE_ID_MAX_LEN: usize = 255;

/// An opaque, process-unique node identifier.
///
/// Freshly created nodes receive a random v4 UUID, so an id is never handed out
/// twice even after the node it named has been removed. Ids loaded from a
/// persisted tree keep their original value.
///
/// # Examples
///
/// ```
/// # use pingforest::node::NodeId;
/// let id = NodeId::new("6f1c1f0e-2a3b-4c5d-8e9f-001122334455").unwrap();
/// assert_eq!(id.as_ref(), "6f1c1f0e-2a3b-4c5d-8e9f-001122334455");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(Arc<str>);

impl NodeId {
    /// Creates a `NodeId` from an existing identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidNodeId`] if the input is empty, only whitespace,
    /// or longer than [`NODE_ID_MAX_LEN`].
    pub fn new(src: impl AsRef<str>) -> Result<Self> {
        let src = src.as_ref();
        if src.trim().is_empty() || src.len() > NODE_ID_MAX_LEN {
            return Err(Error::InvalidNodeId(src.to_owned()));
        }

        Ok(Self(src.into()))
    }

    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string().into())
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl serde::Serialize for NodeId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NodeId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NodeId::new(raw).map_err(serde::de::Error::custom)
    }
}
