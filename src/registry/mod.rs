//! In-memory store of the monitored node tree.
//!
//! Nodes live in a flat arena keyed by [`NodeId`]; the tree is expressed via
//! `parent_id` back-references and ordered `children` id lists. Every mutation
//! updates both views while holding a single write lock, so readers observe
//! either the state before or after a mutation, never a partially applied one
//! (e.g. a half-removed subtree).
//!
//! A registry opened with a [`TreeStore`] persists the full tree after every
//! structural mutation. Observed status writes are not persisted.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::ResultOkLogExt;
use crate::node::{NewNode, Node, NodeId, NodeKind, NodePatch, ObservedStatus};
use crate::persistence::TreeStore;

mod error;

pub use error::{Error, Result};

/// A node together with its nested descendants, in display order.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TreeNode {
    #[serde(flatten)]
    pub node: Node,
    #[serde(rename = "nodes")]
    pub children: Vec<TreeNode>,
}

#[derive(Debug, Default)]
struct Tree {
    nodes: HashMap<NodeId, Node>,
    roots: Vec<NodeId>,
}

impl Tree {
    fn get(&self, id: &NodeId) -> Result<&Node> {
        self.nodes.get(id).ok_or_else(|| Error::NotFound(id.clone()))
    }

    fn get_mut(&mut self, id: &NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.clone()))
    }

    /// Removes `id` from its parent's child list (or from the roots).
    fn detach(&mut self, id: &NodeId, parent_id: Option<&NodeId>) {
        let siblings = match parent_id.and_then(|parent| self.nodes.get_mut(parent)) {
            Some(parent) => &mut parent.children,
            None => &mut self.roots,
        };
        siblings.retain(|child| child != id);
    }

    fn attach(&mut self, id: NodeId, parent_id: Option<&NodeId>) {
        match parent_id.and_then(|parent| self.nodes.get_mut(parent)) {
            Some(parent) => parent.children.push(id),
            None => self.roots.push(id),
        }
    }

    /// Ids of `id` and all of its descendants, in pre-order.
    fn subtree(&self, id: &NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(&current) {
                stack.extend(node.children.iter().rev().cloned());
            }
            out.push(current);
        }
        out
    }

    fn preorder(&self) -> Vec<&Node> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<&NodeId> = self.roots.iter().rev().collect();
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get(id) {
                stack.extend(node.children.iter().rev());
                out.push(node);
            }
        }
        out
    }

    fn build(&self, id: &NodeId) -> Option<TreeNode> {
        let node = self.nodes.get(id)?;
        Some(TreeNode {
            node: node.clone(),
            children: node
                .children
                .iter()
                .filter_map(|child| self.build(child))
                .collect(),
        })
    }
}

/// Thread-safe node registry. Share it behind an [`Arc`].
#[derive(Default)]
pub struct Registry {
    tree: RwLock<Tree>,
    store: Option<Arc<dyn TreeStore>>,
    save_lock: Mutex<()>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("nodes", &self.len())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

impl Registry {
    /// Creates an empty registry without persistence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry populated from `store` that saves back to it after
    /// every structural mutation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Load`] if the store cannot be read and
    /// [`Error::DuplicateId`] if the persisted tree repeats an id.
    pub fn open(store: Arc<dyn TreeStore>) -> Result<Self> {
        let roots = store.load().map_err(Error::Load)?;
        let registry = Self::new();
        for root in roots {
            registry.insert(root, None)?;
        }
        log::debug!("Loaded {} nodes from persisted tree", registry.len());

        Ok(Self {
            store: Some(store),
            ..registry
        })
    }

    /// Registers `node` and all of its pre-populated descendants, either as a
    /// new root or as the last child of `parent_id`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if `parent_id` does not resolve.
    /// - [`Error::DuplicateId`] if a provided id is already registered or
    ///   repeated within `node`.
    pub fn add(&self, node: NewNode, parent_id: Option<&NodeId>) -> Result<NodeId> {
        let mut ids = self.add_subtree(node, parent_id)?;
        Ok(ids.swap_remove(0))
    }

    /// Like [`Registry::add`], but returns the ids of every registered node in
    /// pre-order, starting with the root of `node`.
    ///
    /// # Errors
    ///
    /// Same as [`Registry::add`].
    pub fn add_subtree(&self, node: NewNode, parent_id: Option<&NodeId>) -> Result<Vec<NodeId>> {
        let ids = self.insert(node, parent_id)?;
        self.persist();
        Ok(ids)
    }

    fn insert(&self, node: NewNode, parent_id: Option<&NodeId>) -> Result<Vec<NodeId>> {
        let mut flat = Vec::new();
        let id = flatten(node, parent_id.cloned(), &mut flat);
        let ids: Vec<NodeId> = flat.iter().map(|node| node.id.clone()).collect();

        let mut tree = self.tree.write();
        if let Some(parent_id) = parent_id {
            tree.get(parent_id)?;
        }
        {
            let mut seen = HashSet::with_capacity(flat.len());
            for node in &flat {
                if tree.nodes.contains_key(&node.id) || !seen.insert(&node.id) {
                    return Err(Error::DuplicateId(node.id.clone()));
                }
            }
        }

        tree.attach(id, parent_id);
        for node in flat {
            tree.nodes.insert(node.id.clone(), node);
        }

        Ok(ids)
    }

    /// Removes `id` together with its whole subtree.
    ///
    /// Returns the removed ids in pre-order, starting with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `id` is not registered.
    pub fn remove(&self, id: &NodeId) -> Result<Vec<NodeId>> {
        let removed = {
            let mut tree = self.tree.write();
            let parent_id = tree.get(id)?.parent_id.clone();
            tree.detach(id, parent_id.as_ref());
            let removed = tree.subtree(id);
            for node_id in &removed {
                tree.nodes.remove(node_id);
            }
            removed
        };
        self.persist();

        Ok(removed)
    }

    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `id` is not registered.
    pub fn get(&self, id: &NodeId) -> Result<Node> {
        self.tree.read().get(id).cloned()
    }

    /// Ids of `id` and all of its descendants, in pre-order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `id` is not registered.
    pub fn subtree_ids(&self, id: &NodeId) -> Result<Vec<NodeId>> {
        let tree = self.tree.read();
        tree.get(id)?;
        Ok(tree.subtree(id))
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.tree.read().nodes.contains_key(id)
    }

    /// Snapshot of all device nodes in tree order.
    pub fn list_devices(&self) -> Vec<Node> {
        self.tree
            .read()
            .preorder()
            .into_iter()
            .filter(|node| node.is_device())
            .cloned()
            .collect()
    }

    pub fn roots(&self) -> Vec<NodeId> {
        self.tree.read().roots.clone()
    }

    /// Snapshot of the full tree, including observed status.
    pub fn tree(&self) -> Vec<TreeNode> {
        let tree = self.tree.read();
        tree.roots.iter().filter_map(|id| tree.build(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.tree.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Applies `patch` to the editable fields of `id` and returns the updated
    /// node.
    ///
    /// Changing a device's address or port invalidates its observed status,
    /// which is reset to unknown.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if `id` is not registered.
    /// - [`Error::NotADevice`] if `id` is a group and the patch sets an
    ///   address, port or poll interval. Nothing is changed in that case.
    pub fn update_fields(&self, id: &NodeId, patch: NodePatch) -> Result<Node> {
        let updated = {
            let mut tree = self.tree.write();
            let node = tree.get_mut(id)?;
            if node.kind != NodeKind::Device && patch.touches_device_fields() {
                return Err(Error::NotADevice(id.clone()));
            }
            let reset_status = node.kind == NodeKind::Device && patch.changes_target(node);

            let NodePatch {
                name,
                address,
                port,
                poll_interval,
                alert,
            } = patch;
            if let Some(name) = name {
                node.name = name;
            }
            if let Some(address) = address {
                node.address = address;
            }
            if let Some(port) = port {
                node.port = port.filter(|port| *port > 0);
            }
            if let Some(poll_interval) = poll_interval {
                node.poll_interval = poll_interval;
            }
            if let Some(alert) = alert {
                node.alert = alert;
            }
            if reset_status {
                node.status = Some(ObservedStatus::default());
            }
            node.clone()
        };
        self.persist();

        Ok(updated)
    }

    /// Moves `id` (with its subtree) below `new_parent`, or to the roots.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if `id` or `new_parent` does not resolve.
    /// - [`Error::Cycle`] if `new_parent` is `id` itself or one of its
    ///   descendants.
    pub fn move_node(&self, id: &NodeId, new_parent: Option<&NodeId>) -> Result<()> {
        {
            let mut tree = self.tree.write();
            let old_parent = tree.get(id)?.parent_id.clone();
            if let Some(parent) = new_parent {
                let mut cursor = Some(tree.get(parent)?);
                while let Some(ancestor) = cursor {
                    if ancestor.id == *id {
                        return Err(Error::Cycle {
                            id: id.clone(),
                            parent: parent.clone(),
                        });
                    }
                    cursor = ancestor
                        .parent_id
                        .as_ref()
                        .and_then(|next| tree.nodes.get(next));
                }
            }

            tree.detach(id, old_parent.as_ref());
            tree.attach(id.clone(), new_parent);
            tree.get_mut(id)?.parent_id = new_parent.cloned();
        }
        self.persist();

        Ok(())
    }

    /// Stores the latest check result of a device.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the device was removed in the meantime.
    /// - [`Error::NotADevice`] if `id` refers to a group.
    pub fn record_status(&self, id: &NodeId, observed: ObservedStatus) -> Result<()> {
        let mut tree = self.tree.write();
        let node = tree.get_mut(id)?;
        if node.kind != NodeKind::Device {
            return Err(Error::NotADevice(id.clone()));
        }
        node.status = Some(observed);
        Ok(())
    }

    fn persist(&self) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let _guard = self.save_lock.lock();
        let tree = self.tree();
        store.save(&tree).ok_log();
    }
}

/// Assigns ids and flattens `node` into `out` in pre-order.
fn flatten(node: NewNode, parent_id: Option<NodeId>, out: &mut Vec<Node>) -> NodeId {
    let NewNode {
        id,
        name,
        kind,
        address,
        port,
        poll_interval,
        alert,
        children,
    } = node;
    let id = id.unwrap_or_else(NodeId::generate);
    let index = out.len();
    out.push(Node {
        id: id.clone(),
        name,
        kind,
        parent_id,
        children: Vec::with_capacity(children.len()),
        address,
        port: port.filter(|port| *port > 0),
        poll_interval,
        alert,
        status: (kind == NodeKind::Device).then(ObservedStatus::default),
    });
    for child in children {
        let child_id = flatten(child, Some(id.clone()), out);
        out[index].children.push(child_id);
    }
    id
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::node::{PollInterval, ProbeReading, Status};

    fn sample_tree(registry: &Registry) -> (NodeId, NodeId, NodeId) {
        let group = registry.add(NewNode::group("Database Servers"), None).unwrap();
        let d1 = registry
            .add(NewNode::device("DB-01", "127.0.0.1"), Some(&group))
            .unwrap();
        let d2 = registry
            .add(NewNode::device("DB-02", "192.168.99.99"), Some(&group))
            .unwrap();
        (group, d1, d2)
    }

    fn assert_consistent(registry: &Registry) {
        let tree = registry.tree.read();
        for node in tree.nodes.values() {
            match &node.parent_id {
                Some(parent) => {
                    let parent = tree.nodes.get(parent).expect("dangling parent");
                    assert_eq!(
                        parent.children.iter().filter(|c| **c == node.id).count(),
                        1
                    );
                }
                None => assert!(tree.roots.contains(&node.id)),
            }
            for child in &node.children {
                assert_eq!(
                    tree.nodes.get(child).unwrap().parent_id.as_ref(),
                    Some(&node.id)
                );
            }
        }
    }

    #[test]
    fn test_add_and_get() {
        let registry = Registry::new();
        let (group, d1, d2) = sample_tree(&registry);

        let group = registry.get(&group).unwrap();
        assert_eq!(group.kind, NodeKind::Group);
        assert_eq!(group.children, vec![d1.clone(), d2]);
        assert!(group.status.is_none());

        let d1 = registry.get(&d1).unwrap();
        assert_eq!(d1.parent_id.as_ref(), Some(&group.id));
        assert_eq!(d1.status, Some(ObservedStatus::default()));
        assert_consistent(&registry);
    }

    #[test]
    fn test_add_unknown_parent() {
        let registry = Registry::new();
        let missing = NodeId::generate();
        let err = registry
            .add(NewNode::device("d", "127.0.0.1"), Some(&missing))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(id) if id == missing));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_add_bulk_subtree() {
        let registry = Registry::new();
        let root = registry
            .add(
                NewNode::group("site")
                    .with_child(
                        NewNode::group("rack")
                            .with_child(NewNode::device("a", "10.0.0.1"))
                            .with_child(NewNode::device("b", "10.0.0.2").with_port(22)),
                    )
                    .with_child(NewNode::device("c", "10.0.0.3")),
                None,
            )
            .unwrap();

        assert_eq!(registry.len(), 5);
        let names: Vec<_> = registry
            .list_devices()
            .into_iter()
            .map(|node| node.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(registry.roots(), vec![root]);
        assert_consistent(&registry);
    }

    #[test]
    fn test_add_subtree_returns_ids_in_preorder() {
        let registry = Registry::new();
        let ids = registry
            .add_subtree(
                NewNode::group("site")
                    .with_child(NewNode::group("rack").with_child(NewNode::device("a", "10.0.0.1")))
                    .with_child(NewNode::device("b", "10.0.0.2")),
                None,
            )
            .unwrap();

        assert_eq!(ids.len(), 4);
        assert_eq!(registry.roots(), vec![ids[0].clone()]);
        assert_eq!(registry.subtree_ids(&ids[0]).unwrap(), ids);
        let names: Vec<_> = ids
            .iter()
            .map(|id| registry.get(id).unwrap().name)
            .collect();
        assert_eq!(names, vec!["site", "rack", "a", "b"]);
    }

    #[test]
    fn test_add_duplicate_id_is_rejected_atomically() {
        let registry = Registry::new();
        let id = NodeId::new("fixed").unwrap();
        registry
            .add(NewNode::group("g").with_id(id.clone()), None)
            .unwrap();

        let err = registry
            .add(
                NewNode::group("other")
                    .with_child(NewNode::device("dup", "10.0.0.1").with_id(id.clone())),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateId(dup) if dup == id));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.roots().len(), 1);
    }

    #[test]
    fn test_remove_cascades() {
        let registry = Registry::new();
        let (group, d1, d2) = sample_tree(&registry);
        let nested = registry
            .add(NewNode::device("nested", "10.0.0.9"), Some(&d1))
            .unwrap();
        let other = registry.add(NewNode::device("other", "10.0.0.10"), None).unwrap();

        let removed = registry.remove(&group).unwrap();
        assert_eq!(removed.len(), 4);
        assert_eq!(removed[0], group);
        for id in [&group, &d1, &d2, &nested] {
            assert!(matches!(registry.get(id), Err(Error::NotFound(_))));
        }
        let devices: Vec<_> = registry.list_devices().into_iter().map(|n| n.id).collect();
        assert_eq!(devices, vec![other.clone()]);
        assert_eq!(registry.roots(), vec![other]);
        assert_consistent(&registry);
    }

    #[test]
    fn test_remove_child_detaches_from_parent() {
        let registry = Registry::new();
        let (group, d1, d2) = sample_tree(&registry);
        registry.remove(&d1).unwrap();
        assert_eq!(registry.get(&group).unwrap().children, vec![d2]);
        assert!(matches!(registry.remove(&d1), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_snapshot_is_not_affected_by_later_mutation() {
        let registry = Registry::new();
        let (group, _, _) = sample_tree(&registry);
        let snapshot = registry.list_devices();
        registry.remove(&group).unwrap();
        assert_eq!(snapshot.len(), 2);
        assert!(registry.list_devices().is_empty());
    }

    #[test]
    fn test_update_fields_resets_status_on_target_change() {
        let registry = Registry::new();
        let (_, d1, _) = sample_tree(&registry);
        let observed = ObservedStatus {
            ping: ProbeReading {
                status: Status::Normal,
                latency_ms: 0.5,
            },
            port: ProbeReading::default(),
            last_checked_at: Some(time::OffsetDateTime::now_utc()),
        };
        registry.record_status(&d1, observed).unwrap();

        let renamed = registry
            .update_fields(
                &d1,
                NodePatch {
                    name: Some("DB-01 (local)".into()),
                    poll_interval: Some(PollInterval::from_secs(5).unwrap()),
                    ..NodePatch::default()
                },
            )
            .unwrap();
        assert_eq!(renamed.name, "DB-01 (local)");
        assert_eq!(renamed.poll_interval.as_secs(), 5);
        assert_eq!(renamed.status, Some(observed));

        let moved = registry
            .update_fields(
                &d1,
                NodePatch {
                    port: Some(Some(5432)),
                    ..NodePatch::default()
                },
            )
            .unwrap();
        assert_eq!(moved.port, Some(5432));
        assert_eq!(moved.status, Some(ObservedStatus::default()));
    }

    #[test]
    fn test_update_fields_unknown_id() {
        let registry = Registry::new();
        let err = registry
            .update_fields(&NodeId::generate(), NodePatch::default())
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_update_fields_rejects_device_fields_on_groups() {
        let registry = Registry::new();
        let (group, _, _) = sample_tree(&registry);

        for patch in [
            NodePatch {
                address: Some("10.0.0.1".into()),
                ..NodePatch::default()
            },
            NodePatch {
                port: Some(Some(22)),
                ..NodePatch::default()
            },
            NodePatch {
                poll_interval: Some(PollInterval::from_secs(5).unwrap()),
                ..NodePatch::default()
            },
        ] {
            let err = registry.update_fields(&group, patch).unwrap_err();
            assert!(matches!(err, Error::NotADevice(ref id) if *id == group));
        }

        let unchanged = registry.get(&group).unwrap();
        assert!(unchanged.address.is_empty());
        assert_eq!(unchanged.port, None);
        assert_eq!(unchanged.poll_interval, PollInterval::default());

        let renamed = registry
            .update_fields(
                &group,
                NodePatch {
                    name: Some("Databases".into()),
                    ..NodePatch::default()
                },
            )
            .unwrap();
        assert_eq!(renamed.name, "Databases");
    }

    #[test]
    fn test_move_node_and_cycle_detection() {
        let registry = Registry::new();
        let (group, d1, d2) = sample_tree(&registry);
        let other = registry.add(NewNode::group("other"), None).unwrap();

        registry.move_node(&d1, Some(&other)).unwrap();
        assert_eq!(registry.get(&other).unwrap().children, vec![d1.clone()]);
        assert_eq!(registry.get(&group).unwrap().children, vec![d2]);
        assert_eq!(registry.get(&d1).unwrap().parent_id, Some(other.clone()));

        let err = registry.move_node(&other, Some(&d1)).unwrap_err();
        assert!(matches!(err, Error::Cycle { .. }));
        let err = registry.move_node(&other, Some(&other)).unwrap_err();
        assert!(matches!(err, Error::Cycle { .. }));

        registry.move_node(&d1, None).unwrap();
        assert_eq!(registry.roots(), vec![group, other, d1]);
        assert_consistent(&registry);
    }

    #[test]
    fn test_record_status_errors() {
        let registry = Registry::new();
        let (group, d1, _) = sample_tree(&registry);
        assert!(matches!(
            registry.record_status(&group, ObservedStatus::default()),
            Err(Error::NotADevice(_))
        ));
        registry.remove(&d1).unwrap();
        assert!(matches!(
            registry.record_status(&d1, ObservedStatus::default()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_tree_snapshot_nests_children() {
        let registry = Registry::new();
        let (group, d1, d2) = sample_tree(&registry);
        let tree = registry.tree();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].node.id, group);
        let children: Vec<_> = tree[0].children.iter().map(|c| c.node.id.clone()).collect();
        assert_eq!(children, vec![d1, d2]);
    }

    #[test]
    fn test_concurrent_add_and_list() {
        let registry = Arc::new(Registry::new());
        let parents: Vec<NodeId> = (0..4)
            .map(|i| registry.add(NewNode::group(format!("g{i}")), None).unwrap())
            .collect();

        let writers: Vec<_> = parents
            .iter()
            .cloned()
            .map(|parent| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for i in 0..100 {
                        let device = NewNode::device(format!("d{i}"), "10.0.0.1");
                        let id = registry.add(device, Some(&parent)).unwrap();
                        if i % 10 == 0 {
                            registry.remove(&id).unwrap();
                        }
                    }
                })
            })
            .collect();
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..100 {
                        for device in registry.list_devices() {
                            let parent = device.parent_id.expect("devices have parents");
                            assert!(registry.get(&parent).is_ok());
                        }
                    }
                })
            })
            .collect();

        for handle in writers.into_iter().chain(readers) {
            handle.join().unwrap();
        }
        assert_eq!(registry.list_devices().len(), 4 * 90);
        assert_consistent(&registry);
    }
}
