//! Arena-backed tree construction
//!
//! The crawl workers grow the session tree one attachment at a time. Nodes
//! live in a flat arena indexed by monotonic ids so "attach child under
//! parent-id" and "mark failure on node-id" are O(1) and never touch
//! unrelated subtrees. `snapshot` materializes the serializable [`Node`]
//! tree for the publisher.

use std::sync::{Arc, Mutex};

use super::{Node, NodeType};

/// Opaque handle to a node in a [`TreeBuilder`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug)]
struct Slot {
    name: String,
    url: String,
    description: String,
    depth: usize,
    children: Vec<usize>,
}

/// The evolving session tree. Single-threaded; see [`SharedTree`] for the
/// concurrent wrapper the workers use.
#[derive(Debug)]
pub struct TreeBuilder {
    nodes: Vec<Slot>,
    root_relabeled: bool,
}

impl TreeBuilder {
    /// Create a tree containing only the root node.
    pub fn new(seed_url: &str, seed_name: &str) -> Self {
        Self {
            nodes: vec![Slot {
                name: seed_name.to_string(),
                url: seed_url.to_string(),
                description: format!("URL: {seed_url}"),
                depth: 0,
                children: Vec::new(),
            }],
            root_relabeled: false,
        }
    }

    pub fn root_id(&self) -> NodeId {
        NodeId(0)
    }

    /// Append a child under `parent`. The node's type is derived from
    /// `depth` at snapshot time; ids are assigned monotonically.
    pub fn attach(&mut self, parent: NodeId, url: &str, name: &str, depth: usize) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Slot {
            name: name.to_string(),
            url: url.to_string(),
            description: format!("URL: {url}"),
            depth,
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        NodeId(id)
    }

    /// Rewrite a node in place to record a failed fetch. The node keeps its
    /// position, depth-derived type, and attempted URL.
    pub fn mark_failure(&mut self, id: NodeId, reason: &str, detail: &str) {
        let slot = &mut self.nodes[id.0];
        slot.name = format!("Error: {reason}");
        slot.description = detail.to_string();
    }

    /// Relabel the root with the fetched page title. Allowed once; later
    /// calls are ignored.
    pub fn set_root_name(&mut self, name: &str) {
        if !self.root_relabeled && !name.is_empty() {
            self.nodes[0].name = name.to_string();
            self.root_relabeled = true;
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Deep copy into the serializable document form.
    pub fn snapshot(&self) -> Node {
        self.build_node(0)
    }

    fn build_node(&self, idx: usize) -> Node {
        let slot = &self.nodes[idx];
        Node {
            name: slot.name.clone(),
            node_type: NodeType::from_depth(slot.depth),
            description: slot.description.clone(),
            url: slot.url.clone(),
            children: slot.children.iter().map(|&c| self.build_node(c)).collect(),
        }
    }
}

/// Thread-safe handle over a [`TreeBuilder`].
///
/// One writer critical section per attach; `snapshot` takes the same lock so
/// readers always observe a consistent tree.
#[derive(Debug, Clone)]
pub struct SharedTree {
    inner: Arc<Mutex<TreeBuilder>>,
}

impl SharedTree {
    pub fn new(seed_url: &str, seed_name: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TreeBuilder::new(seed_url, seed_name))),
        }
    }

    pub fn root_id(&self) -> NodeId {
        self.lock().root_id()
    }

    pub fn attach(&self, parent: NodeId, url: &str, name: &str, depth: usize) -> NodeId {
        self.lock().attach(parent, url, name, depth)
    }

    pub fn mark_failure(&self, id: NodeId, reason: &str, detail: &str) {
        self.lock().mark_failure(id, reason, detail);
    }

    pub fn set_root_name(&self, name: &str) {
        self.lock().set_root_name(name);
    }

    pub fn snapshot(&self) -> Node {
        self.lock().snapshot()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TreeBuilder> {
        // A worker panicking mid-attach leaves nothing half-written: every
        // mutation is a push or a field overwrite, so the tree stays usable.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
