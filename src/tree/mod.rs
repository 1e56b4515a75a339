//! Canonical tree document model
//!
//! Every engine produces (or every adapter normalizes into) a single tree of
//! nodes rooted at the crawl seed. The visualizer reads the serialized form
//! of this tree, so the field set and ordering here are load-bearing:
//! `name, type, description, url, children`.

pub mod builder;
pub mod visit;

pub use builder::{NodeId, SharedTree, TreeBuilder};
pub use visit::VisitSet;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Node classification, a pure function of depth from the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Root,
    Category,
    Subcategory,
    Item,
}

impl NodeType {
    /// Derive the type tag from a node's depth: 0 → root, 1 → category,
    /// 2 → subcategory, 3+ → item.
    pub fn from_depth(depth: usize) -> Self {
        match depth {
            0 => Self::Root,
            1 => Self::Category,
            2 => Self::Subcategory,
            _ => Self::Item,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Category => "category",
            Self::Subcategory => "subcategory",
            Self::Item => "item",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node of the canonical document.
///
/// `children` is always serialized (the visualizer expects an array on every
/// node) but absent children are accepted on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub description: String,
    pub url: String,
    #[serde(default)]
    pub children: Vec<Node>,
}

impl Node {
    /// Create a leaf node with its type derived from `depth`.
    pub fn new(
        name: impl Into<String>,
        depth: usize,
        url: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            node_type: NodeType::from_depth(depth),
            description: description.into(),
            url: url.into(),
            children: Vec::new(),
        }
    }

    /// The empty-root document written on session reset.
    pub fn empty_root() -> Self {
        Self {
            name: String::new(),
            node_type: NodeType::Root,
            description: String::new(),
            url: String::new(),
            children: Vec::new(),
        }
    }

    /// Total node count, root included.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Node::count).sum::<usize>()
    }

    /// Walk the tree depth-first, visiting each node with its depth.
    pub fn walk(&self, f: &mut impl FnMut(&Node, usize)) {
        fn inner(node: &Node, depth: usize, f: &mut impl FnMut(&Node, usize)) {
            f(node, depth);
            for child in &node.children {
                inner(child, depth + 1, f);
            }
        }
        inner(self, 0, f);
    }
}
