//! Edge and row types for the inheritance graph.

use serde::{Deserialize, Serialize};
use super::node::NodeId;

/// Direct link in the inheritance graph.
///
/// `child` inherits from `parent`. Implements `Ord` for deterministic
/// ordering: (child, parent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DirectEdge {
    /// Linked host or template.
    pub child: NodeId,
    /// Template being inherited from.
    pub parent: NodeId,
}

impl DirectEdge {
    /// Create a new direct edge.
    pub fn new(child: impl Into<NodeId>, parent: impl Into<NodeId>) -> Self {
        Self {
            child: child.into(),
            parent: parent.into(),
        }
    }

    /// Whether the edge links a node to itself.
    pub fn is_self_link(&self) -> bool {
        self.child == self.parent
    }
}

impl std::fmt::Display for DirectEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.child, self.parent)
    }
}

/// One persisted element of a node's ancestor set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClosureRow {
    /// Inheriting node.
    pub node: NodeId,
    /// Template reachable from `node`.
    pub ancestor: NodeId,
}

impl ClosureRow {
    /// Create a new closure row.
    pub fn new(node: impl Into<NodeId>, ancestor: impl Into<NodeId>) -> Self {
        Self {
            node: node.into(),
            ancestor: ancestor.into(),
        }
    }
}
