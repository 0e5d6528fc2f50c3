//! Core types for the inheritance graph.

pub mod node;
pub mod edge;
pub mod closure;

pub use node::NodeId;
pub use edge::{DirectEdge, ClosureRow};
pub use closure::{
    NodeSet, NodeSetMap, AncestorMap,
    ClosureSnapshot, ClosureDelta, LinkChange,
};
