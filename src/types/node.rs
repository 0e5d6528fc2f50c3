//! Node identifiers for the inheritance graph.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a host or a template.
///
/// Hosts and templates share one identifier space. Implements `Ord` so that
/// every set and map keyed by nodes iterates deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// Create a new NodeId.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw numeric id.
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Convert to the signed representation used by SQL `BIGINT` columns.
    pub fn to_i64(&self) -> i64 {
        self.0 as i64
    }

    /// Build from a SQL `BIGINT` column value.
    pub fn from_i64(value: i64) -> Self {
        Self(value as u64)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::str::FromStr for NodeId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}
