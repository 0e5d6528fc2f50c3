//! Canonical serialization for deterministic hashing.
//!
//! Closure fingerprints are used to compare a stored closure relation with a
//! recomputed one without shipping both around.
//!
//! ## Determinism Guarantees
//!
//! - Stable field order: Struct fields serialize in declaration order
//! - Stable row order: closure rows are hashed sorted by (node, ancestor)
//! - No HashMap allowed: Use BTreeMap for maps in hashed data

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

use crate::types::NodeSetMap;
use crate::types::closure::map_to_rows;

/// Serialize a value to canonical JSON bytes for hashing.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("Canonical serialization failed")
}

/// Compute canonical hash of a serializable value.
pub fn canonical_hash<T: Serialize>(value: &T) -> u64 {
    let bytes = to_canonical_bytes(value);
    xxh64(&bytes, 0)
}

/// Compute canonical hash and return as hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> String {
    format!("{:016x}", canonical_hash(value))
}

/// Fingerprint of a closure relation (node -> ancestors).
///
/// Empty sets do not contribute, so `{a: {}}` and `{}` share a fingerprint.
pub fn closure_fingerprint(closure: &NodeSetMap) -> String {
    canonical_hash_hex(&map_to_rows(closure))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NodeId, NodeSet};

    fn closure(entries: &[(u64, &[u64])]) -> NodeSetMap {
        entries
            .iter()
            .map(|(node, ancestors)| {
                (NodeId::new(*node), ancestors.iter().copied().map(NodeId::new).collect())
            })
            .collect()
    }

    #[test]
    fn test_determinism() {
        let c = closure(&[(1, &[10, 20]), (10, &[20])]);
        assert_eq!(closure_fingerprint(&c), closure_fingerprint(&c.clone()));
    }

    #[test]
    fn test_fingerprint_ignores_empty_sets() {
        let mut c = closure(&[(1, &[10])]);
        let before = closure_fingerprint(&c);
        c.insert(NodeId::new(5), NodeSet::new());
        assert_eq!(closure_fingerprint(&c), before);
    }

    #[test]
    fn test_fingerprint_changes_with_rows() {
        let a = closure(&[(1, &[10])]);
        let b = closure(&[(1, &[10, 20])]);
        assert_ne!(closure_fingerprint(&a), closure_fingerprint(&b));
        assert_eq!(closure_fingerprint(&a).len(), 16);
    }
}
