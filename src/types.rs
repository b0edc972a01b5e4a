/// Core data types shared across the coordination layer.
///
/// This module defines the record format that `store`, `coordinator`, and
/// `reconciliation` all agree on. It intentionally carries no behavior
/// beyond ordering — the semantics of *when* a record wins live in the
/// coordinator and the anti-entropy pass, not here.
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A key in the store. Opaque, non-empty, treated as bytes for hashing.
pub type Key = String;

/// A node's stable identity, historically a TCP port. Doubles as the
/// network address: dialing a peer means connecting to `(host, NodeId)`.
pub type NodeId = u16;

/// The stored value for a key: a payload, its version, and a tombstone
/// flag. A record is never deleted outright — a delete replaces it with a
/// tombstone at a higher version (see spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// The payload, or `None` when `deleted` is true.
    pub value: Option<JsonValue>,
    /// Monotone non-negative version number; starts at 1 for the first write.
    pub version: u64,
    /// Tombstone flag.
    #[serde(default)]
    pub deleted: bool,
}

impl Record {
    /// Build a live record at the given version.
    pub fn live(value: JsonValue, version: u64) -> Self {
        Self {
            value: Some(value),
            version,
            deleted: false,
        }
    }

    /// Build a tombstone at the given version.
    pub fn tombstone(version: u64) -> Self {
        Self {
            value: None,
            version,
            deleted: true,
        }
    }

    /// `(version, deleted)` compared under the ordering from spec §3: higher
    /// version wins; at equal version, a tombstone wins over a live value.
    /// Used both by replica-apply (strict `>`) and by anti-entropy (`>=`
    /// with the tie broken by `deleted`).
    pub fn dominates(&self, other: &Record) -> bool {
        self.version > other.version || (self.version == other.version && self.deleted && !other.deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn higher_version_dominates() {
        let a = Record::live(json!("a"), 2);
        let b = Record::live(json!("b"), 1);
        assert!(a.dominates(&b));
        assert!(!b.dominates(&a));
    }

    #[test]
    fn tombstone_dominates_same_version_live_value() {
        let live = Record::live(json!("alive"), 5);
        let dead = Record::tombstone(5);
        assert!(dead.dominates(&live));
        assert!(!live.dominates(&dead));
    }

    #[test]
    fn equal_records_dominate_neither_way() {
        let a = Record::live(json!(1), 3);
        let b = Record::live(json!(1), 3);
        assert!(!a.dominates(&b));
        assert!(!b.dominates(&a));
    }

    #[test]
    fn record_serializes_with_default_deleted() {
        let json = serde_json::json!({"value": "x", "version": 1});
        let record: Record = serde_json::from_value(json).unwrap();
        assert!(!record.deleted);
    }
}
