//! Keeping a tree convergent with the remote store.
//!
//! Snapshots travel as JSON documents keyed `users/{account}/tree/{tree}`.
//! Writes are full overwrites and the last one to reach the store wins.

pub mod debounce;
pub mod engine;
pub mod store;

use std::fmt;
use std::path::PathBuf;

use crate::io::lock::LockError;
use crate::model::snapshot::RemoteSnapshot;
use crate::ops::flatten::{flatten_forest, nest_forest, StructuralError};
use crate::ops::projection::DISCARD_ZONE_ID;

pub use debounce::Debounce;
pub use engine::{SyncEngine, SyncOutcome, SyncPhase};
pub use store::{FileStore, InboundEvent, MemoryStore, RemoteStore, Subscription};

/// Store and transport failures. All are recoverable: local state is kept.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("invalid store key segment {0:?}")]
    InvalidKey(String),
    #[error("could not read {key}: {source}")]
    Read {
        key: String,
        source: std::io::Error,
    },
    #[error("could not write {key}: {source}")]
    Write {
        key: String,
        source: std::io::Error,
    },
    #[error("could not watch {path}: {source}")]
    Watch {
        path: PathBuf,
        source: notify::Error,
    },
    #[error("could not serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Lock(#[from] LockError),
}

/// An inbound document that cannot be applied.
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("snapshot is not a valid tree: {0}")]
    Invalid(#[from] StructuralError),
    #[error("snapshot uses the reserved item id {0:?}")]
    ReservedId(String),
}

/// Location of one tree in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey {
    account: String,
    tree: String,
}

impl StoreKey {
    pub fn new(account: &str, tree: &str) -> Result<Self, SyncError> {
        for segment in [account, tree] {
            if segment.is_empty() || segment.contains('/') || segment.contains("..") {
                return Err(SyncError::InvalidKey(segment.to_string()));
            }
        }
        Ok(StoreKey {
            account: account.to_string(),
            tree: tree.to_string(),
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn tree(&self) -> &str {
        &self.tree
    }

    /// Prefix shared by every tree of an account.
    pub fn account_prefix(account: &str) -> String {
        format!("users/{account}/tree/")
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "users/{}/tree/{}", self.account, self.tree)
    }
}

/// Parse and validate an inbound document. Items are re-nested and
/// flattened again, so stale `index` values and a parent/child order that
/// is merely out of place are normalized; broken links are rejected.
pub fn decode_snapshot(raw: &str) -> Result<RemoteSnapshot, SerializationError> {
    let mut snapshot: RemoteSnapshot = serde_json::from_str(raw)?;
    if snapshot.items.iter().any(|item| item.id == DISCARD_ZONE_ID) {
        return Err(SerializationError::ReservedId(DISCARD_ZONE_ID.to_string()));
    }
    let forest = nest_forest(&snapshot.items)?;
    snapshot.items = flatten_forest(&forest);
    Ok(snapshot)
}

pub fn encode_snapshot(snapshot: &RemoteSnapshot) -> Result<String, SyncError> {
    Ok(serde_json::to_string_pretty(snapshot)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::node::FlatItem;

    #[test]
    fn key_formats_as_path() {
        let key = StoreKey::new("u1", "t1").unwrap();
        assert_eq!(key.to_string(), "users/u1/tree/t1");
        assert_eq!(StoreKey::account_prefix("u1"), "users/u1/tree/");
    }

    #[test]
    fn key_rejects_bad_segments() {
        for (account, tree) in [("", "t"), ("u", ""), ("a/b", "t"), ("u", "..")] {
            assert!(
                matches!(StoreKey::new(account, tree), Err(SyncError::InvalidKey(_))),
                "{account:?}/{tree:?} accepted"
            );
        }
    }

    #[test]
    fn decode_normalizes_indices() {
        let raw = r#"{
            "items": [
                {"id": "1", "parentId": null, "depth": 0, "index": 7, "value": "a", "done": false},
                {"id": "2", "parentId": "1", "depth": 1, "index": 3, "value": "b", "done": true}
            ],
            "hideDoneItems": true,
            "darkMode": false,
            "currentTreeName": "Work"
        }"#;
        let snapshot = decode_snapshot(raw).unwrap();
        assert_eq!(snapshot.items[0].index, 0);
        assert_eq!(snapshot.items[1].index, 0);
        assert!(snapshot.items[1].done);
        assert!(snapshot.hide_done_items);
        assert_eq!(snapshot.current_tree_name, "Work");
        assert_eq!(snapshot.revision, 0);
    }

    #[test]
    fn decode_rejects_dangling_parent() {
        let raw = r#"{"items": [{"id": "2", "parentId": "ghost", "depth": 1}]}"#;
        let err = decode_snapshot(raw).unwrap_err();
        assert!(matches!(
            err,
            SerializationError::Invalid(StructuralError::DanglingParent { .. })
        ));
    }

    #[test]
    fn decode_rejects_discard_zone_item() {
        let raw = r#"{"items": [
            {"id": "trash", "parentId": null, "depth": 0},
            {"id": "1", "parentId": "trash", "depth": 1, "value": "hidden"}
        ]}"#;
        assert!(matches!(
            decode_snapshot(raw),
            Err(SerializationError::ReservedId(id)) if id == "trash"
        ));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            decode_snapshot("not json"),
            Err(SerializationError::Json(_))
        ));
    }

    #[test]
    fn encode_then_decode_keeps_items() {
        let snapshot = RemoteSnapshot {
            items: vec![FlatItem::root("1", "a"), FlatItem::child("2", "1", 1, "b")],
            hide_done_items: false,
            dark_mode: true,
            current_tree_name: String::new(),
            revision: 42,
        };
        let raw = encode_snapshot(&snapshot).unwrap();
        assert_eq!(decode_snapshot(&raw).unwrap(), snapshot);
    }
}
