use std::fmt;

use serde::{Deserialize, Serialize};

use super::node::FlatItem;

/// The serialized tree stored under `users/{account}/tree/{tree}`.
///
/// `revision` is the writer's clock in milliseconds. It is informational only;
/// conflicts resolve by whichever write reaches the store last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSnapshot {
    #[serde(default)]
    pub items: Vec<FlatItem>,
    #[serde(default)]
    pub hide_done_items: bool,
    #[serde(default)]
    pub dark_mode: bool,
    #[serde(default)]
    pub current_tree_name: String,
    #[serde(default)]
    pub revision: i64,
}

/// Everything in a snapshot except its revision.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotContent<'a> {
    items: &'a [FlatItem],
    hide_done_items: bool,
    dark_mode: bool,
    current_tree_name: &'a str,
}

impl RemoteSnapshot {
    /// Digest of the snapshot content, ignoring `revision`. Two snapshots
    /// with the same items, name and prefs have the same fingerprint.
    pub fn fingerprint(&self) -> Result<Fingerprint, serde_json::Error> {
        let content = SnapshotContent {
            items: &self.items,
            hide_done_items: self.hide_done_items,
            dark_mode: self.dark_mode,
            current_tree_name: &self.current_tree_name,
        };
        let bytes = serde_json::to_vec(&content)?;
        Ok(Fingerprint(blake3::hash(&bytes)))
    }
}

/// Content digest used to recognize this client's own writes when the
/// store echoes them back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(blake3::Hash);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 12 hex chars is plenty for logs
        let hex = self.0.to_hex();
        write!(f, "{}", &hex.as_str()[..12])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RemoteSnapshot {
        RemoteSnapshot {
            items: vec![FlatItem::root("1", "a"), FlatItem::child("2", "1", 1, "b")],
            hide_done_items: false,
            dark_mode: true,
            current_tree_name: "Groceries".into(),
            revision: 1_700_000_000_000,
        }
    }

    #[test]
    fn fingerprint_ignores_revision() {
        let a = sample();
        let mut b = sample();
        b.revision += 5_000;
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = sample();
        let mut b = sample();
        b.items[1].done = true;
        assert_ne!(a.fingerprint().unwrap(), b.fingerprint().unwrap());

        let mut c = sample();
        c.current_tree_name = "Errands".into();
        assert_ne!(a.fingerprint().unwrap(), c.fingerprint().unwrap());
    }

    #[test]
    fn parses_minimal_snapshot() {
        let snap: RemoteSnapshot = serde_json::from_str(r#"{"items":[]}"#).unwrap();
        assert!(snap.items.is_empty());
        assert_eq!(snap.current_tree_name, "");
        assert_eq!(snap.revision, 0);
    }

    #[test]
    fn fingerprint_display_is_short_hex() {
        let fp = sample().fingerprint().unwrap().to_string();
        assert_eq!(fp.len(), 12);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
