use serde::{Deserialize, Serialize};

use super::node::FlatItem;
use super::snapshot::{Fingerprint, RemoteSnapshot};

/// Display preferences that travel with a tree's snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayPrefs {
    #[serde(default)]
    pub hide_done_items: bool,
    #[serde(default)]
    pub dark_mode: bool,
}

/// The state of one open tree. Owned by its session; replaced wholesale
/// when another tree is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeState {
    /// Pre-order flat list, always structurally valid
    pub items: Vec<FlatItem>,
    pub current_tree_id: String,
    pub current_tree_name: String,
    pub prefs: DisplayPrefs,
}

impl TreeState {
    /// An empty tree.
    pub fn new(tree_id: impl Into<String>, tree_name: impl Into<String>) -> Self {
        TreeState {
            items: Vec::new(),
            current_tree_id: tree_id.into(),
            current_tree_name: tree_name.into(),
            prefs: DisplayPrefs::default(),
        }
    }

    /// Serialize the current state for the remote store.
    pub fn to_snapshot(&self, revision: i64) -> RemoteSnapshot {
        RemoteSnapshot {
            items: self.items.clone(),
            hide_done_items: self.prefs.hide_done_items,
            dark_mode: self.prefs.dark_mode,
            current_tree_name: self.current_tree_name.clone(),
            revision,
        }
    }

    /// Fingerprint of what `to_snapshot` would produce.
    pub fn fingerprint(&self) -> Result<Fingerprint, serde_json::Error> {
        self.to_snapshot(0).fingerprint()
    }

    /// Replace items, name and prefs from an already validated snapshot.
    /// The tree id is kept: a snapshot never moves a tree.
    pub fn replace_from(&mut self, snapshot: RemoteSnapshot) {
        self.items = snapshot.items;
        self.current_tree_name = snapshot.current_tree_name;
        self.prefs = DisplayPrefs {
            hide_done_items: snapshot.hide_done_items,
            dark_mode: snapshot.dark_mode,
        };
    }

    pub fn find(&self, id: &str) -> Option<&FlatItem> {
        self.items.iter().find(|item| item.id == id)
    }
}
