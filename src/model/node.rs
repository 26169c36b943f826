use serde::{Deserialize, Serialize};

/// A task in nested form. Children are owned by their parent, in display order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    /// Stable identifier, unique within a tree
    pub id: String,
    /// Task text
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub done: bool,
    /// UI-only: children are hidden from the visible list
    #[serde(default, skip_serializing_if = "is_false")]
    pub collapsed: bool,
    #[serde(default)]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Create a leaf node that is not done.
    pub fn new(id: impl Into<String>, value: impl Into<String>) -> Self {
        TreeNode {
            id: id.into(),
            value: value.into(),
            done: false,
            collapsed: false,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<TreeNode>) -> Self {
        self.children = children;
        self
    }

    pub fn with_done(mut self, done: bool) -> Self {
        self.done = done;
        self
    }

    pub fn with_collapsed(mut self, collapsed: bool) -> Self {
        self.collapsed = collapsed;
        self
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn subtree_size(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(TreeNode::subtree_size)
            .sum::<usize>()
    }
}

// `collapsed` is view state, not payload.
impl PartialEq for TreeNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.value == other.value
            && self.done == other.done
            && self.children == other.children
    }
}

impl Eq for TreeNode {}

/// A task in linearized form: one entry of a pre-order traversal,
/// annotated with its parent, depth and sibling position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatItem {
    pub id: String,
    /// `None` for top-level items
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Nesting depth (0 = top-level)
    pub depth: usize,
    /// Position among siblings, 0-based
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub collapsed: bool,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub done: bool,
}

impl FlatItem {
    /// A top-level leaf, mostly useful for building lists by hand.
    pub fn root(id: impl Into<String>, value: impl Into<String>) -> Self {
        FlatItem {
            id: id.into(),
            parent_id: None,
            depth: 0,
            index: 0,
            collapsed: false,
            value: value.into(),
            done: false,
        }
    }

    /// A leaf under `parent_id` at `depth`.
    pub fn child(
        id: impl Into<String>,
        parent_id: impl Into<String>,
        depth: usize,
        value: impl Into<String>,
    ) -> Self {
        FlatItem {
            parent_id: Some(parent_id.into()),
            depth,
            ..FlatItem::root(id, value)
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}
