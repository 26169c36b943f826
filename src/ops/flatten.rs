use std::collections::{HashMap, HashSet};
use std::ops::Range;

use indexmap::IndexMap;

use crate::model::node::{FlatItem, TreeNode};

/// A flat list or nested tree that breaks the tree invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructuralError {
    #[error("item not found: {0}")]
    NotFound(String),
    #[error("duplicate item id: {0}")]
    DuplicateId(String),
    #[error("item {id} refers to missing parent {parent_id}")]
    DanglingParent { id: String, parent_id: String },
    #[error("item {id} has depth {depth}, expected {expected}")]
    DepthMismatch {
        id: String,
        depth: usize,
        expected: usize,
    },
    #[error("item {id} is its own ancestor")]
    Cycle { id: String },
    #[error("item {id} is not placed inside its parent's subtree")]
    OutOfOrder { id: String },
    #[error("expected exactly one root, found {0}")]
    RootCount(usize),
}

// ---------------------------------------------------------------------------
// Nested -> flat
// ---------------------------------------------------------------------------

/// Flatten a single-root tree in pre-order.
pub fn flatten(tree: &TreeNode) -> Vec<FlatItem> {
    flatten_forest(std::slice::from_ref(tree))
}

/// Flatten a list of top-level nodes in pre-order. Depth comes from the
/// recursion level, index from the sibling position.
pub fn flatten_forest(roots: &[TreeNode]) -> Vec<FlatItem> {
    let mut out = Vec::new();
    collect(roots, None, 0, &mut out);
    out
}

fn collect(nodes: &[TreeNode], parent_id: Option<&str>, depth: usize, out: &mut Vec<FlatItem>) {
    for (index, node) in nodes.iter().enumerate() {
        out.push(FlatItem {
            id: node.id.clone(),
            parent_id: parent_id.map(str::to_string),
            depth,
            index,
            collapsed: node.collapsed,
            value: node.value.clone(),
            done: node.done,
        });
        collect(&node.children, Some(&node.id), depth + 1, out);
    }
}

// ---------------------------------------------------------------------------
// Flat -> nested
// ---------------------------------------------------------------------------

/// Rebuild a single-root tree. Fails if the list has zero or several roots.
pub fn nest(items: &[FlatItem]) -> Result<TreeNode, StructuralError> {
    let mut roots = nest_forest(items)?;
    if roots.len() != 1 {
        return Err(StructuralError::RootCount(roots.len()));
    }
    Ok(roots.remove(0))
}

/// Rebuild the top-level nodes from a flat list.
///
/// Parents need not precede their children, but every parent must exist,
/// depths must agree with the parent chain and no id may be its own ancestor.
/// Sibling order is array order; stored `index` values are ignored.
pub fn nest_forest(items: &[FlatItem]) -> Result<Vec<TreeNode>, StructuralError> {
    check_links(items)?;

    let mut children: IndexMap<Option<&str>, Vec<&FlatItem>> = IndexMap::new();
    for item in items {
        children
            .entry(item.parent_id.as_deref())
            .or_default()
            .push(item);
    }
    Ok(build(None, &children))
}

fn build(parent: Option<&str>, children: &IndexMap<Option<&str>, Vec<&FlatItem>>) -> Vec<TreeNode> {
    let Some(kids) = children.get(&parent) else {
        return Vec::new();
    };
    kids.iter()
        .map(|item| TreeNode {
            id: item.id.clone(),
            value: item.value.clone(),
            done: item.done,
            collapsed: item.collapsed,
            children: build(Some(item.id.as_str()), children),
        })
        .collect()
}

/// Unique ids, existing parents, no cycles, consistent depths.
fn check_links(items: &[FlatItem]) -> Result<(), StructuralError> {
    let mut by_id: HashMap<&str, &FlatItem> = HashMap::with_capacity(items.len());
    for item in items {
        if by_id.insert(item.id.as_str(), item).is_some() {
            return Err(StructuralError::DuplicateId(item.id.clone()));
        }
    }

    for item in items {
        if let Some(parent_id) = &item.parent_id
            && !by_id.contains_key(parent_id.as_str())
        {
            return Err(StructuralError::DanglingParent {
                id: item.id.clone(),
                parent_id: parent_id.clone(),
            });
        }
    }

    // Walk each parent chain. A chain longer than the list must revisit a node.
    for item in items {
        let mut current = item.parent_id.as_deref();
        let mut steps = 0;
        while let Some(id) = current {
            if id == item.id || steps > items.len() {
                return Err(StructuralError::Cycle {
                    id: item.id.clone(),
                });
            }
            steps += 1;
            current = by_id.get(id).and_then(|p| p.parent_id.as_deref());
        }
    }

    for item in items {
        let expected = match &item.parent_id {
            None => 0,
            Some(parent_id) => by_id[parent_id.as_str()].depth + 1,
        };
        if item.depth != expected {
            return Err(StructuralError::DepthMismatch {
                id: item.id.clone(),
                depth: item.depth,
                expected,
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Flat list invariants
// ---------------------------------------------------------------------------

/// Check that `items` is a valid pre-order flat list: everything
/// `nest_forest` requires, plus each item sits inside its parent's
/// contiguous subtree.
pub fn validate(items: &[FlatItem]) -> Result<(), StructuralError> {
    check_links(items)?;

    // Path of open ancestors while scanning in order
    let mut path: Vec<&str> = Vec::new();
    for item in items {
        if item.depth > path.len() {
            return Err(StructuralError::OutOfOrder {
                id: item.id.clone(),
            });
        }
        path.truncate(item.depth);
        if path.last().copied() != item.parent_id.as_deref() {
            return Err(StructuralError::OutOfOrder {
                id: item.id.clone(),
            });
        }
        path.push(item.id.as_str());
    }
    Ok(())
}

/// Recompute every `index` from array position among items sharing a parent.
pub fn reindex(items: &mut [FlatItem]) {
    let mut next: HashMap<Option<String>, usize> = HashMap::new();
    for item in items.iter_mut() {
        let counter = next.entry(item.parent_id.clone()).or_insert(0);
        item.index = *counter;
        *counter += 1;
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Position of `id` in the flat list.
pub fn position(items: &[FlatItem], id: &str) -> Option<usize> {
    items.iter().position(|item| item.id == id)
}

/// The item at `idx` plus all of its descendants. In a valid pre-order list
/// this is the run of deeper items that follows it.
pub fn subtree_range(items: &[FlatItem], idx: usize) -> Range<usize> {
    let depth = items[idx].depth;
    let len = items[idx + 1..]
        .iter()
        .take_while(|item| item.depth > depth)
        .count();
    idx..idx + 1 + len
}

/// Ids of every descendant of the item at `idx`.
pub fn descendant_ids(items: &[FlatItem], idx: usize) -> HashSet<&str> {
    let range = subtree_range(items, idx);
    items[range.start + 1..range.end]
        .iter()
        .map(|item| item.id.as_str())
        .collect()
}

/// Number of direct children of `id` (or of the root when `None`).
pub fn child_count(items: &[FlatItem], parent_id: Option<&str>) -> usize {
    items
        .iter()
        .filter(|item| item.parent_id.as_deref() == parent_id)
        .count()
}

/// Items the user can see: descendants of collapsed items are hidden, and
/// with `hide_done` so are done items together with their subtrees.
pub fn visible_items(items: &[FlatItem], hide_done: bool) -> Vec<&FlatItem> {
    let mut out = Vec::with_capacity(items.len());
    // Depth of the nearest item whose descendants are hidden
    let mut hidden_below: Option<usize> = None;
    for item in items {
        if let Some(depth) = hidden_below {
            if item.depth > depth {
                continue;
            }
            hidden_below = None;
        }
        if hide_done && item.done {
            hidden_below = Some(item.depth);
            continue;
        }
        out.push(item);
        if item.collapsed {
            hidden_below = Some(item.depth);
        }
    }
    out
}
