use tracing::debug;
use uuid::Uuid;

use crate::model::node::FlatItem;
use crate::ops::flatten::{
    child_count, position, reindex, subtree_range, validate, StructuralError,
};
use crate::ops::projection::{DropTarget, Projection, DISCARD_ZONE_ID};

/// Error type for tree operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error(transparent)]
    Structural(#[from] StructuralError),
    /// Moving a subtree under itself
    #[error("cannot move {id} under {target}: it is inside the moved subtree")]
    Cycle { id: String, target: String },
    #[error("the discard zone cannot hold items")]
    DiscardZoneParent,
}

impl TreeError {
    fn not_found(id: &str) -> Self {
        TreeError::Structural(StructuralError::NotFound(id.to_string()))
    }
}

fn check_parent(parent_id: Option<&str>) -> Result<(), TreeError> {
    match parent_id {
        Some(DISCARD_ZONE_ID) => Err(TreeError::DiscardZoneParent),
        _ => Ok(()),
    }
}

// Every operation takes the current list and returns a new one. The input is
// never modified, so a failed operation leaves the caller's state untouched.

// ---------------------------------------------------------------------------
// Structural edits
// ---------------------------------------------------------------------------

/// Move the subtree rooted at `id` to `target`. Descendants keep their
/// relative depth. An index past the end of the parent's children appends.
pub fn move_subtree(
    items: &[FlatItem],
    id: &str,
    target: &DropTarget,
) -> Result<Vec<FlatItem>, TreeError> {
    check_parent(target.parent_id.as_deref())?;
    let pos = position(items, id).ok_or_else(|| TreeError::not_found(id))?;
    let range = subtree_range(items, pos);

    if let Some(parent_id) = &target.parent_id
        && items[range.clone()].iter().any(|item| &item.id == parent_id)
    {
        return Err(TreeError::Cycle {
            id: id.to_string(),
            target: parent_id.clone(),
        });
    }

    let mut block = items[range.clone()].to_vec();
    let mut rest = Vec::with_capacity(items.len());
    rest.extend_from_slice(&items[..range.start]);
    rest.extend_from_slice(&items[range.end..]);

    let expected = match &target.parent_id {
        None => 0,
        Some(parent_id) => {
            let parent = rest
                .iter()
                .find(|item| &item.id == parent_id)
                .ok_or_else(|| TreeError::not_found(parent_id))?;
            parent.depth + 1
        }
    };
    if target.depth != expected {
        return Err(StructuralError::DepthMismatch {
            id: id.to_string(),
            depth: target.depth,
            expected,
        }
        .into());
    }

    let root_depth = block[0].depth;
    for item in &mut block {
        item.depth = item.depth - root_depth + target.depth;
    }
    block[0].parent_id = target.parent_id.clone();

    let at = insertion_point(&rest, target.parent_id.as_deref(), target.index)?;
    debug!(id, at, depth = target.depth, "moving subtree");
    rest.splice(at..at, block);
    finish(rest)
}

/// Make `id` the last child of its previous sibling. Without a previous
/// sibling the list is returned unchanged.
pub fn indent(items: &[FlatItem], id: &str) -> Result<Vec<FlatItem>, TreeError> {
    let pos = position(items, id).ok_or_else(|| TreeError::not_found(id))?;
    let depth = items[pos].depth;

    let sibling_above = items[..pos]
        .iter()
        .rev()
        .take_while(|item| item.depth >= depth)
        .find(|item| item.depth == depth);
    let Some(sibling) = sibling_above else {
        return Ok(items.to_vec());
    };

    let target = DropTarget {
        parent_id: Some(sibling.id.clone()),
        depth: sibling.depth + 1,
        index: child_count(items, Some(&sibling.id)),
    };
    move_subtree(items, id, &target)
}

/// Make `id` the sibling right after its parent. Top-level items are
/// returned unchanged.
pub fn outdent(items: &[FlatItem], id: &str) -> Result<Vec<FlatItem>, TreeError> {
    let pos = position(items, id).ok_or_else(|| TreeError::not_found(id))?;
    let Some(parent_id) = items[pos].parent_id.as_deref() else {
        return Ok(items.to_vec());
    };
    let parent_pos = position(items, parent_id).ok_or_else(|| TreeError::not_found(parent_id))?;
    let parent = &items[parent_pos];

    let target = DropTarget {
        parent_id: parent.parent_id.clone(),
        depth: parent.depth,
        index: sibling_index(items, parent_pos) + 1,
    };
    move_subtree(items, id, &target)
}

/// Delete `id` and all of its descendants.
pub fn remove_subtree(items: &[FlatItem], id: &str) -> Result<Vec<FlatItem>, TreeError> {
    let pos = position(items, id).ok_or_else(|| TreeError::not_found(id))?;
    let range = subtree_range(items, pos);
    debug!(id, removed = range.len(), "removing subtree");
    let mut out = items.to_vec();
    out.drain(range);
    finish(out)
}

/// Delete every done item together with its subtree.
pub fn remove_done(items: &[FlatItem]) -> Result<Vec<FlatItem>, TreeError> {
    let mut out = Vec::with_capacity(items.len());
    let mut skip_below: Option<usize> = None;
    for item in items {
        if let Some(depth) = skip_below {
            if item.depth > depth {
                continue;
            }
            skip_below = None;
        }
        if item.done {
            skip_below = Some(item.depth);
            continue;
        }
        out.push(item.clone());
    }
    finish(out)
}

/// Insert a new, not-done leaf under `parent_id` at `index`. Returns the
/// new list and the generated id.
pub fn insert_item(
    items: &[FlatItem],
    parent_id: Option<&str>,
    index: usize,
    value: impl Into<String>,
) -> Result<(Vec<FlatItem>, String), TreeError> {
    check_parent(parent_id)?;
    let depth = match parent_id {
        None => 0,
        Some(pid) => {
            let parent = items
                .iter()
                .find(|item| item.id == pid)
                .ok_or_else(|| TreeError::not_found(pid))?;
            parent.depth + 1
        }
    };
    let id = Uuid::new_v4().to_string();
    let item = FlatItem {
        id: id.clone(),
        parent_id: parent_id.map(str::to_string),
        depth,
        index,
        collapsed: false,
        value: value.into(),
        done: false,
    };
    let at = insertion_point(items, parent_id, index)?;
    let mut out = items.to_vec();
    out.insert(at, item);
    Ok((finish(out)?, id))
}

/// Commit a finished drag.
pub fn apply_drop(
    items: &[FlatItem],
    active_id: &str,
    projection: &Projection,
) -> Result<Vec<FlatItem>, TreeError> {
    match projection {
        Projection::Move(target) => move_subtree(items, active_id, target),
        Projection::Discard => remove_subtree(items, active_id),
        Projection::NoOp => Ok(items.to_vec()),
    }
}

// ---------------------------------------------------------------------------
// Payload edits
// ---------------------------------------------------------------------------

pub fn set_done(items: &[FlatItem], id: &str, done: bool) -> Result<Vec<FlatItem>, TreeError> {
    edit_item(items, id, |item| item.done = done)
}

pub fn set_value(
    items: &[FlatItem],
    id: &str,
    value: impl Into<String>,
) -> Result<Vec<FlatItem>, TreeError> {
    let value = value.into();
    edit_item(items, id, move |item| item.value = value)
}

pub fn toggle_collapsed(items: &[FlatItem], id: &str) -> Result<Vec<FlatItem>, TreeError> {
    edit_item(items, id, |item| item.collapsed = !item.collapsed)
}

fn edit_item(
    items: &[FlatItem],
    id: &str,
    f: impl FnOnce(&mut FlatItem),
) -> Result<Vec<FlatItem>, TreeError> {
    let pos = position(items, id).ok_or_else(|| TreeError::not_found(id))?;
    let mut out = items.to_vec();
    f(&mut out[pos]);
    Ok(out)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Flat position at which the `index`-th child of `parent_id` starts.
/// Past the last child this is the end of the parent's subtree.
fn insertion_point(
    items: &[FlatItem],
    parent_id: Option<&str>,
    index: usize,
) -> Result<usize, TreeError> {
    let (start, end, child_depth) = match parent_id {
        None => (0, items.len(), 0),
        Some(pid) => {
            let pos = position(items, pid).ok_or_else(|| TreeError::not_found(pid))?;
            let range = subtree_range(items, pos);
            (pos + 1, range.end, items[pos].depth + 1)
        }
    };

    let mut seen = 0;
    for (i, item) in items.iter().enumerate().take(end).skip(start) {
        if item.depth == child_depth {
            if seen == index {
                return Ok(i);
            }
            seen += 1;
        }
    }
    Ok(end)
}

/// Position of the item at `pos` among its siblings.
fn sibling_index(items: &[FlatItem], pos: usize) -> usize {
    let parent_id = items[pos].parent_id.as_deref();
    items[..pos]
        .iter()
        .filter(|item| item.parent_id.as_deref() == parent_id)
        .count()
}

fn finish(mut items: Vec<FlatItem>) -> Result<Vec<FlatItem>, TreeError> {
    reindex(&mut items);
    validate(&items)?;
    Ok(items)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::node::TreeNode;
    use crate::ops::flatten::flatten_forest;
    use pretty_assertions::assert_eq;

    // 1
    //   2
    //   3
    //     4
    // 5
    fn sample() -> Vec<FlatItem> {
        flatten_forest(&[
            TreeNode::new("1", "one").with_children(vec![
                TreeNode::new("2", "two"),
                TreeNode::new("3", "three").with_children(vec![TreeNode::new("4", "four")]),
            ]),
            TreeNode::new("5", "five"),
        ])
    }

    /// (id, parent, depth) for each item, in order
    fn shape(items: &[FlatItem]) -> Vec<(String, Option<String>, usize)> {
        items
            .iter()
            .map(|i| (i.id.clone(), i.parent_id.clone(), i.depth))
            .collect()
    }

    fn row(id: &str, parent: Option<&str>, depth: usize) -> (String, Option<String>, usize) {
        (id.to_string(), parent.map(str::to_string), depth)
    }

    fn to(parent: Option<&str>, depth: usize, index: usize) -> DropTarget {
        DropTarget {
            parent_id: parent.map(str::to_string),
            depth,
            index,
        }
    }

    // --- move ---

    #[test]
    fn move_subtree_carries_descendants() {
        let items = sample();
        let moved = move_subtree(&items, "3", &to(Some("5"), 1, 0)).unwrap();
        assert_eq!(
            shape(&moved),
            vec![
                row("1", None, 0),
                row("2", Some("1"), 1),
                row("5", None, 0),
                row("3", Some("5"), 1),
                row("4", Some("3"), 2),
            ]
        );
    }

    #[test]
    fn move_subtree_shifts_depth_by_root_delta() {
        let moved = move_subtree(&sample(), "3", &to(None, 0, 0)).unwrap();
        assert_eq!(
            shape(&moved),
            vec![
                row("3", None, 0),
                row("4", Some("3"), 1),
                row("1", None, 0),
                row("2", Some("1"), 1),
                row("5", None, 0),
            ]
        );
        let indices: Vec<usize> = moved.iter().map(|i| i.index).collect();
        assert_eq!(indices, vec![0, 0, 1, 0, 2]);
    }

    #[test]
    fn move_index_past_end_appends() {
        let moved = move_subtree(&sample(), "5", &to(Some("1"), 1, 99)).unwrap();
        assert_eq!(moved.last().unwrap().id, "5");
        assert_eq!(moved.last().unwrap().parent_id.as_deref(), Some("1"));
    }

    #[test]
    fn move_onto_own_descendant_is_cycle() {
        let items = sample();
        let err = move_subtree(&items, "1", &to(Some("4"), 3, 0)).unwrap_err();
        assert_eq!(
            err,
            TreeError::Cycle {
                id: "1".into(),
                target: "4".into(),
            }
        );
        let err = move_subtree(&items, "3", &to(Some("3"), 2, 0)).unwrap_err();
        assert!(matches!(err, TreeError::Cycle { .. }));
    }

    #[test]
    fn move_rejects_wrong_depth() {
        let err = move_subtree(&sample(), "5", &to(Some("1"), 2, 0)).unwrap_err();
        assert_eq!(
            err,
            TreeError::Structural(StructuralError::DepthMismatch {
                id: "5".into(),
                depth: 2,
                expected: 1,
            })
        );
    }

    #[test]
    fn move_rejects_unknown_ids() {
        assert!(move_subtree(&sample(), "nope", &to(None, 0, 0)).is_err());
        assert!(move_subtree(&sample(), "2", &to(Some("nope"), 1, 0)).is_err());
    }

    #[test]
    fn discard_zone_is_never_a_parent() {
        let mut items = sample();
        items.push(FlatItem::root(DISCARD_ZONE_ID, ""));
        reindex(&mut items);
        assert_eq!(
            move_subtree(&items, "5", &to(Some(DISCARD_ZONE_ID), 1, 0)),
            Err(TreeError::DiscardZoneParent)
        );
        assert_eq!(
            insert_item(&items, Some(DISCARD_ZONE_ID), 0, "x").unwrap_err(),
            TreeError::DiscardZoneParent
        );
    }

    #[test]
    fn move_preserves_payload() {
        let mut items = sample();
        items[3].done = true;
        items[2].collapsed = true;
        let moved = move_subtree(&items, "3", &to(None, 0, 2)).unwrap();
        let three = moved.iter().find(|i| i.id == "3").unwrap();
        let four = moved.iter().find(|i| i.id == "4").unwrap();
        assert!(three.collapsed);
        assert!(four.done);
        assert_eq!(four.value, "four");
    }

    // --- indent / outdent ---

    #[test]
    fn outdent_example() {
        let items = vec![
            FlatItem::root("1", "a"),
            FlatItem::child("2", "1", 1, "b"),
            FlatItem::root("3", "c"),
        ];
        let out = outdent(&items, "2").unwrap();
        assert_eq!(
            shape(&out),
            vec![row("1", None, 0), row("2", None, 0), row("3", None, 0)]
        );
    }

    #[test]
    fn outdent_places_after_parent_subtree() {
        let out = outdent(&sample(), "2").unwrap();
        assert_eq!(
            shape(&out),
            vec![
                row("1", None, 0),
                row("3", Some("1"), 1),
                row("4", Some("3"), 2),
                row("2", None, 0),
                row("5", None, 0),
            ]
        );
    }

    #[test]
    fn outdent_root_is_noop() {
        let items = sample();
        assert_eq!(outdent(&items, "5").unwrap(), items);
    }

    #[test]
    fn indent_first_item_is_noop() {
        let items = sample();
        assert_eq!(indent(&items, "1").unwrap(), items);
        // First child of its parent has no sibling above either
        assert_eq!(indent(&items, "2").unwrap(), items);
    }

    #[test]
    fn indent_becomes_last_child_of_sibling_above() {
        let out = indent(&sample(), "5").unwrap();
        assert_eq!(
            shape(&out),
            vec![
                row("1", None, 0),
                row("2", Some("1"), 1),
                row("3", Some("1"), 1),
                row("4", Some("3"), 2),
                row("5", Some("1"), 1),
            ]
        );
        let out = indent(&sample(), "3").unwrap();
        assert_eq!(
            &shape(&out)[2..],
            &[row("3", Some("2"), 2), row("4", Some("3"), 3)]
        );
    }

    #[test]
    fn indent_collapsed_item_moves_hidden_children() {
        let mut items = sample();
        items[2].collapsed = true;
        let out = indent(&items, "3").unwrap();
        let four = out.iter().find(|i| i.id == "4").unwrap();
        assert_eq!(four.depth, 3);
        assert_eq!(four.parent_id.as_deref(), Some("3"));
    }

    // --- remove / insert ---

    #[test]
    fn remove_subtree_drops_descendants() {
        let out = remove_subtree(&sample(), "3").unwrap();
        let ids: Vec<&str> = out.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "5"]);
    }

    #[test]
    fn remove_done_drops_done_subtrees() {
        let mut items = sample();
        items[2].done = true;
        let out = remove_done(&items).unwrap();
        let ids: Vec<&str> = out.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "5"]);
    }

    #[test]
    fn insert_item_at_index() {
        let (out, id) = insert_item(&sample(), Some("1"), 1, "new").unwrap();
        assert_eq!(out[2].id, id);
        assert_eq!(out[2].depth, 1);
        assert_eq!(out[2].index, 1);
        assert_eq!(out[3].id, "3");
        assert_eq!(out[3].index, 2);
    }

    #[test]
    fn insert_item_appends_at_root() {
        let (out, id) = insert_item(&sample(), None, usize::MAX, "last").unwrap();
        assert_eq!(out.last().unwrap().id, id);
        assert_eq!(out.last().unwrap().index, 2);
    }

    #[test]
    fn insert_item_into_empty_tree() {
        let (out, _) = insert_item(&[], None, 0, "first").unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].value, "first");
    }

    // --- payload ---

    #[test]
    fn payload_edits_leave_structure_alone() {
        let items = sample();
        let out = set_done(&items, "4", true).unwrap();
        assert!(out[3].done);
        assert_eq!(shape(&out), shape(&items));

        let out = set_value(&items, "2", "renamed").unwrap();
        assert_eq!(out[1].value, "renamed");

        let out = toggle_collapsed(&items, "1").unwrap();
        assert!(out[0].collapsed);
        assert!(set_done(&items, "missing", true).is_err());
    }

    // --- drop ---

    #[test]
    fn apply_drop_dispatches_on_projection() {
        let items = sample();
        assert_eq!(apply_drop(&items, "3", &Projection::NoOp).unwrap(), items);
        assert_eq!(apply_drop(&items, "3", &Projection::Discard).unwrap().len(), 3);
        let moved = apply_drop(&items, "5", &Projection::Move(to(Some("1"), 1, 0))).unwrap();
        assert_eq!(moved[1].id, "5");
    }
}
