use pretty_assertions::assert_eq;

use tasktrees::model::node::{FlatItem, TreeNode};
use tasktrees::ops::flatten::{flatten, flatten_forest, nest, nest_forest, validate};
use tasktrees::ops::projection::DropTarget;
use tasktrees::ops::tree_ops::{self, TreeError};

/// root
///   a
///     a1
///     a2
///   b
///     b1
///   c
fn sample() -> TreeNode {
    TreeNode::new("root", "Groceries").with_children(vec![
        TreeNode::new("a", "Produce").with_children(vec![
            TreeNode::new("a1", "Apples"),
            TreeNode::new("a2", "Kale").with_done(true),
        ]),
        TreeNode::new("b", "Dairy")
            .with_collapsed(true)
            .with_children(vec![TreeNode::new("b1", "Milk")]),
        TreeNode::new("c", "Bread"),
    ])
}

fn ids(items: &[FlatItem]) -> Vec<&str> {
    items.iter().map(|i| i.id.as_str()).collect()
}

fn target(parent: Option<&str>, depth: usize, index: usize) -> DropTarget {
    DropTarget {
        parent_id: parent.map(str::to_string),
        depth,
        index,
    }
}

// ---------------------------------------------------------------------------
// Flatten / nest
// ---------------------------------------------------------------------------

#[test]
fn nest_inverts_flatten() {
    let tree = sample();
    let flat = flatten(&tree);
    assert_eq!(flat.len(), tree.subtree_size());
    validate(&flat).unwrap();
    assert_eq!(nest(&flat).unwrap(), tree);
}

#[test]
fn flatten_inverts_nest_on_valid_lists() {
    let flat = flatten(&sample());
    let again = flatten(&nest(&flat).unwrap());
    assert_eq!(again, flat);
}

#[test]
fn flatten_is_preorder_with_indexes() {
    let flat = flatten(&sample());
    assert_eq!(ids(&flat), vec!["root", "a", "a1", "a2", "b", "b1", "c"]);
    let b = &flat[4];
    assert_eq!(b.parent_id.as_deref(), Some("root"));
    assert_eq!(b.depth, 1);
    assert_eq!(b.index, 1);
    assert!(b.collapsed);
}

#[test]
fn forest_round_trip() {
    let roots = vec![
        TreeNode::new("x", "x").with_children(vec![TreeNode::new("x1", "x1")]),
        TreeNode::new("y", "y"),
    ];
    assert_eq!(nest_forest(&flatten_forest(&roots)).unwrap(), roots);
}

#[test]
fn nest_rejects_several_roots() {
    let items = vec![FlatItem::root("x", "x"), FlatItem::root("y", "y")];
    assert!(nest(&items).is_err());
    assert_eq!(nest_forest(&items).unwrap().len(), 2);
}

// ---------------------------------------------------------------------------
// Moves
// ---------------------------------------------------------------------------

#[test]
fn move_keeps_every_item_and_payload() {
    let flat = flatten(&sample());
    let out = tree_ops::move_subtree(&flat, "a", &target(Some("c"), 2, 0)).unwrap();

    validate(&out).unwrap();
    let mut before: Vec<_> = flat.iter().map(|i| (&i.id, &i.value, i.done)).collect();
    let mut after: Vec<_> = out.iter().map(|i| (&i.id, &i.value, i.done)).collect();
    before.sort();
    after.sort();
    assert_eq!(after, before);

    // Descendants follow and keep their relative depth
    assert_eq!(ids(&out), vec!["root", "b", "b1", "c", "a", "a1", "a2"]);
    let depths: Vec<usize> = out.iter().map(|i| i.depth).collect();
    assert_eq!(depths, vec![0, 1, 2, 1, 2, 3, 3]);
}

#[test]
fn move_into_own_subtree_is_rejected() {
    let flat = flatten(&sample());
    let err = tree_ops::move_subtree(&flat, "a", &target(Some("a1"), 3, 0)).unwrap_err();
    assert!(matches!(err, TreeError::Cycle { .. }));
    let err = tree_ops::move_subtree(&flat, "a", &target(Some("a"), 2, 0)).unwrap_err();
    assert!(matches!(err, TreeError::Cycle { .. }));
}

#[test]
fn collapsed_subtree_moves_whole() {
    let flat = flatten(&sample());
    let out = tree_ops::move_subtree(&flat, "b", &target(Some("root"), 1, 0)).unwrap();
    assert_eq!(ids(&out), vec!["root", "b", "b1", "a", "a1", "a2", "c"]);
    assert!(out[1].collapsed);
    assert_eq!(out[2].parent_id.as_deref(), Some("b"));
}

#[test]
fn move_to_same_place_is_identity() {
    let flat = flatten(&sample());
    let out = tree_ops::move_subtree(&flat, "b", &target(Some("root"), 1, 1)).unwrap();
    assert_eq!(out, flat);
}

// ---------------------------------------------------------------------------
// Indent / outdent
// ---------------------------------------------------------------------------

#[test]
fn indent_first_child_is_noop() {
    let flat = flatten(&sample());
    assert_eq!(tree_ops::indent(&flat, "a").unwrap(), flat);
    assert_eq!(tree_ops::indent(&flat, "root").unwrap(), flat);
}

#[test]
fn indent_then_outdent_restores() {
    let flat = flatten(&sample());
    let indented = tree_ops::indent(&flat, "c").unwrap();
    let c = indented.iter().find(|i| i.id == "c").unwrap();
    assert_eq!(c.parent_id.as_deref(), Some("b"));
    assert_eq!(c.index, 1);

    let back = tree_ops::outdent(&indented, "c").unwrap();
    assert_eq!(back, flat);
}

#[test]
fn outdent_lands_after_parent() {
    let flat = flatten(&sample());
    let out = tree_ops::outdent(&flat, "a1").unwrap();
    assert_eq!(ids(&out), vec!["root", "a", "a2", "a1", "b", "b1", "c"]);
    let a1 = &out[3];
    assert_eq!(a1.parent_id.as_deref(), Some("root"));
    assert_eq!((a1.depth, a1.index), (1, 1));
    validate(&out).unwrap();
}

// ---------------------------------------------------------------------------
// Removal
// ---------------------------------------------------------------------------

#[test]
fn remove_done_takes_subtrees() {
    let roots = vec![
        TreeNode::new("x", "x")
            .with_done(true)
            .with_children(vec![TreeNode::new("x1", "x1")]),
        TreeNode::new("y", "y").with_children(vec![TreeNode::new("y1", "y1").with_done(true)]),
    ];
    let out = tree_ops::remove_done(&flatten_forest(&roots)).unwrap();
    assert_eq!(ids(&out), vec!["y"]);
    assert_eq!(out[0].index, 0);
}
