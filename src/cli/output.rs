use serde::Serialize;

use crate::io::recovery::RecoveryEntry;
use crate::model::node::{FlatItem, TreeNode};
use crate::model::state::TreeState;
use crate::ops::flatten::{nest_forest, position, subtree_range, StructuralError};

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeJson<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub hide_done_items: bool,
    pub dark_mode: bool,
    pub roots: Vec<TreeNode>,
}

#[derive(Serialize)]
pub struct TreeInfoJson {
    pub id: String,
    pub name: String,
    pub items: usize,
    pub done: usize,
}

pub fn tree_to_json(state: &TreeState) -> Result<TreeJson<'_>, StructuralError> {
    Ok(TreeJson {
        id: &state.current_tree_id,
        name: &state.current_tree_name,
        hide_done_items: state.prefs.hide_done_items,
        dark_mode: state.prefs.dark_mode,
        roots: nest_forest(&state.items)?,
    })
}

pub fn recovery_entries_json(entries: &[RecoveryEntry]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(entries)
}

// ---------------------------------------------------------------------------
// Text formatting
// ---------------------------------------------------------------------------

/// Leading characters of an id, enough to tell items apart by eye.
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// `[x] text  (id)`, indented two spaces per level. `hidden` counts
/// descendants folded away under a collapsed item.
pub fn format_item_line(item: &FlatItem, hidden: usize) -> String {
    let check = if item.done { 'x' } else { ' ' };
    let mut line = format!(
        "{}[{}] {}  ({})",
        "  ".repeat(item.depth),
        check,
        item.value,
        short_id(&item.id)
    );
    if hidden > 0 {
        line.push_str(&format!(" [+{}]", hidden));
    }
    line
}

/// Lines for `shown`, a subset of `items` in order.
pub fn format_tree(items: &[FlatItem], shown: &[&FlatItem], fold_counts: bool) -> Vec<String> {
    if shown.is_empty() {
        return vec!["(empty)".to_string()];
    }
    shown
        .iter()
        .map(|item| {
            let hidden = if fold_counts && item.collapsed {
                position(items, &item.id).map_or(0, |pos| subtree_range(items, pos).len() - 1)
            } else {
                0
            };
            format_item_line(item, hidden)
        })
        .collect()
}

pub fn format_tree_header(state: &TreeState) -> String {
    if state.current_tree_name.is_empty() {
        state.current_tree_id.clone()
    } else {
        format!("{} ({})", state.current_tree_name, state.current_tree_id)
    }
}

pub fn format_recovery_entry(entry: &RecoveryEntry) -> String {
    entry.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::flatten::{flatten_forest, visible_items};
    use insta::assert_snapshot;

    fn sample() -> Vec<FlatItem> {
        flatten_forest(&[
            TreeNode::new("a1b2c3d4e5", "Paint the shed").with_children(vec![
                TreeNode::new("b0000001", "Buy brushes").with_done(true),
                TreeNode::new("b0000002", "Pick a color")
                    .with_collapsed(true)
                    .with_children(vec![TreeNode::new("c1", "Ask neighbors")]),
            ]),
            TreeNode::new("d4", "Book dentist"),
        ])
    }

    #[test]
    fn tree_lines_fold_collapsed_items() {
        let items = sample();
        let shown = visible_items(&items, false);
        let out = format_tree(&items, &shown, true).join("\n");
        assert_snapshot!(out, @r"
        [ ] Paint the shed  (a1b2c3d4)
          [x] Buy brushes  (b0000001)
          [ ] Pick a color  (b0000002) [+1]
        [ ] Book dentist  (d4)
        ");
    }

    #[test]
    fn tree_lines_all_items() {
        let items = sample();
        let shown: Vec<&FlatItem> = items.iter().collect();
        let out = format_tree(&items, &shown, false).join("\n");
        assert_snapshot!(out, @r"
        [ ] Paint the shed  (a1b2c3d4)
          [x] Buy brushes  (b0000001)
          [ ] Pick a color  (b0000002)
            [ ] Ask neighbors  (c1)
        [ ] Book dentist  (d4)
        ");
    }

    #[test]
    fn empty_tree() {
        assert_eq!(format_tree(&[], &[], true), vec!["(empty)"]);
    }

    #[test]
    fn json_nests_items() {
        let mut state = TreeState::new("home", "Home");
        state.items = sample();
        let json = serde_json::to_value(tree_to_json(&state).unwrap()).unwrap();
        assert_eq!(json["name"], "Home");
        assert_eq!(json["roots"].as_array().unwrap().len(), 2);
        assert_eq!(json["roots"][0]["children"][1]["children"][0]["value"], "Ask neighbors");
    }

    #[test]
    fn header() {
        let mut state = TreeState::new("home", "");
        assert_eq!(format_tree_header(&state), "home");
        state.current_tree_name = "Home".into();
        assert_eq!(format_tree_header(&state), "Home (home)");
    }
}
