//! Drop projection for drag-and-drop reordering.
//!
//! While a drag is in progress the pointer hovers over some visible item and
//! has moved horizontally by some offset. From that we work out where the
//! dragged subtree would land if it were dropped now: its parent, its index
//! among that parent's children and its depth.

use serde::Serialize;

use crate::model::node::FlatItem;
use crate::ops::flatten::{descendant_ids, position, visible_items};

/// Id of the fixed discard zone. Dropping anything on it deletes the
/// dragged subtree. It never takes part in depth projection.
pub const DISCARD_ZONE_ID: &str = "trash";

/// Where a dragged subtree would be placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DropTarget {
    pub parent_id: Option<String>,
    pub depth: usize,
    /// Position among the parent's children, not counting the moved item
    pub index: usize,
}

/// Result of projecting a pointer position onto the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    Move(DropTarget),
    /// Over the discard zone: the subtree is deleted on drop
    Discard,
    /// Not a valid drop (no target, unknown item, own descendant)
    NoOp,
}

/// Inputs that come from the view rather than the tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionParams {
    /// Pointer distance that equals one nesting level
    pub indent_width: f64,
    /// Done items are hidden from the visible list
    pub hide_done: bool,
}

impl Default for ProjectionParams {
    fn default() -> Self {
        ProjectionParams {
            indent_width: 24.0,
            hide_done: false,
        }
    }
}

/// Project the drop of `active_id` over `over_id` with horizontal pointer
/// offset `offset_x`.
///
/// Hit-testing uses the visible list: descendants of collapsed items (and
/// done items when hidden) are skipped, the dragged item's own descendants
/// travel with it and the discard zone is excluded. The dragged item is moved
/// into the hovered slot; its depth is the depth it had plus the offset in
/// whole indent levels, clamped to `0..=previous.depth + 1`.
pub fn project(
    items: &[FlatItem],
    active_id: &str,
    over_id: Option<&str>,
    offset_x: f64,
    params: &ProjectionParams,
) -> Projection {
    let Some(over_id) = over_id else {
        return Projection::NoOp;
    };
    if active_id == DISCARD_ZONE_ID {
        return Projection::NoOp;
    }
    let Some(active_pos) = position(items, active_id) else {
        return Projection::NoOp;
    };
    if over_id == DISCARD_ZONE_ID {
        return Projection::Discard;
    }

    let descendants = descendant_ids(items, active_pos);
    if descendants.contains(over_id) {
        return Projection::NoOp;
    }

    let mut working: Vec<&FlatItem> = visible_items(items, params.hide_done)
        .into_iter()
        .filter(|item| item.id != DISCARD_ZONE_ID && !descendants.contains(item.id.as_str()))
        .collect();

    let (Some(from), Some(to)) = (
        working.iter().position(|item| item.id == active_id),
        working.iter().position(|item| item.id == over_id),
    ) else {
        return Projection::NoOp;
    };
    let active = working.remove(from);
    working.insert(to, active);

    let max_depth = match to.checked_sub(1) {
        Some(prev) => working[prev].depth + 1,
        None => 0,
    };
    let depth = (active.depth as i64 + drag_levels(offset_x, params.indent_width))
        .clamp(0, max_depth as i64) as usize;

    let preceding = &working[..to];
    let parent_id = if depth == 0 {
        None
    } else {
        match preceding.iter().rev().find(|item| item.depth + 1 == depth) {
            Some(parent) => Some(parent.id.clone()),
            None => return Projection::NoOp,
        }
    };

    // Insert right after the nearest visible sibling above the slot. Hidden
    // siblings (done items) keep their place relative to it.
    let index = preceding
        .iter()
        .rev()
        .take_while(|item| item.depth + 1 > depth)
        .find(|item| item.depth == depth)
        .map_or(0, |sibling| {
            sibling_index_excluding(items, parent_id.as_deref(), &sibling.id, active_id) + 1
        });

    Projection::Move(DropTarget {
        parent_id,
        depth,
        index,
    })
}

/// Whole indent levels covered by the pointer offset.
fn drag_levels(offset_x: f64, indent_width: f64) -> i64 {
    if indent_width <= 0.0 || !offset_x.is_finite() {
        return 0;
    }
    (offset_x / indent_width).round() as i64
}

/// Position of `sibling_id` among `parent_id`'s children, skipping `skip_id`.
fn sibling_index_excluding(
    items: &[FlatItem],
    parent_id: Option<&str>,
    sibling_id: &str,
    skip_id: &str,
) -> usize {
    items
        .iter()
        .filter(|item| item.parent_id.as_deref() == parent_id && item.id != skip_id)
        .position(|item| item.id == sibling_id)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Drag lifecycle
// ---------------------------------------------------------------------------

/// Transient state of the one drag gesture in progress.
#[derive(Debug, Clone, PartialEq)]
pub struct DragState {
    pub active_id: String,
    pub over_id: Option<String>,
    pub pointer_offset_x: f64,
    pub projected_depth: Option<usize>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DragError {
    #[error("a drag is already in progress for {0}")]
    AlreadyActive(String),
    #[error("no drag in progress")]
    NotActive,
    #[error("cannot drag unknown item {0}")]
    UnknownItem(String),
}

/// Holds at most one `DragState`. Beginning a second drag while one is
/// active is an error; finishing or cancelling destroys the state.
#[derive(Debug, Default)]
pub struct DragTracker {
    state: Option<DragState>,
}

impl DragTracker {
    pub fn new() -> Self {
        DragTracker::default()
    }

    pub fn active(&self) -> Option<&DragState> {
        self.state.as_ref()
    }

    pub fn begin(&mut self, items: &[FlatItem], active_id: &str) -> Result<&DragState, DragError> {
        if let Some(state) = &self.state {
            return Err(DragError::AlreadyActive(state.active_id.clone()));
        }
        if active_id == DISCARD_ZONE_ID || position(items, active_id).is_none() {
            return Err(DragError::UnknownItem(active_id.to_string()));
        }
        Ok(self.state.insert(DragState {
            active_id: active_id.to_string(),
            over_id: None,
            pointer_offset_x: 0.0,
            projected_depth: None,
        }))
    }

    /// Record the hovered item and pointer offset, returning the projection.
    pub fn over(
        &mut self,
        items: &[FlatItem],
        over_id: Option<String>,
        offset_x: f64,
        params: &ProjectionParams,
    ) -> Result<Projection, DragError> {
        let state = self.state.as_mut().ok_or(DragError::NotActive)?;
        let projection = project(items, &state.active_id, over_id.as_deref(), offset_x, params);
        state.over_id = over_id;
        state.pointer_offset_x = offset_x;
        state.projected_depth = match &projection {
            Projection::Move(target) => Some(target.depth),
            Projection::Discard | Projection::NoOp => None,
        };
        Ok(projection)
    }

    /// End the drag, returning the dragged id and the final projection.
    pub fn finish(
        &mut self,
        items: &[FlatItem],
        params: &ProjectionParams,
    ) -> Result<(String, Projection), DragError> {
        let state = self.state.take().ok_or(DragError::NotActive)?;
        let projection = project(
            items,
            &state.active_id,
            state.over_id.as_deref(),
            state.pointer_offset_x,
            params,
        );
        Ok((state.active_id, projection))
    }

    pub fn cancel(&mut self) -> Option<DragState> {
        self.state.take()
    }
}
