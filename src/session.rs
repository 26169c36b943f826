//! One open tree: its state, the drag in progress and its sync engine.
//!
//! The session is driven from a single loop. UI events go to [`Session::handle`],
//! and [`Session::poll`] is called on every tick to apply inbound snapshots
//! and run due writes. Both return the signals the view should react to.

use std::path::Path;
use std::time::Instant;

use tracing::debug;

use crate::model::config::Config;
use crate::model::node::FlatItem;
use crate::model::snapshot::RemoteSnapshot;
use crate::model::state::TreeState;
use crate::ops::flatten::{visible_items, StructuralError};
use crate::ops::projection::{
    DragError, DragState, DragTracker, DropTarget, Projection, ProjectionParams,
};
use crate::ops::tree_ops::{self, TreeError};
use crate::sync::{RemoteStore, SerializationError, SyncEngine, SyncError, SyncOutcome};

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    DragStart { id: String },
    DragOver { over_id: Option<String>, offset_x: f64 },
    DragEnd,
    DragCancel,
    Indent { id: String },
    Outdent { id: String },
    Remove { id: String },
    ToggleDone { id: String },
    EditValue { id: String, value: String },
    ToggleCollapsed { id: String },
    Insert {
        parent_id: Option<String>,
        index: usize,
        value: String,
    },
}

#[derive(Debug)]
pub enum Signal {
    /// Items changed; redraw
    Rerender,
    /// Where the dragged item would land if dropped now
    Projected(Projection),
    Notice(Notice),
}

/// Something the user should be told about. None of these stop editing.
#[derive(Debug, thiserror::Error)]
pub enum Notice {
    #[error("edit rejected: {0}")]
    Rejected(#[from] TreeError),
    #[error("drag rejected: {0}")]
    DragRejected(#[from] DragError),
    #[error("sync failed: {0}")]
    SyncFailed(#[from] SyncError),
    #[error("remote snapshot discarded: {0}")]
    SnapshotDiscarded(#[from] SerializationError),
}

pub struct Session<S: RemoteStore> {
    state: TreeState,
    drag: DragTracker,
    engine: SyncEngine<S>,
    account: Option<String>,
    indent_width: f64,
    /// Problems from loading the current tree, handed out by the next `poll`
    pending: Vec<Notice>,
}

impl<S: RemoteStore> Session<S> {
    /// Open `tree_id` and subscribe to it when an account is configured.
    /// Recovery entries go under `recovery_dir` when given.
    ///
    /// A stored tree that cannot be read is reported by the first
    /// [`Session::poll`] and by [`Session::open_notices`].
    pub fn open(
        store: S,
        config: &Config,
        tree_id: &str,
        recovery_dir: Option<&Path>,
    ) -> Result<Self, SyncError> {
        let mut engine = SyncEngine::new(store, config.sync.debounce());
        if let Some(dir) = recovery_dir {
            engine = engine.with_recovery_dir(dir);
        }
        let mut state = TreeState::new(tree_id, "");
        state.prefs.hide_done_items = config.ui.hide_done_items;
        state.prefs.dark_mode = config.ui.dark_mode;

        let account = config.sync.account.clone();
        engine.attach(account.as_deref(), tree_id)?;
        let mut session = Session {
            state,
            drag: DragTracker::new(),
            engine,
            account,
            indent_width: config.ui.indent_width,
            pending: Vec::new(),
        };
        session.load_initial();
        Ok(session)
    }

    /// Pick up the stored tree, which a subscription delivers first.
    fn load_initial(&mut self) {
        let outcomes = self.engine.poll_inbound(&mut self.state);
        self.pending = outcomes
            .into_iter()
            .filter_map(|outcome| match outcome_signal(outcome) {
                Some(Signal::Notice(notice)) => Some(notice),
                _ => None,
            })
            .collect();
    }

    /// Problems found while loading the current tree that `poll` has not
    /// handed out yet.
    pub fn open_notices(&self) -> &[Notice] {
        &self.pending
    }

    pub fn state(&self) -> &TreeState {
        &self.state
    }

    pub fn engine(&self) -> &SyncEngine<S> {
        &self.engine
    }

    pub fn dragging(&self) -> Option<&DragState> {
        self.drag.active()
    }

    /// Items as the user sees them.
    pub fn visible(&self) -> Vec<&FlatItem> {
        visible_items(&self.state.items, self.state.prefs.hide_done_items)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.engine.next_deadline()
    }

    fn params(&self) -> ProjectionParams {
        ProjectionParams {
            indent_width: self.indent_width,
            hide_done: self.state.prefs.hide_done_items,
        }
    }

    pub fn handle(&mut self, event: UiEvent, now: Instant) -> Vec<Signal> {
        debug!(?event, "ui event");
        match event {
            UiEvent::DragStart { id } => match self.drag.begin(&self.state.items, &id) {
                Ok(_) => Vec::new(),
                Err(e) => vec![Signal::Notice(e.into())],
            },
            UiEvent::DragOver { over_id, offset_x } => {
                let params = self.params();
                match self.drag.over(&self.state.items, over_id, offset_x, &params) {
                    Ok(projection) => vec![Signal::Projected(projection)],
                    Err(e) => vec![Signal::Notice(e.into())],
                }
            }
            UiEvent::DragEnd => {
                let params = self.params();
                match self.drag.finish(&self.state.items, &params) {
                    Ok((active_id, projection)) => self.mutate(now, |items| {
                        tree_ops::apply_drop(items, &active_id, &projection)
                    }),
                    Err(e) => vec![Signal::Notice(e.into())],
                }
            }
            UiEvent::DragCancel => {
                self.drag.cancel();
                Vec::new()
            }
            UiEvent::Indent { id } => self.mutate(now, |items| tree_ops::indent(items, &id)),
            UiEvent::Outdent { id } => self.mutate(now, |items| tree_ops::outdent(items, &id)),
            UiEvent::Remove { id } => self.mutate(now, |items| tree_ops::remove_subtree(items, &id)),
            UiEvent::ToggleDone { id } => {
                let done = self.state.find(&id).is_some_and(|item| item.done);
                self.mutate(now, |items| tree_ops::set_done(items, &id, !done))
            }
            UiEvent::EditValue { id, value } => {
                self.mutate(now, |items| tree_ops::set_value(items, &id, value))
            }
            UiEvent::ToggleCollapsed { id } => {
                self.mutate(now, |items| tree_ops::toggle_collapsed(items, &id))
            }
            UiEvent::Insert {
                parent_id,
                index,
                value,
            } => match self.insert(parent_id.as_deref(), index, value, now) {
                Ok(_) => vec![Signal::Rerender],
                Err(e) => vec![Signal::Notice(e.into())],
            },
        }
    }

    /// Insert a new item, returning its id.
    pub fn insert(
        &mut self,
        parent_id: Option<&str>,
        index: usize,
        value: impl Into<String>,
        now: Instant,
    ) -> Result<String, TreeError> {
        let (items, id) = tree_ops::insert_item(&self.state.items, parent_id, index, value)?;
        self.commit(items, now);
        Ok(id)
    }

    /// Move `id` with its subtree under `parent_id` at `index`.
    pub fn move_item(
        &mut self,
        id: &str,
        parent_id: Option<&str>,
        index: usize,
        now: Instant,
    ) -> Result<(), TreeError> {
        let depth = match parent_id {
            None => 0,
            Some(pid) => {
                let parent = self
                    .state
                    .find(pid)
                    .ok_or_else(|| StructuralError::NotFound(pid.to_string()))?;
                parent.depth + 1
            }
        };
        let target = DropTarget {
            parent_id: parent_id.map(str::to_string),
            depth,
            index,
        };
        let items = tree_ops::move_subtree(&self.state.items, id, &target)?;
        self.commit(items, now);
        Ok(())
    }

    /// Delete every done item with its subtree.
    pub fn clean_done(&mut self, now: Instant) -> Result<usize, TreeError> {
        let before = self.state.items.len();
        let items = tree_ops::remove_done(&self.state.items)?;
        let removed = before - items.len();
        if removed > 0 {
            self.commit(items, now);
        }
        Ok(removed)
    }

    pub fn rename(&mut self, name: impl Into<String>, now: Instant) {
        self.state.current_tree_name = name.into();
        self.engine.mark_dirty(now);
    }

    /// Replace the whole tree with an imported snapshot. The tree keeps its id.
    pub fn import(&mut self, snapshot: RemoteSnapshot, now: Instant) {
        self.drag.cancel();
        self.state.replace_from(snapshot);
        self.engine.mark_dirty(now);
    }

    fn mutate(
        &mut self,
        now: Instant,
        op: impl FnOnce(&[FlatItem]) -> Result<Vec<FlatItem>, TreeError>,
    ) -> Vec<Signal> {
        match op(&self.state.items) {
            Ok(items) if items == self.state.items => Vec::new(),
            Ok(items) => {
                self.commit(items, now);
                vec![Signal::Rerender]
            }
            Err(e) => vec![Signal::Notice(e.into())],
        }
    }

    fn commit(&mut self, items: Vec<FlatItem>, now: Instant) {
        self.state.items = items;
        self.engine.mark_dirty(now);
    }

    /// Apply inbound snapshots and run a due write.
    pub fn poll(&mut self, now: Instant) -> Vec<Signal> {
        let mut signals: Vec<Signal> = self.pending.drain(..).map(Signal::Notice).collect();
        for outcome in self.engine.poll_inbound(&mut self.state) {
            signals.extend(outcome_signal(outcome));
        }
        if let Some(outcome) = self.engine.tick(now, &self.state) {
            signals.extend(outcome_signal(outcome));
        }
        signals
    }

    /// Write pending edits now.
    pub fn save(&mut self) -> Result<(), SyncError> {
        match self.engine.flush(&self.state) {
            Some(SyncOutcome::Failed(e)) => Err(e),
            _ => Ok(()),
        }
    }

    /// Flush and open another tree of the same account. Problems loading
    /// the new tree are reported like those of [`Session::open`].
    pub fn switch_tree(&mut self, tree_id: &str) -> Result<Option<SyncError>, SyncError> {
        let flushed = match self.engine.detach(Some(&self.state)) {
            Some(SyncOutcome::Failed(e)) => Some(e),
            _ => None,
        };
        self.drag.cancel();
        let prefs = self.state.prefs;
        self.state = TreeState::new(tree_id, "");
        self.state.prefs = prefs;
        self.engine.attach(self.account.as_deref(), tree_id)?;
        self.load_initial();
        Ok(flushed)
    }

    /// Flush and detach. Returns the error of a final write that failed.
    pub fn close(mut self) -> Result<(), SyncError> {
        self.drag.cancel();
        match self.engine.detach(Some(&self.state)) {
            Some(SyncOutcome::Failed(e)) => Err(e),
            _ => Ok(()),
        }
    }
}

impl<S: RemoteStore> Drop for Session<S> {
    fn drop(&mut self) {
        // No-op after close()
        self.engine.detach(Some(&self.state));
    }
}

fn outcome_signal(outcome: SyncOutcome) -> Option<Signal> {
    match outcome {
        SyncOutcome::Replaced => Some(Signal::Rerender),
        SyncOutcome::Discarded(e) => Some(Signal::Notice(e.into())),
        SyncOutcome::Failed(e) => Some(Signal::Notice(e.into())),
        SyncOutcome::Echo | SyncOutcome::Unchanged | SyncOutcome::Pushed(_) => None,
    }
}
