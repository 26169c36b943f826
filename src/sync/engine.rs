use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::debounce::Debounce;
use super::store::{InboundEvent, RemoteStore, Subscription};
use super::{decode_snapshot, encode_snapshot, SerializationError, StoreKey, SyncError};
use crate::io::recovery;
use crate::model::snapshot::Fingerprint;
use crate::model::state::TreeState;

/// Where the engine is in its lifecycle. `Receiving` and `Sending` are
/// held only while an inbound snapshot is applied or a write is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Detached,
    Subscribed,
    Receiving,
    Sending,
}

/// What happened to one inbound event or outbound write.
#[derive(Debug)]
pub enum SyncOutcome {
    /// An inbound snapshot replaced the local tree
    Replaced,
    /// Our own write came back
    Echo,
    /// Inbound content equal to what we already have
    Unchanged,
    Discarded(SerializationError),
    Pushed(Fingerprint),
    Failed(SyncError),
}

struct Link {
    key: StoreKey,
    subscription: Subscription,
}

/// Keeps one open tree in step with its document in the store.
pub struct SyncEngine<S: RemoteStore> {
    store: S,
    debounce: Debounce,
    recovery_dir: Option<PathBuf>,
    link: Option<Link>,
    phase: SyncPhase,
    dirty: bool,
    last_sent: Option<Fingerprint>,
}

impl<S: RemoteStore> SyncEngine<S> {
    pub fn new(store: S, debounce: Duration) -> Self {
        SyncEngine {
            store,
            debounce: Debounce::new(debounce),
            recovery_dir: None,
            link: None,
            phase: SyncPhase::Detached,
            dirty: false,
            last_sent: None,
        }
    }

    /// Record unsaved payloads and discarded snapshots under `dir`.
    pub fn with_recovery_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.recovery_dir = Some(dir.into());
        self
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn key(&self) -> Option<&StoreKey> {
        self.link.as_ref().map(|link| &link.key)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    fn recovery_dir(&self) -> Option<&Path> {
        self.recovery_dir.as_deref()
    }

    /// Subscribe to `tree_id` for `account`. Without an account the engine
    /// stays detached and edits remain local.
    pub fn attach(&mut self, account: Option<&str>, tree_id: &str) -> Result<(), SyncError> {
        self.reset();
        let Some(account) = account else {
            debug!(tree_id, "no account, editing locally");
            return Ok(());
        };
        let key = StoreKey::new(account, tree_id)?;
        let subscription = self.store.subscribe(&key)?;
        info!(key = %key, "attached");
        self.link = Some(Link { key, subscription });
        self.phase = SyncPhase::Subscribed;
        Ok(())
    }

    /// Drop the subscription. A pending write is flushed first when `state`
    /// is given; after this no write can happen.
    pub fn detach(&mut self, state: Option<&TreeState>) -> Option<SyncOutcome> {
        let outcome = match state {
            Some(state) if self.dirty => self.push(state),
            _ => None,
        };
        if let Some(link) = &self.link {
            info!(key = %link.key, "detached");
        }
        self.reset();
        outcome
    }

    fn reset(&mut self) {
        self.debounce.cancel();
        self.link = None;
        self.phase = SyncPhase::Detached;
        self.dirty = false;
        self.last_sent = None;
    }

    /// Note a local edit and restart the quiet period.
    pub fn mark_dirty(&mut self, now: Instant) {
        if self.link.is_none() {
            return;
        }
        self.dirty = true;
        let deadline = self.debounce.arm(now);
        debug!(in_ms = deadline.saturating_duration_since(now).as_millis() as u64, "save scheduled");
    }

    /// Write if the quiet period is over.
    pub fn tick(&mut self, now: Instant, state: &TreeState) -> Option<SyncOutcome> {
        if self.debounce.fire(now) && self.dirty {
            return self.push(state);
        }
        None
    }

    /// Write now if anything is unsaved.
    pub fn flush(&mut self, state: &TreeState) -> Option<SyncOutcome> {
        if !self.dirty {
            return None;
        }
        self.push(state)
    }

    fn push(&mut self, state: &TreeState) -> Option<SyncOutcome> {
        let key = self.link.as_ref()?.key.clone();
        self.debounce.cancel();
        self.phase = SyncPhase::Sending;
        let outcome = match self.write_snapshot(&key, state) {
            Ok(fingerprint) => {
                info!(key = %key, %fingerprint, items = state.items.len(), "snapshot saved");
                self.dirty = false;
                self.last_sent = Some(fingerprint);
                SyncOutcome::Pushed(fingerprint)
            }
            Err(e) => {
                // Stays dirty; the next edit or save retries
                warn!(key = %key, error = %e, "snapshot not saved");
                SyncOutcome::Failed(e)
            }
        };
        self.phase = SyncPhase::Subscribed;
        Some(outcome)
    }

    fn write_snapshot(&self, key: &StoreKey, state: &TreeState) -> Result<Fingerprint, SyncError> {
        let snapshot = state.to_snapshot(Utc::now().timestamp_millis());
        let fingerprint = snapshot.fingerprint()?;
        let payload = encode_snapshot(&snapshot)?;
        if let Err(e) = self.store.write(key, &payload) {
            if let Some(dir) = self.recovery_dir() {
                recovery::log_failed_write(dir, &key.to_string(), &e, &payload);
            }
            return Err(e);
        }
        Ok(fingerprint)
    }

    /// Apply everything the subscription has delivered, oldest first.
    pub fn poll_inbound(&mut self, state: &mut TreeState) -> Vec<SyncOutcome> {
        let Some(link) = &self.link else {
            return Vec::new();
        };
        let key = link.key.to_string();
        let events = link.subscription.poll();
        let mut outcomes = Vec::with_capacity(events.len());
        for event in events {
            outcomes.push(self.apply_inbound(&key, event, state));
        }
        outcomes
    }

    fn apply_inbound(&mut self, key: &str, event: InboundEvent, state: &mut TreeState) -> SyncOutcome {
        let raw = match event {
            InboundEvent::Snapshot(raw) => raw,
            InboundEvent::Failed(e) => {
                warn!(key, error = %e, "inbound read failed");
                return SyncOutcome::Failed(e);
            }
        };

        self.phase = SyncPhase::Receiving;
        let outcome = match decode_snapshot(&raw) {
            Err(e) => {
                warn!(key, error = %e, "discarding inbound snapshot");
                if let Some(dir) = self.recovery_dir() {
                    recovery::log_discarded_snapshot(dir, key, &e, &raw);
                }
                SyncOutcome::Discarded(e)
            }
            Ok(snapshot) => match snapshot.fingerprint() {
                Err(e) => SyncOutcome::Failed(SyncError::Serialize(e)),
                Ok(fingerprint) if Some(fingerprint) == self.last_sent => {
                    debug!(key, %fingerprint, "own write echoed");
                    SyncOutcome::Echo
                }
                Ok(fingerprint) if state.fingerprint().ok() == Some(fingerprint) => {
                    SyncOutcome::Unchanged
                }
                Ok(fingerprint) => {
                    info!(key, %fingerprint, revision = snapshot.revision, "applying inbound snapshot");
                    state.replace_from(snapshot);
                    // The remote copy wins; nothing local is left to save
                    self.dirty = false;
                    self.debounce.cancel();
                    // Our own echo came through the channel before this, so a
                    // later copy of our old write is a peer's and must apply
                    self.last_sent = None;
                    SyncOutcome::Replaced
                }
            },
        };
        self.phase = SyncPhase::Subscribed;
        outcome
    }
}
