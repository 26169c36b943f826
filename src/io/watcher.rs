use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, trace};

use crate::sync::SyncError;
use crate::sync::store::InboundEvent;

/// Watches one snapshot file and forwards its new contents on every change.
///
/// The callback runs on notify's thread and only reads the file and sends;
/// the receiver is drained by the session loop.
pub struct SnapshotWatcher {
    _watcher: RecommendedWatcher,
}

impl SnapshotWatcher {
    /// Start watching `path`. Its parent directory must exist.
    pub fn start(
        path: &Path,
        key: String,
        tx: mpsc::Sender<InboundEvent>,
    ) -> Result<Self, notify::Error> {
        let target: PathBuf = path.to_path_buf();
        let file_name: Option<OsString> = path.file_name().map(|n| n.to_os_string());
        let dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        // Last contents sent, so a burst of events for one write sends once
        let mut last_sent: Option<String> = None;

        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| {
                let event = match result {
                    Ok(e) => e,
                    Err(e) => {
                        debug!(error = %e, "watch error");
                        return;
                    }
                };

                match event.kind {
                    EventKind::Create(_) | EventKind::Modify(_) => {}
                    _ => return,
                }

                let relevant = event
                    .paths
                    .iter()
                    .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                if !relevant {
                    return;
                }

                let content = match std::fs::read_to_string(&target) {
                    Ok(c) => c,
                    // Removed between the event and the read
                    Err(e) if e.kind() == ErrorKind::NotFound => return,
                    Err(e) => {
                        let _ = tx.send(InboundEvent::Failed(SyncError::Read {
                            key: key.clone(),
                            source: e,
                        }));
                        return;
                    }
                };
                if last_sent.as_deref() == Some(content.as_str()) {
                    trace!(key = %key, "unchanged contents, skipping");
                    return;
                }
                last_sent = Some(content.clone());
                let _ = tx.send(InboundEvent::Snapshot(content));
            },
            Config::default(),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        Ok(SnapshotWatcher { _watcher: watcher })
    }
}
