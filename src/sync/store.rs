use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::{StoreKey, SyncError};
use crate::io::lock::FileLock;
use crate::io::recovery::atomic_write;
use crate::io::watcher::SnapshotWatcher;

/// What a subscription delivers, in the order the store produced it.
#[derive(Debug)]
pub enum InboundEvent {
    /// The full document after a change
    Snapshot(String),
    /// The change was seen but the document could not be read
    Failed(SyncError),
}

/// Live feed for one key. Dropping it ends the subscription.
pub struct Subscription {
    rx: mpsc::Receiver<InboundEvent>,
    _guard: Option<Box<dyn Send>>,
}

impl Subscription {
    pub fn new(rx: mpsc::Receiver<InboundEvent>) -> Self {
        Subscription { rx, _guard: None }
    }

    /// Keep `guard` alive for as long as the subscription is.
    pub fn with_guard(rx: mpsc::Receiver<InboundEvent>, guard: impl Send + 'static) -> Self {
        Subscription {
            rx,
            _guard: Some(Box::new(guard)),
        }
    }

    /// Non-blocking drain of everything queued so far.
    pub fn poll(&self) -> Vec<InboundEvent> {
        let mut events = Vec::new();
        while let Ok(evt) = self.rx.try_recv() {
            events.push(evt);
        }
        events
    }
}

/// A reactive document store.
pub trait RemoteStore {
    /// Subscribe to `key`. The current document, if any, is delivered
    /// first; every later write follows, including this client's own.
    fn subscribe(&self, key: &StoreKey) -> Result<Subscription, SyncError>;
    /// Overwrite the document at `key`.
    fn write(&self, key: &StoreKey, payload: &str) -> Result<(), SyncError>;
    /// Tree ids stored for `account`, sorted.
    fn list_trees(&self, account: &str) -> Result<Vec<String>, SyncError>;
    /// Delete the document at `key`. Missing documents are not an error.
    fn remove(&self, key: &StoreKey) -> Result<(), SyncError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Store shared by clones within one process.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    docs: BTreeMap<String, String>,
    subscribers: Vec<(String, mpsc::Sender<InboundEvent>)>,
    fail_writes: bool,
    writes: usize,
}

impl MemoryInner {
    fn publish(&mut self, key: &str, payload: &str) {
        self.docs.insert(key.to_string(), payload.to_string());
        // Closed receivers are dropped here
        self.subscribers.retain(|(k, tx)| {
            k != key || tx.send(InboundEvent::Snapshot(payload.to_string())).is_ok()
        });
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every following write fail until turned off again.
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Number of successful `write` calls.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    pub fn value(&self, key: &StoreKey) -> Option<String> {
        self.lock().docs.get(&key.to_string()).cloned()
    }

    /// Publish a document as another client would, without validation.
    pub fn write_raw(&self, key: &StoreKey, payload: &str) {
        self.lock().publish(&key.to_string(), payload);
    }
}

impl RemoteStore for MemoryStore {
    fn subscribe(&self, key: &StoreKey) -> Result<Subscription, SyncError> {
        let key = key.to_string();
        let (tx, rx) = mpsc::channel();
        let mut inner = self.lock();
        if let Some(doc) = inner.docs.get(&key) {
            let _ = tx.send(InboundEvent::Snapshot(doc.clone()));
        }
        inner.subscribers.push((key, tx));
        Ok(Subscription::new(rx))
    }

    fn write(&self, key: &StoreKey, payload: &str) -> Result<(), SyncError> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(SyncError::Write {
                key: key.to_string(),
                source: std::io::Error::other("store unavailable"),
            });
        }
        inner.writes += 1;
        inner.publish(&key.to_string(), payload);
        Ok(())
    }

    fn list_trees(&self, account: &str) -> Result<Vec<String>, SyncError> {
        let prefix = StoreKey::account_prefix(account);
        Ok(self
            .lock()
            .docs
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .map(str::to_string)
            .collect())
    }

    fn remove(&self, key: &StoreKey) -> Result<(), SyncError> {
        self.lock().docs.remove(&key.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Directory-backed store
// ---------------------------------------------------------------------------

/// Store laid out as `{root}/users/{account}/tree/{tree}.json`. Processes
/// sharing `root` see each other's writes through a filesystem watcher.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn tree_dir(&self, account: &str) -> PathBuf {
        self.root.join("users").join(account).join("tree")
    }

    pub fn path_for(&self, key: &StoreKey) -> PathBuf {
        self.tree_dir(key.account())
            .join(format!("{}.json", key.tree()))
    }

    /// Current document at `key`, if any.
    pub fn read(&self, key: &StoreKey) -> Result<Option<String>, SyncError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(doc) => Ok(Some(doc)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::Read {
                key: key.to_string(),
                source: e,
            }),
        }
    }

    fn ensure_dir(&self, key: &StoreKey) -> Result<(), SyncError> {
        fs::create_dir_all(self.tree_dir(key.account())).map_err(|e| SyncError::Write {
            key: key.to_string(),
            source: e,
        })
    }
}

impl RemoteStore for FileStore {
    fn subscribe(&self, key: &StoreKey) -> Result<Subscription, SyncError> {
        self.ensure_dir(key)?;
        let path = self.path_for(key);
        let (tx, rx) = mpsc::channel();

        // Watch before reading so no write can fall between the two
        let watcher = SnapshotWatcher::start(&path, key.to_string(), tx.clone()).map_err(
            |e| SyncError::Watch {
                path: path.clone(),
                source: e,
            },
        )?;

        match fs::read_to_string(&path) {
            Ok(doc) => {
                let _ = tx.send(InboundEvent::Snapshot(doc));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(SyncError::Read {
                    key: key.to_string(),
                    source: e,
                });
            }
        }
        debug!(key = %key, path = %path.display(), "subscribed");
        Ok(Subscription::with_guard(rx, watcher))
    }

    fn write(&self, key: &StoreKey, payload: &str) -> Result<(), SyncError> {
        self.ensure_dir(key)?;
        let path = self.path_for(key);
        let _lock = FileLock::acquire_default(&path)?;
        atomic_write(&path, payload.as_bytes()).map_err(|e| SyncError::Write {
            key: key.to_string(),
            source: e,
        })
    }

    fn list_trees(&self, account: &str) -> Result<Vec<String>, SyncError> {
        let dir = self.tree_dir(account);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(SyncError::Read {
                    key: StoreKey::account_prefix(account),
                    source: e,
                });
            }
        };

        let mut trees: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();
        trees.sort();
        Ok(trees)
    }

    fn remove(&self, key: &StoreKey) -> Result<(), SyncError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::Write {
                key: key.to_string(),
                source: e,
            }),
        }
    }
}
