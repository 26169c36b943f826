use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_BACKOFF: Duration = Duration::from_millis(200);

/// Exclusive advisory lock on one stored document, held until dropped.
///
/// The lock lives in a sibling `{stem}.lock` file, so writers of different
/// trees in the same directory never wait on each other. The lock file is
/// left in place: unlinking it while another process waits on the old inode
/// would let two writers in at once.
#[derive(Debug)]
pub struct FileLock {
    _file: File,
    path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("could not open lock file {path}: {source}")]
    CreateError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path} still locked after {waited:?}: another tt process is writing")]
    Timeout { path: PathBuf, waited: Duration },
}

impl FileLock {
    /// Lock the document at `doc`, retrying with growing pauses for up to
    /// `timeout`.
    pub fn acquire(doc: &Path, timeout: Duration) -> Result<Self, LockError> {
        let path = lock_path_for(doc);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| LockError::CreateError {
                path: path.clone(),
                source,
            })?;

        let start = Instant::now();
        let mut pause = Duration::from_millis(5);
        while try_lock(&file).is_err() {
            let waited = start.elapsed();
            if waited >= timeout {
                return Err(LockError::Timeout { path, waited });
            }
            std::thread::sleep(pause.min(timeout - waited));
            pause = (pause * 2).min(MAX_BACKOFF);
        }
        Ok(FileLock { _file: file, path })
    }

    pub fn acquire_default(doc: &Path) -> Result<Self, LockError> {
        Self::acquire(doc, DEFAULT_TIMEOUT)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `users/u/tree/t1.json` locks through `users/u/tree/t1.lock`.
pub fn lock_path_for(doc: &Path) -> PathBuf {
    doc.with_extension("lock")
}

/// Non-blocking exclusive flock. Released when `file` is closed.
#[cfg(unix)]
fn try_lock(file: &File) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;
    // SAFETY: the descriptor is owned by `file` and open for its lifetime
    match unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } {
        0 => Ok(()),
        _ => Err(std::io::Error::last_os_error()),
    }
}

#[cfg(not(unix))]
fn try_lock(_file: &File) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lock_file_sits_next_to_document() {
        assert_eq!(
            lock_path_for(Path::new("/d/users/u/tree/t1.json")),
            PathBuf::from("/d/users/u/tree/t1.lock")
        );
    }

    #[test]
    fn relock_after_drop() {
        let tmp = TempDir::new().unwrap();
        let doc = tmp.path().join("t1.json");
        let lock = FileLock::acquire_default(&doc).unwrap();
        assert!(lock.path().exists());
        drop(lock);
        assert!(FileLock::acquire(&doc, Duration::from_millis(50)).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn contention_times_out() {
        let tmp = TempDir::new().unwrap();
        let doc = tmp.path().join("t1.json");
        let _held = FileLock::acquire_default(&doc).unwrap();
        let err = FileLock::acquire(&doc, Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, LockError::Timeout { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn other_documents_do_not_contend() {
        let tmp = TempDir::new().unwrap();
        let _held = FileLock::acquire_default(&tmp.path().join("t1.json")).unwrap();
        assert!(FileLock::acquire(&tmp.path().join("t2.json"), Duration::from_millis(50)).is_ok());
    }
}
