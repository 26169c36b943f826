use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};

use crate::io::recovery::{self, atomic_write, RecoveryCategory, RecoveryEntry};
use crate::model::snapshot::RemoteSnapshot;
use crate::model::state::TreeState;
use crate::sync::{decode_snapshot, SerializationError};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not serialize tree: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("{path} is not a tree backup: {source}")]
    Invalid {
        path: PathBuf,
        source: SerializationError,
    },
}

/// `TaskTree_{name}_Backup_{YYYYMMDDHHmm}.json`, or without the name part
/// for an unnamed tree. Path separators in the name become underscores.
pub fn backup_file_name<Tz: TimeZone>(tree_name: &str, at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let stamp = at.format("%Y%m%d%H%M");
    let name: String = tree_name
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    if name.is_empty() {
        format!("TaskTree_Backup_{stamp}.json")
    } else {
        format!("TaskTree_{name}_Backup_{stamp}.json")
    }
}

/// Write the tree to `path` in the snapshot shape.
pub fn export_to_file(state: &TreeState, path: &Path) -> Result<(), ExportError> {
    let snapshot = state.to_snapshot(chrono::Utc::now().timestamp_millis());
    let json = serde_json::to_string_pretty(&snapshot)?;
    atomic_write(path, json.as_bytes()).map_err(|e| ExportError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Write the tree into `dir` under its suggested backup name.
pub fn export_to_dir<Tz: TimeZone>(
    state: &TreeState,
    dir: &Path,
    at: &DateTime<Tz>,
) -> Result<PathBuf, ExportError>
where
    Tz::Offset: std::fmt::Display,
{
    fs::create_dir_all(dir).map_err(|e| ExportError::WriteError {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let path = dir.join(backup_file_name(&state.current_tree_name, at));
    export_to_file(state, &path)?;
    Ok(path)
}

/// Read and validate a backup. Rejected files are noted in the recovery log
/// under `recovery_dir` when one is given.
pub fn import_file(path: &Path, recovery_dir: Option<&Path>) -> Result<RemoteSnapshot, ExportError> {
    let raw = fs::read_to_string(path).map_err(|e| ExportError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    decode_snapshot(&raw).map_err(|source| {
        if let Some(dir) = recovery_dir {
            recovery::log_recovery(
                dir,
                RecoveryEntry::new(RecoveryCategory::Import, "backup rejected")
                    .field("File", path.display())
                    .field("Error", &source),
            );
        }
        ExportError::Invalid {
            path: path.to_path_buf(),
            source,
        }
    })
}
