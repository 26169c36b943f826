//! Append-only log of tree payloads that would otherwise be lost.
//!
//! Each entry is a markdown section: a `## {timestamp} | {category}: {what}`
//! header, `Key: value` fields, the payload in a fenced `json` block, and a
//! closing `---`. The file stays readable in any editor and is parsed back by
//! `tt recovery`.

use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::io::lock::FileLock;

const LOG_FILE: &str = ".recovery.log";

/// Appends that would grow the log past this drop the oldest entries first.
const MAX_LOG_BYTES: usize = 1 << 20;

/// Entries older than this are removed by a default prune.
pub const PRUNE_AGE_DAYS: i64 = 30;

const PREAMBLE: &str = "\
<!-- tasktrees recovery log
     Tree snapshots that could not be saved or applied end up here.
     View with: tt recovery
     Prune old entries: tt recovery prune
     Safe to delete if empty or stale. -->

---
";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryCategory {
    /// A local snapshot the store refused
    Write,
    /// An inbound snapshot that was discarded
    Inbound,
    /// An import file that failed validation
    Import,
}

impl RecoveryCategory {
    fn as_str(self) -> &'static str {
        match self {
            RecoveryCategory::Write => "write",
            RecoveryCategory::Inbound => "inbound",
            RecoveryCategory::Import => "import",
        }
    }

    pub fn parse_category(s: &str) -> Option<Self> {
        [Self::Write, Self::Inbound, Self::Import]
            .into_iter()
            .find(|c| c.as_str() == s)
    }
}

impl fmt::Display for RecoveryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryEntry {
    pub timestamp: DateTime<Utc>,
    pub category: RecoveryCategory,
    pub description: String,
    pub fields: IndexMap<String, String>,
    pub body: String,
}

impl RecoveryEntry {
    pub fn new(category: RecoveryCategory, description: impl Into<String>) -> Self {
        RecoveryEntry {
            timestamp: Utc::now(),
            category,
            description: description.into(),
            fields: IndexMap::new(),
            body: String::new(),
        }
    }

    pub fn field(mut self, key: &str, value: impl fmt::Display) -> Self {
        // Fields are one line each
        let value = value.to_string().replace('\n', " ");
        self.fields.insert(key.to_string(), value);
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }
}

impl fmt::Display for RecoveryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "## {} | {}: {}\n",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.category,
            self.description
        )?;
        for (key, value) in &self.fields {
            writeln!(f, "{key}: {value}")?;
        }
        if !self.body.is_empty() {
            writeln!(f, "\n```json\n{}", self.body.trim_end_matches('\n'))?;
            writeln!(f, "```")?;
        }
        writeln!(f, "\n---")
    }
}

#[derive(Debug, Clone)]
pub struct RecoverySummary {
    pub entry_count: usize,
    pub oldest: Option<DateTime<Utc>>,
}

/// What `prune` removes.
#[derive(Debug, Clone, Copy)]
pub enum Prune {
    All,
    Before(DateTime<Utc>),
}

impl Prune {
    /// `--all` wins; otherwise `before`, defaulting to `PRUNE_AGE_DAYS` ago.
    pub fn from_args(before: Option<DateTime<Utc>>, all: bool) -> Self {
        match (all, before) {
            (true, _) => Prune::All,
            (false, Some(cutoff)) => Prune::Before(cutoff),
            (false, None) => Prune::Before(Utc::now() - chrono::Duration::days(PRUNE_AGE_DAYS)),
        }
    }

    fn keeps(&self, entry: &RecoveryEntry) -> bool {
        match self {
            Prune::All => false,
            Prune::Before(cutoff) => entry.timestamp >= *cutoff,
        }
    }
}

// ---------------------------------------------------------------------------
// The log file
// ---------------------------------------------------------------------------

/// The recovery log of one data directory.
#[derive(Debug, Clone)]
pub struct RecoveryLog {
    path: PathBuf,
}

impl RecoveryLog {
    pub fn new(data_dir: &Path) -> Self {
        RecoveryLog {
            path: data_dir.join(LOG_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every entry, oldest first. A missing or unreadable log is empty.
    pub fn entries(&self) -> Vec<RecoveryEntry> {
        std::fs::read_to_string(&self.path)
            .map(|text| parse_log(&text))
            .unwrap_or_default()
    }

    /// Newest first, at most `limit`, none older than `since`.
    pub fn recent(&self, limit: Option<usize>, since: Option<DateTime<Utc>>) -> Vec<RecoveryEntry> {
        self.entries()
            .into_iter()
            .rev()
            .filter(|e| since.is_none_or(|t| e.timestamp >= t))
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }

    pub fn summary(&self) -> Option<RecoverySummary> {
        let entries = self.entries();
        let oldest = entries.first()?.timestamp;
        Some(RecoverySummary {
            entry_count: entries.len(),
            oldest: Some(oldest),
        })
    }

    pub fn append(&self, entry: &RecoveryEntry) -> io::Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let _lock = FileLock::acquire_default(&self.path).map_err(io::Error::other)?;

        let size = std::fs::metadata(&self.path).map_or(0, |m| m.len() as usize);
        let text = entry.to_string();
        if size > 0 && size + text.len() > MAX_LOG_BYTES {
            let mut kept = self.entries();
            kept.push(entry.clone());
            let dropped = shrink_to_fit(&mut kept, MAX_LOG_BYTES / 2);
            debug!(dropped, "recovery log over size, dropping oldest entries");
            return self.rewrite(&kept);
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        if size == 0 {
            file.write_all(PREAMBLE.as_bytes())?;
        }
        file.write_all(text.as_bytes())
    }

    /// Remove entries, returning how many went.
    pub fn prune(&self, rule: Prune) -> io::Result<usize> {
        if !self.path.exists() {
            return Ok(0);
        }
        let _lock = FileLock::acquire_default(&self.path).map_err(io::Error::other)?;
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|e| rule.keeps(e));
        let removed = before - entries.len();
        if removed > 0 {
            self.rewrite(&entries)?;
        }
        Ok(removed)
    }

    fn rewrite(&self, entries: &[RecoveryEntry]) -> io::Result<()> {
        let mut text = String::from(PREAMBLE);
        for entry in entries {
            text.push_str(&entry.to_string());
        }
        atomic_write(&self.path, text.as_bytes())
    }
}

/// Drop the oldest entries until the rendered log fits in `budget` bytes,
/// always keeping the newest. Returns how many were dropped.
fn shrink_to_fit(entries: &mut Vec<RecoveryEntry>, budget: usize) -> usize {
    let sizes: Vec<usize> = entries.iter().map(|e| e.to_string().len()).collect();
    let mut total = PREAMBLE.len() + sizes.iter().sum::<usize>();
    let mut drop = 0;
    while total > budget && drop + 1 < entries.len() {
        total -= sizes[drop];
        drop += 1;
    }
    entries.drain(..drop);
    drop
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn parse_log(text: &str) -> Vec<RecoveryEntry> {
    let mut entries = Vec::new();
    let mut current: Option<RecoveryEntry> = None;
    let mut fenced = false;

    for line in text.lines() {
        if fenced {
            match (line, current.as_mut()) {
                ("```", _) => fenced = false,
                (_, Some(entry)) => {
                    if !entry.body.is_empty() {
                        entry.body.push('\n');
                    }
                    entry.body.push_str(line);
                }
                (_, None) => {}
            }
            continue;
        }
        if let Some(header) = line.strip_prefix("## ") {
            entries.extend(current.take());
            current = parse_entry_header(header).map(|(timestamp, category, description)| {
                RecoveryEntry {
                    timestamp,
                    category,
                    description,
                    fields: IndexMap::new(),
                    body: String::new(),
                }
            });
            continue;
        }
        let Some(entry) = current.as_mut() else {
            continue;
        };
        if line == "---" {
            entries.extend(current.take());
        } else if line.starts_with("```") {
            fenced = true;
        } else if let Some((key, value)) = line.split_once(": ") {
            entry.fields.insert(key.to_string(), value.to_string());
        }
    }
    entries.extend(current);
    entries
}

/// `{timestamp} | {category}: {description}`
fn parse_entry_header(header: &str) -> Option<(DateTime<Utc>, RecoveryCategory, String)> {
    let (timestamp, rest) = header.split_once(" | ")?;
    let timestamp = DateTime::parse_from_rfc3339(timestamp).ok()?.with_timezone(&Utc);
    let (category, description) = rest.split_once(": ")?;
    let category = RecoveryCategory::parse_category(category)?;
    Some((timestamp, category, description.to_string()))
}

// ---------------------------------------------------------------------------
// Writers
// ---------------------------------------------------------------------------

/// Append to the log in `data_dir`. A failure is reported through tracing
/// and otherwise ignored: the caller is already handling a worse error.
pub fn log_recovery(data_dir: &Path, entry: RecoveryEntry) {
    let log = RecoveryLog::new(data_dir);
    if let Err(e) = log.append(&entry) {
        warn!(path = %log.path().display(), error = %e, "could not write to recovery log");
    }
}

/// Record a snapshot the store refused to take.
pub fn log_failed_write(data_dir: &Path, key: &str, error: &dyn fmt::Display, payload: &str) {
    log_recovery(
        data_dir,
        RecoveryEntry::new(RecoveryCategory::Write, "snapshot not saved")
            .field("Key", key)
            .field("Error", error)
            .body(payload),
    );
}

/// Record an inbound snapshot that was discarded.
pub fn log_discarded_snapshot(data_dir: &Path, key: &str, error: &dyn fmt::Display, raw: &str) {
    log_recovery(
        data_dir,
        RecoveryEntry::new(RecoveryCategory::Inbound, "snapshot discarded")
            .field("Key", key)
            .field("Error", error)
            .body(raw),
    );
}

/// Replace `path` in one step: write a sibling temp file, then rename it over.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
