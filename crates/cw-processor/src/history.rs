//! Capacity-bounded, crash-resistant command history.
//!
//! Stored as one JSON array. Loading never fails: a file that does not
//! parse is copied to `<path>.backup`, replaced by an empty array, and the
//! history starts empty. Entries that fail to deserialize or validate are
//! dropped one by one.
//! Saving writes a sibling temporary file and renames it over the target,
//! so a crash mid-write leaves the previous file intact.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use thiserror::Error;

use cw_protocol::HistoryEntry;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("history serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid history entry {index}: {reason}")]
    Invalid { index: usize, reason: String },
}

pub type HistoryResult<T> = Result<T, HistoryError>;

/// `<path>.backup`
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".backup");
    PathBuf::from(name)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(format!(".tmp.{}", std::process::id()));
    PathBuf::from(name)
}

pub struct HistoryStore {
    path: Option<PathBuf>,
    max_entries: usize,
    entries: VecDeque<HistoryEntry>,
}

impl HistoryStore {
    /// A store that is never written to disk.
    pub fn in_memory(max_entries: usize) -> Self {
        Self {
            path: None,
            max_entries,
            entries: VecDeque::new(),
        }
    }

    /// Open the history at `path`, loading whatever is there.
    pub fn open(path: impl Into<PathBuf>, max_entries: usize) -> Self {
        let path = path.into();
        let entries = Self::load(&path, max_entries);
        tracing::debug!(path = %path.display(), entries = entries.len(), "history loaded");
        Self {
            path: Some(path),
            max_entries,
            entries,
        }
    }

    fn load(path: &Path, max_entries: usize) -> VecDeque<HistoryEntry> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return VecDeque::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "history unreadable, starting empty");
                return VecDeque::new();
            }
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return VecDeque::new();
        }

        let raw: Vec<serde_json::Value> = match serde_json::from_slice(&bytes) {
            Ok(raw) => raw,
            Err(e) => {
                Self::quarantine(path, &e.to_string());
                return VecDeque::new();
            }
        };

        let mut entries: VecDeque<HistoryEntry> = raw
            .into_iter()
            .enumerate()
            .filter_map(|(index, value)| {
                let checked = serde_json::from_value::<HistoryEntry>(value)
                    .map_err(|e| e.to_string())
                    .and_then(|entry| entry.validate().map(|()| entry));
                match checked {
                    Ok(entry) => Some(entry),
                    Err(reason) => {
                        tracing::warn!(index, reason = %reason, "dropping invalid history entry");
                        None
                    }
                }
            })
            .collect();
        while entries.len() > max_entries {
            entries.pop_front();
        }
        entries
    }

    /// Copy the file to `<path>.backup` and leave an empty history in its place.
    fn quarantine(path: &Path, reason: &str) {
        let backup = backup_path(path);
        if let Err(e) = std::fs::copy(path, &backup) {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "corrupt history could not be quarantined"
            );
            return;
        }
        if let Err(e) = write_atomic(path, b"[]") {
            tracing::warn!(path = %path.display(), error = %e, "empty history could not be written");
        }
        tracing::warn!(
            path = %path.display(),
            backup = %backup.display(),
            reason,
            "corrupt history quarantined"
        );
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest first.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Newest first, at most `n`.
    pub fn recent(&self, n: usize) -> Vec<HistoryEntry> {
        self.entries.iter().rev().take(n).cloned().collect()
    }

    /// Append, evicting the oldest entries past capacity, then save.
    pub fn append(&mut self, entry: HistoryEntry) -> HistoryResult<()> {
        self.entries.push_back(entry);
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
        self.save()
    }

    pub fn clear(&mut self) -> HistoryResult<()> {
        self.entries.clear();
        self.save()
    }

    /// Validate, write to a temporary sibling, rename over the target.
    pub fn save(&self) -> HistoryResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        for (index, entry) in self.entries.iter().enumerate() {
            entry
                .validate()
                .map_err(|reason| HistoryError::Invalid { index, reason })?;
        }

        let skip = self.entries.len().saturating_sub(self.max_entries);
        let bounded: Vec<&HistoryEntry> = self.entries.iter().skip(skip).collect();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(&bounded)?;
        write_atomic(path, &json)?;
        Ok(())
    }
}

/// Write a temporary sibling, then rename it over `path`.
fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp = temp_path(path);
    if let Err(e) = std::fs::write(&tmp, contents) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    std::fs::rename(&tmp, path)
}
