//! Run history: the append-only record of every mutation an organize run
//! performs, and the discovery/streaming side used by undo.
//!
//! One file per run, named `history_<YYYYMMDD_HHMMSS>.json`, holding a JSON
//! array that grows in batches. A second run within the same second gets a
//! `_<n>` sequence suffix so files never collide.

pub mod stream;

pub use stream::{JsonArrayReader, JsonArrayWriter, read_element_at};

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Entries buffered in memory before they are appended to disk.
pub const BATCH_SIZE: usize = 50;

const HISTORY_PREFIX: &str = "history_";
const HISTORY_EXTENSION: &str = ".json";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const TIMESTAMP_LEN: usize = 15;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("history JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed history file: {0}")]
    Malformed(String),

    #[error("history log is already sealed")]
    Sealed,
}

/// Outcome recorded for an entry. Only successful entries are undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryStatus {
    Success,
    #[default]
    Failed,
}

impl Serialize for EntryStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(match self {
            EntryStatus::Success => "success",
            EntryStatus::Failed => "failed",
        })
    }
}

impl<'de> Deserialize<'de> for EntryStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(match raw.as_deref() {
            Some("success") => EntryStatus::Success,
            _ => EntryStatus::Failed,
        })
    }
}

/// One recorded mutation.
///
/// For moves, `moved_to` is where the file lives after the run and
/// `moved_from` where it lived before; undo moves it from the first back to
/// the second. Older logs named these `source` and `destination`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HistoryEntry {
    CreateDir {
        #[serde(default)]
        timestamp: String,
        path: PathBuf,
        #[serde(default)]
        status: EntryStatus,
    },
    MoveFile {
        #[serde(default)]
        timestamp: String,
        #[serde(alias = "source")]
        moved_to: PathBuf,
        #[serde(alias = "destination")]
        moved_from: PathBuf,
        #[serde(default)]
        original_name: String,
        #[serde(default)]
        status: EntryStatus,
    },
}

impl HistoryEntry {
    pub fn create_dir(path: impl Into<PathBuf>) -> Self {
        HistoryEntry::CreateDir {
            timestamp: now_rfc3339(),
            path: path.into(),
            status: EntryStatus::Success,
        }
    }

    pub fn move_file(moved_to: impl Into<PathBuf>, moved_from: impl Into<PathBuf>) -> Self {
        let moved_from = moved_from.into();
        let original_name = moved_from
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        HistoryEntry::MoveFile {
            timestamp: now_rfc3339(),
            moved_to: moved_to.into(),
            moved_from,
            original_name,
            status: EntryStatus::Success,
        }
    }

    pub fn status(&self) -> EntryStatus {
        match self {
            HistoryEntry::CreateDir { status, .. } | HistoryEntry::MoveFile { status, .. } => {
                *status
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == EntryStatus::Success
    }
}

fn now_rfc3339() -> String {
    Local::now().to_rfc3339()
}

/// Ordering key parsed from a history file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HistoryName {
    pub timestamp: NaiveDateTime,
    pub sequence: u32,
}

/// Parses `history_<YYYYMMDD_HHMMSS>.json` or `history_<YYYYMMDD_HHMMSS>_<n>.json`.
///
/// # Examples
///
/// ```
/// use sortdir::history::parse_history_name;
///
/// let first = parse_history_name("history_20240131_235959.json").unwrap();
/// let second = parse_history_name("history_20240131_235959_1.json").unwrap();
/// assert!(second > first);
/// assert!(parse_history_name("history_latest.json").is_none());
/// ```
pub fn parse_history_name(file_name: &str) -> Option<HistoryName> {
    let stem = file_name
        .strip_prefix(HISTORY_PREFIX)?
        .strip_suffix(HISTORY_EXTENSION)?;
    let stamp = stem.get(..TIMESTAMP_LEN)?;
    let rest = stem.get(TIMESTAMP_LEN..)?;

    let sequence = if rest.is_empty() {
        0
    } else {
        rest.strip_prefix('_')?.parse().ok()?
    };
    let timestamp = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
    Some(HistoryName {
        timestamp,
        sequence,
    })
}

fn history_file_name(stamp: &str, sequence: u32) -> String {
    if sequence == 0 {
        format!("{HISTORY_PREFIX}{stamp}{HISTORY_EXTENSION}")
    } else {
        format!("{HISTORY_PREFIX}{stamp}_{sequence}{HISTORY_EXTENSION}")
    }
}

/// Lists history files in `dir`, oldest first.
///
/// A missing directory yields an empty list.
pub fn list_histories(dir: &Path) -> Result<Vec<(HistoryName, PathBuf)>, HistoryError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        if let Some(name) = file_name.to_str().and_then(parse_history_name) {
            found.push((name, entry.path()));
        }
    }
    found.sort();
    Ok(found)
}

/// Returns the newest history file in `dir`, if any.
pub fn latest_history(dir: &Path) -> Result<Option<PathBuf>, HistoryError> {
    Ok(list_histories(dir)?.pop().map(|(_, path)| path))
}

/// Opens a history file for lazy, entry-by-entry reading.
pub fn stream_history(
    path: &Path,
) -> Result<JsonArrayReader<BufReader<File>, HistoryEntry>, HistoryError> {
    let file = File::open(path)?;
    Ok(JsonArrayReader::new(BufReader::new(file)))
}

/// Batching writer for one run's history file.
///
/// Entries are buffered and appended every [`BATCH_SIZE`] records, then the
/// file is flushed, so an interrupted run loses at most one batch. The file is
/// a valid JSON array prefix at every point and a complete array once
/// [`seal`](Self::seal) runs. Dropping an unsealed writer flushes the pending
/// batch but leaves the array open.
#[derive(Debug)]
pub struct HistoryWriter {
    path: PathBuf,
    array: Option<JsonArrayWriter<BufWriter<File>>>,
    pending: Vec<HistoryEntry>,
    batch_size: usize,
}

impl HistoryWriter {
    /// Creates a new history file in `dir`, named after the current time.
    pub fn create(dir: &Path) -> Result<Self, HistoryError> {
        Self::create_at(dir, Local::now().naive_local())
    }

    /// Creates a new history file in `dir` named after `started`.
    ///
    /// If that name is taken, the next free `_<n>` sequence is used.
    pub fn create_at(dir: &Path, started: NaiveDateTime) -> Result<Self, HistoryError> {
        fs::create_dir_all(dir)?;
        let stamp = started.format(TIMESTAMP_FORMAT).to_string();

        let mut sequence = 0;
        loop {
            let path = dir.join(history_file_name(&stamp, sequence));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    let array = JsonArrayWriter::begin(BufWriter::new(file))?;
                    info!("Started history log {}", path.display());
                    return Ok(Self {
                        path,
                        array: Some(array),
                        pending: Vec::with_capacity(BATCH_SIZE),
                        batch_size: BATCH_SIZE,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => sequence += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries already appended to the file.
    pub fn written(&self) -> usize {
        self.array.as_ref().map_or(0, JsonArrayWriter::len)
    }

    /// Entries waiting for the next batch append.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Buffers one entry, appending the batch once it is full.
    pub fn record(&mut self, entry: HistoryEntry) -> Result<(), HistoryError> {
        if self.array.as_ref().is_none_or(JsonArrayWriter::is_sealed) {
            return Err(HistoryError::Sealed);
        }
        self.pending.push(entry);
        if self.pending.len() >= self.batch_size {
            self.flush_batch()?;
        }
        Ok(())
    }

    /// Appends `entries` to the file and flushes it.
    pub fn append_batch(&mut self, entries: &[HistoryEntry]) -> Result<(), HistoryError> {
        let array = self.array.as_mut().ok_or(HistoryError::Sealed)?;
        for entry in entries {
            array.push(entry)?;
        }
        array.flush()?;
        debug!(
            "Appended {} entries to {}",
            entries.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Appends whatever is buffered.
    pub fn flush_batch(&mut self) -> Result<(), HistoryError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.pending);
        self.append_batch(&batch)
    }

    /// Appends the last batch and closes the array.
    ///
    /// Returns the file path, or `None` when the run recorded nothing, in
    /// which case the file is removed.
    pub fn seal(mut self) -> Result<Option<PathBuf>, HistoryError> {
        self.flush_batch()?;
        let mut array = self.array.take().ok_or(HistoryError::Sealed)?;

        if array.is_empty() {
            drop(array);
            fs::remove_file(&self.path)?;
            debug!("Removed empty history log {}", self.path.display());
            return Ok(None);
        }

        array.finish()?;
        info!(
            "Sealed history log {} ({} entries)",
            self.path.display(),
            array.len()
        );
        Ok(Some(self.path.clone()))
    }
}

impl Drop for HistoryWriter {
    fn drop(&mut self) {
        if self.array.is_some()
            && let Err(e) = self.flush_batch()
        {
            warn!(
                "Failed to flush pending history entries to {}: {}",
                self.path.display(),
                e
            );
        }
    }
}
