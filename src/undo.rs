/// Undo functionality for reverting file organization runs.
///
/// The newest history file is streamed entry by entry, then its successful
/// moves are reversed newest first whenever that can be done without
/// overwriting anything. The directories the run created are collected for a
/// separate cleanup pass that removes them children first.
use crate::file_organizer::move_file;
use crate::history::{
    HistoryEntry, HistoryError, latest_history, read_element_at, stream_history,
};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Suffix given to a history file once it has been fully undone.
pub const UNDONE_SUFFIX: &str = ".undone";

/// Represents the result of an undo pass.
#[derive(Debug, Clone, Default)]
pub struct UndoReport {
    /// The history file that was replayed.
    pub history_file: PathBuf,
    /// Number of files moved back to their original location.
    pub moved_back: usize,
    /// Files that could not be restored, with the reason.
    pub failed_restores: Vec<(PathBuf, String)>,
    /// Entries intentionally left alone, with the reason.
    pub skipped: Vec<(PathBuf, String)>,
    /// Directories created by the run, in creation order.
    pub directories_to_remove: Vec<PathBuf>,
    /// The history file ended before its closing bracket.
    pub truncated: bool,
}

impl UndoReport {
    fn new(history_file: &Path) -> Self {
        Self {
            history_file: history_file.to_path_buf(),
            ..Self::default()
        }
    }

    pub fn errors(&self) -> usize {
        self.failed_restores.len()
    }

    /// True when no entry failed. Skipped entries do not count as failures.
    pub fn is_complete_success(&self) -> bool {
        self.failed_restores.is_empty()
    }

    fn skip(&mut self, path: &Path, reason: impl Into<String>) {
        let reason = reason.into();
        warn!("Skipping {}: {}", path.display(), reason);
        self.skipped.push((path.to_path_buf(), reason));
    }
}

/// Result of removing the directories a run created.
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    /// Directories left in place (missing, not empty, or not removable).
    pub skipped: Vec<(PathBuf, String)>,
}

/// Manages undo operations for file organization.
pub struct UndoManager;

impl UndoManager {
    /// Reverts the most recent run recorded in `history_dir`.
    ///
    /// Returns `Ok(None)` when there is no history to undo.
    pub fn undo_latest(history_dir: &Path) -> Result<Option<UndoReport>, HistoryError> {
        match latest_history(history_dir)? {
            Some(history_file) => Self::undo(&history_file).map(Some),
            None => {
                info!("No history found in {}", history_dir.display());
                Ok(None)
            }
        }
    }

    /// Reverses every successful move recorded in `history_file`, newest
    /// first.
    ///
    /// A first pass streams the file, collecting created directories and the
    /// byte offset of every successful move. The moves are then re-read one
    /// at a time from those offsets in reverse, so a move that reused a path
    /// vacated by an earlier one is undone before it. Directories are not
    /// removed here; pass [`UndoReport::directories_to_remove`] to
    /// [`remove_created_dirs`](Self::remove_created_dirs) afterwards.
    ///
    /// # Edge Cases Handled
    ///
    /// * **Entry not successful**: skipped
    /// * **File no longer at its new location**: skipped
    /// * **Original location taken**: skipped, nothing is overwritten
    /// * **Unreadable entry or failed move**: recorded as a failure
    /// * **Truncated history**: entries up to the cut are processed
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sortdir::undo::UndoManager;
    /// use std::path::Path;
    ///
    /// let report = UndoManager::undo(Path::new("logs/history_20240101_120000.json"))?;
    /// println!("Restored {} files", report.moved_back);
    /// let cleanup = UndoManager::remove_created_dirs(&report.directories_to_remove);
    /// println!("Removed {} directories", cleanup.removed.len());
    /// # Ok::<(), sortdir::history::HistoryError>(())
    /// ```
    pub fn undo(history_file: &Path) -> Result<UndoReport, HistoryError> {
        info!("Undoing run recorded in {}", history_file.display());
        let mut report = UndoReport::new(history_file);
        let mut entries = stream_history(history_file)?;
        let mut moves = Vec::new();

        while let Some(entry) = entries.next() {
            match entry {
                Ok(entry) if !entry.is_success() => {
                    let path = match &entry {
                        HistoryEntry::CreateDir { path, .. } => path,
                        HistoryEntry::MoveFile { moved_to, .. } => moved_to,
                    };
                    report.skip(path, "entry was not recorded as successful");
                }
                Ok(HistoryEntry::CreateDir { path, .. }) => {
                    report.directories_to_remove.push(path);
                }
                Ok(HistoryEntry::MoveFile { .. }) => {
                    if let Some(offset) = entries.element_offset() {
                        moves.push(offset);
                    }
                }
                Err(e) => {
                    warn!("Unreadable history entry in {}: {}", history_file.display(), e);
                    report
                        .failed_restores
                        .push((history_file.to_path_buf(), e.to_string()));
                }
            }
        }

        report.truncated = entries.is_truncated();
        if report.truncated {
            warn!(
                "History file {} is incomplete; undoing entries up to the cut",
                history_file.display()
            );
        }
        drop(entries);

        let mut source = BufReader::new(File::open(history_file)?);
        for offset in moves.into_iter().rev() {
            match read_element_at::<_, HistoryEntry>(&mut source, offset) {
                Ok(HistoryEntry::MoveFile {
                    moved_to,
                    moved_from,
                    ..
                }) => Self::restore_file(&moved_to, &moved_from, &mut report),
                Ok(HistoryEntry::CreateDir { path, .. }) => report.failed_restores.push((
                    path,
                    "history file changed while it was being undone".to_string(),
                )),
                Err(e) => {
                    warn!("Cannot re-read history entry at byte {}: {}", offset, e);
                    report
                        .failed_restores
                        .push((history_file.to_path_buf(), e.to_string()));
                }
            }
        }
        Ok(report)
    }

    fn restore_file(moved_to: &Path, moved_from: &Path, report: &mut UndoReport) {
        if moved_to.symlink_metadata().is_err() {
            report.skip(moved_to, "file not found at its organized location");
            return;
        }
        if moved_from.symlink_metadata().is_ok() {
            report.skip(
                moved_to,
                format!("original location {} is taken", moved_from.display()),
            );
            return;
        }

        match move_file(moved_to, moved_from) {
            Ok(()) => {
                info!(
                    "Restored {} to {}",
                    moved_to.display(),
                    moved_from.display()
                );
                report.moved_back += 1;
            }
            Err(e) => {
                warn!("Failed to restore {}: {}", moved_to.display(), e);
                report
                    .failed_restores
                    .push((moved_to.to_path_buf(), format!("Failed to restore file: {e}")));
            }
        }
    }

    /// Removes `dirs` in reverse order, leaving non-empty or missing ones alone.
    pub fn remove_created_dirs(dirs: &[PathBuf]) -> CleanupReport {
        let mut cleanup = CleanupReport::default();
        for dir in dirs.iter().rev() {
            let occupied = fs::read_dir(dir).map(|mut children| children.next().is_some());
            let reason = match occupied {
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    Some("directory no longer exists".to_string())
                }
                Ok(true) => Some("directory is not empty".to_string()),
                _ => fs::remove_dir(dir).err().map(|e| e.to_string()),
            };

            match reason {
                None => {
                    info!("Removed directory {}", dir.display());
                    cleanup.removed.push(dir.clone());
                }
                Some(reason) => {
                    warn!("Keeping directory {}: {}", dir.display(), reason);
                    cleanup.skipped.push((dir.clone(), reason));
                }
            }
        }
        cleanup
    }

    /// Renames a consumed history file so the next undo targets the run
    /// before it.
    pub fn archive(history_file: &Path) -> io::Result<PathBuf> {
        let mut archived = history_file.as_os_str().to_os_string();
        archived.push(UNDONE_SUFFIX);
        let archived = PathBuf::from(archived);
        fs::rename(history_file, &archived)?;
        info!("Archived history file as {}", archived.display());
        Ok(archived)
    }

    /// Undoes the latest run, removes its directories and archives its history
    /// when no entry failed.
    pub fn undo_and_clean(
        history_dir: &Path,
    ) -> Result<Option<(UndoReport, CleanupReport)>, HistoryError> {
        let Some(report) = Self::undo_latest(history_dir)? else {
            return Ok(None);
        };
        let cleanup = Self::remove_created_dirs(&report.directories_to_remove);

        if report.is_complete_success()
            && let Err(e) = Self::archive(&report.history_file)
        {
            warn!(
                "Could not archive history file {}: {}",
                report.history_file.display(),
                e
            );
        }
        Ok(Some((report, cleanup)))
    }
}
