/// File organization engine.
///
/// Walks one or more directories, resolves a destination name for every file
/// through the [`RuleMatcher`], and moves each file into a subdirectory of that
/// name next to it. Every directory creation and move is recorded in the run's
/// history log so it can be undone later.
use crate::config::ConfigError;
use crate::file_category::{MatchError, RuleMatcher, file_suffix};
use crate::history::{HistoryEntry, HistoryError, HistoryWriter};
use crate::path_guard::{AccessError, PathGuard};
use glob::Pattern;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{MAIN_SEPARATOR, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use walkdir::{DirEntry, WalkDir};

/// Errors that can occur during file organization.
///
/// [`Metadata`](Self::Metadata), [`DirectoryCreationFailed`](Self::DirectoryCreationFailed)
/// and [`FileMoveFailed`](Self::FileMoveFailed) concern a single file and are
/// counted in the report; every other variant aborts the run.
#[derive(Debug, Error)]
pub enum OrganizeError {
    #[error("invalid directory '{}': {reason}", .path.display())]
    InvalidRoot { path: PathBuf, reason: String },

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error("none of the given directories can be organized")]
    NoValidRoots,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid category configuration: {0}")]
    Match(#[from] MatchError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error("failed to read metadata of {}: {source}", .path.display())]
    Metadata { path: PathBuf, source: io::Error },

    #[error("failed to create directory {}: {source}", .path.display())]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },

    #[error("failed to move {} to {}: {source}", .from.display(), .to.display())]
    FileMoveFailed {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
}

impl OrganizeError {
    /// True for errors that must stop the whole run.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Metadata { .. } | Self::DirectoryCreationFailed { .. } | Self::FileMoveFailed { .. }
        )
    }
}

/// Result type for file organization operations.
pub type OrganizeResult<T> = Result<T, OrganizeError>;

/// How a directory is traversed and whether changes are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct OrganizeOptions {
    /// Report intended actions without touching the filesystem or history.
    pub dry_run: bool,
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Include files and directories whose name starts with `.`.
    pub include_hidden: bool,
    /// Glob matched against file names, or against the path relative to the
    /// organized directory when it contains a separator.
    pub pattern: String,
    /// Maximum subdirectory depth when recursive; negative means unlimited.
    pub depth: i32,
}

impl Default for OrganizeOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            recursive: false,
            include_hidden: false,
            pattern: "*".to_string(),
            depth: -1,
        }
    }
}

/// Counts and records produced by an organize run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrganizeReport {
    /// Files moved (or that would be moved in a dry run).
    pub moved: usize,
    /// Directories created (or that would be created).
    pub created: usize,
    /// Per-file failures.
    pub errors: usize,
    /// Lowercase suffixes of every processed file.
    pub suffixes: BTreeSet<String>,
    pub created_dirs: Vec<PathBuf>,
    /// Files per destination name.
    pub per_destination: BTreeMap<String, usize>,
    /// History file written by the run, if anything was recorded.
    pub history_file: Option<PathBuf>,
}

impl OrganizeReport {
    /// Folds another directory's report into this one.
    pub fn merge(&mut self, other: OrganizeReport) {
        self.moved += other.moved;
        self.created += other.created;
        self.errors += other.errors;
        self.suffixes.extend(other.suffixes);
        self.created_dirs.extend(other.created_dirs);
        for (destination, count) in other.per_destination {
            *self.per_destination.entry(destination).or_default() += count;
        }
        if other.history_file.is_some() {
            self.history_file = other.history_file;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.moved == 0 && self.created == 0 && self.errors == 0
    }
}

/// Receives progress notifications while a run is in flight.
///
/// Calls are made synchronously from the traversal loop.
pub trait ProgressObserver {
    fn on_directory_start(&mut self, _root: &Path, _dry_run: bool) {}
    fn on_file(&mut self, _file: &Path, _destination: &str) {}
    fn on_dir_created(&mut self, _dir: &Path) {}
    fn on_error(&mut self, _path: &Path, _message: &str) {}
    fn on_skipped_root(&mut self, _root: &Path, _reason: &str) {}
    fn on_directory_done(&mut self, _root: &Path, _report: &OrganizeReport) {}
}

/// Observer that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {}

/// State shared by every directory of one run: the history log and the paths
/// the run has already produced.
///
/// The history file is only created once the first entry is recorded, so a
/// run that changes nothing leaves no history behind. Directories created and
/// files placed by the run are remembered across directories, so nested or
/// overlapping roots never process the same file twice.
#[derive(Debug)]
pub struct RunLog {
    dir: PathBuf,
    writer: Option<HistoryWriter>,
    /// Destination directories known to exist (or to be created in a dry run).
    known_dirs: HashSet<PathBuf>,
    /// Directories created by this run; their contents are never re-processed.
    created_dirs: Vec<PathBuf>,
    /// Files this run already placed (or, in a dry run, already visited).
    handled: HashSet<PathBuf>,
}

impl RunLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            writer: None,
            known_dirs: HashSet::new(),
            created_dirs: Vec::new(),
            handled: HashSet::new(),
        }
    }

    pub fn record(&mut self, entry: HistoryEntry) -> Result<(), HistoryError> {
        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => HistoryWriter::create(&self.dir)?,
        };
        self.writer.insert(writer).record(entry)
    }

    /// Closes the log and returns its path if anything was recorded.
    pub fn seal(self) -> Result<Option<PathBuf>, HistoryError> {
        match self.writer {
            Some(writer) => writer.seal(),
            None => Ok(None),
        }
    }

    /// True for paths this run produced or already dealt with.
    fn already_handled(&self, path: &Path) -> bool {
        self.handled.contains(path) || self.created_dirs.iter().any(|dir| path.starts_with(dir))
    }
}

/// Moves files into category directories.
///
/// # Examples
///
/// ```no_run
/// use sortdir::config::Settings;
/// use sortdir::file_category::RuleMatcher;
/// use sortdir::file_organizer::{NoProgress, OrganizeOptions, Organizer, RunLog};
/// use std::path::Path;
///
/// let settings = Settings::default();
/// let matcher = RuleMatcher::new(&settings)?;
/// let mut organizer = Organizer::new(matcher, OrganizeOptions::default())?;
///
/// let mut log = RunLog::new(settings.history_dir());
/// let report = organizer.organize(Path::new("/home/me/Downloads"), &mut log, &mut NoProgress)?;
/// log.seal()?;
/// println!("moved {} files", report.moved);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Organizer {
    matcher: RuleMatcher,
    options: OrganizeOptions,
    pattern: Pattern,
    pattern_on_path: bool,
}

impl Organizer {
    /// Creates an organizer.
    ///
    /// # Errors
    ///
    /// Returns `OrganizeError::Config` if the glob pattern is invalid.
    pub fn new(matcher: RuleMatcher, options: OrganizeOptions) -> OrganizeResult<Self> {
        let pattern =
            Pattern::new(&options.pattern).map_err(|e| ConfigError::InvalidGlobPattern {
                pattern: options.pattern.clone(),
                reason: e.to_string(),
            })?;
        let pattern_on_path = options.pattern.contains('/') || options.pattern.contains(MAIN_SEPARATOR);
        Ok(Self {
            matcher,
            options,
            pattern,
            pattern_on_path,
        })
    }

    /// Organizes several directories as one run sharing one history file.
    ///
    /// Each directory is checked with `guard` first. With a single directory a
    /// failed check is returned as is; with several, failing directories are
    /// skipped and the run only fails when none is usable. The history log is
    /// sealed even when the run stops on a fatal error.
    pub fn organize_many(
        &mut self,
        roots: &[PathBuf],
        guard: &PathGuard,
        force: bool,
        history_dir: &Path,
        observer: &mut dyn ProgressObserver,
    ) -> OrganizeResult<OrganizeReport> {
        let mut valid: Vec<PathBuf> = Vec::new();
        for root in roots {
            match guard.check_access(root, force, !self.options.dry_run) {
                Ok(resolved) if valid.contains(&resolved) => {
                    warn!("Skipping duplicate directory {}", root.display());
                }
                Ok(resolved) => valid.push(resolved),
                Err(e) if roots.len() == 1 => return Err(e.into()),
                Err(e) => {
                    warn!("Skipping {}: {}", root.display(), e);
                    observer.on_skipped_root(root, &e.to_string());
                }
            }
        }
        if valid.is_empty() {
            return Err(OrganizeError::NoValidRoots);
        }

        let mut log = RunLog::new(history_dir);
        let mut total = OrganizeReport::default();
        let mut outcome = Ok(());
        for root in &valid {
            let mut report = OrganizeReport::default();
            outcome = self.organize_into(root, &mut log, &mut report, observer);
            total.merge(report);
            if outcome.is_err() {
                break;
            }
        }

        match log.seal() {
            Ok(path) => total.history_file = path,
            Err(e) if outcome.is_ok() => outcome = Err(e.into()),
            Err(e) => error!("Failed to seal history log: {}", e),
        }

        if outcome.is_err() {
            warn!(
                "Run stopped after moving {} files and creating {} directories{}",
                total.moved,
                total.created,
                total
                    .history_file
                    .as_ref()
                    .map(|path| format!("; history saved to {}", path.display()))
                    .unwrap_or_default()
            );
        }
        outcome.map(|()| total)
    }

    /// Organizes a single directory, appending to `log`.
    ///
    /// # Errors
    ///
    /// Fails when `root` is not a directory, when a reached size variant has no
    /// name, or when the history log cannot be written. Failures on individual
    /// files are counted in [`OrganizeReport::errors`] instead.
    pub fn organize(
        &mut self,
        root: &Path,
        log: &mut RunLog,
        observer: &mut dyn ProgressObserver,
    ) -> OrganizeResult<OrganizeReport> {
        let mut report = OrganizeReport::default();
        self.organize_into(root, log, &mut report, observer)?;
        Ok(report)
    }

    /// Does the work of [`organize`](Self::organize), leaving partial counts
    /// in `report` when a fatal error stops the directory.
    fn organize_into(
        &mut self,
        root: &Path,
        log: &mut RunLog,
        report: &mut OrganizeReport,
        observer: &mut dyn ProgressObserver,
    ) -> OrganizeResult<()> {
        if !root.is_dir() {
            return Err(OrganizeError::InvalidRoot {
                path: root.to_path_buf(),
                reason: "not an existing directory".to_string(),
            });
        }

        info!(
            "{} {}",
            if self.options.dry_run {
                "Simulating organization of"
            } else {
                "Organizing"
            },
            root.display()
        );
        observer.on_directory_start(root, self.options.dry_run);

        let outcome = self.walk(root, log, report, observer);
        if outcome.is_ok() && report.moved == 0 && report.errors == 0 {
            info!(
                "No files found matching pattern '{}' in {}",
                self.options.pattern,
                root.display()
            );
        }

        observer.on_directory_done(root, report);
        outcome
    }

    fn walk(
        &mut self,
        root: &Path,
        log: &mut RunLog,
        report: &mut OrganizeReport,
        observer: &mut dyn ProgressObserver,
    ) -> OrganizeResult<()> {
        let include_hidden = self.options.include_hidden;
        let mut entries = self
            .walker(root)
            .into_iter()
            .filter_entry(move |entry| entry.depth() == 0 || include_hidden || !is_hidden(entry));

        while let Some(entry) = entries.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().unwrap_or(root).to_path_buf();
                    error!("Cannot read {}: {}", path.display(), e);
                    observer.on_error(&path, &e.to_string());
                    report.errors += 1;
                    continue;
                }
            };

            if log.already_handled(entry.path()) {
                if entry.file_type().is_dir() {
                    entries.skip_current_dir();
                }
                continue;
            }
            if !entry.file_type().is_file() || !self.matches_pattern(root, entry.path()) {
                continue;
            }

            match self.process_file(&entry, log, report, observer) {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!("Error processing file {}: {}", entry.path().display(), e);
                    observer.on_error(entry.path(), &e.to_string());
                    report.errors += 1;
                }
            }
        }
        Ok(())
    }

    fn walker(&self, root: &Path) -> WalkDir {
        let max_depth = if !self.options.recursive {
            1
        } else {
            usize::try_from(self.options.depth).map_or(usize::MAX, |depth| depth.saturating_add(1))
        };
        WalkDir::new(root)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
    }

    fn matches_pattern(&self, root: &Path, path: &Path) -> bool {
        if self.pattern_on_path {
            path.strip_prefix(root)
                .is_ok_and(|relative| self.pattern.matches_path(relative))
        } else {
            path.file_name()
                .is_some_and(|name| self.pattern.matches(&name.to_string_lossy()))
        }
    }

    fn process_file(
        &mut self,
        entry: &DirEntry,
        log: &mut RunLog,
        report: &mut OrganizeReport,
        observer: &mut dyn ProgressObserver,
    ) -> OrganizeResult<()> {
        let path = entry.path();
        let suffix = file_suffix(path);
        report.suffixes.insert(suffix.clone());

        let size = entry
            .metadata()
            .map_err(|e| OrganizeError::Metadata {
                path: path.to_path_buf(),
                source: e.into(),
            })?
            .len();
        let destination = self.matcher.categorize(&suffix, size)?;
        debug!("{} -> {}", path.display(), destination);

        let parent = path.parent().unwrap_or(Path::new("."));
        let target_dir = parent.join(&destination);
        self.ensure_dir(&target_dir, log, report, observer)?;

        let file_name = entry.file_name();
        let target = unique_target(&target_dir, Path::new(file_name));

        if self.options.dry_run {
            info!("Would move {} -> {}", path.display(), target.display());
            log.handled.insert(path.to_path_buf());
        } else {
            move_file(path, &target).map_err(|e| OrganizeError::FileMoveFailed {
                from: path.to_path_buf(),
                to: target.clone(),
                source: e,
            })?;
            info!("File moved from {} to {}", path.display(), target.display());
            log.record(HistoryEntry::move_file(&target, path))?;
            log.handled.insert(target);
        }

        report.moved += 1;
        *report.per_destination.entry(destination.clone()).or_default() += 1;
        observer.on_file(path, &destination);
        Ok(())
    }

    /// Creates `dir` unless it is already known to exist.
    fn ensure_dir(
        &self,
        dir: &Path,
        log: &mut RunLog,
        report: &mut OrganizeReport,
        observer: &mut dyn ProgressObserver,
    ) -> OrganizeResult<()> {
        if log.known_dirs.contains(dir) {
            return Ok(());
        }
        if dir.is_dir() {
            log.known_dirs.insert(dir.to_path_buf());
            return Ok(());
        }

        if self.options.dry_run {
            info!("Would create directory {}", dir.display());
        } else {
            fs::create_dir(dir).map_err(|e| OrganizeError::DirectoryCreationFailed {
                path: dir.to_path_buf(),
                source: e,
            })?;
            info!("Directory created: {}", dir.display());
            log.record(HistoryEntry::create_dir(dir))?;
        }

        log.known_dirs.insert(dir.to_path_buf());
        log.created_dirs.push(dir.to_path_buf());
        report.created += 1;
        report.created_dirs.push(dir.to_path_buf());
        observer.on_dir_created(dir);
        Ok(())
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

/// First free path for `file_name` in `dir`, trying `stem_1.ext`, `stem_2.ext`, ...
///
/// # Examples
///
/// ```no_run
/// use sortdir::file_organizer::unique_target;
/// use std::path::Path;
///
/// // With `Images/photo.jpg` already present:
/// let target = unique_target(Path::new("Images"), Path::new("photo.jpg"));
/// assert_eq!(target, Path::new("Images/photo_1.jpg"));
/// ```
pub fn unique_target(dir: &Path, file_name: &Path) -> PathBuf {
    let mut target = dir.join(file_name);
    let stem = file_name.file_stem().unwrap_or(file_name.as_os_str());
    let extension = file_name.extension();

    let mut counter: u64 = 1;
    while target.symlink_metadata().is_ok() {
        let mut candidate = OsString::from(stem);
        candidate.push(format!("_{counter}"));
        if let Some(ext) = extension {
            candidate.push(".");
            candidate.push(ext);
        }
        target = dir.join(candidate);
        counter += 1;
    }
    target
}

/// Renames `from` to `to`, copying and deleting across filesystems.
///
/// On a failed fallback the original file is left in place.
pub(crate) fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!(
                "Cross-device move of {}, copying instead of renaming",
                from.display()
            );
            copy_then_remove(from, to)
        }
        Err(e) => Err(e),
    }
}

/// Copies `from` to `to`, then deletes `from`. Any partial copy is removed
/// again if either step fails.
fn copy_then_remove(from: &Path, to: &Path) -> io::Result<()> {
    if let Err(e) = fs::copy(from, to) {
        let _ = fs::remove_file(to);
        return Err(e);
    }
    if let Err(e) = fs::remove_file(from) {
        let _ = fs::remove_file(to);
        return Err(e);
    }
    Ok(())
}
