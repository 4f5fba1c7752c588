use clap::Parser;
use sortdir::cli::{Cli, run_cli};
use sortdir::config::Settings;
use sortdir::file_category::RuleMatcher;
use sortdir::file_organizer::{
    NoProgress, OrganizeError, OrganizeOptions, OrganizeReport, Organizer, RunLog,
};
use sortdir::history::{EntryStatus, HistoryEntry, latest_history, list_histories, stream_history};
use sortdir::path_guard::{AccessError, PathGuard};
use sortdir::undo::UndoManager;
/// Integration tests for sortdir
///
/// These tests simulate real-world usage scenarios, testing the complete
/// end-to-end functionality of organizing a directory and undoing it.
///
/// Test categories:
/// 1. Basic organization workflows
/// 2. Dry-run mode verification
/// 3. History log and undo
/// 4. Multi-directory runs
/// 5. Configuration and path safety
/// 6. Command-line entry point
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ============================================================================
// Test Utilities
// ============================================================================

/// A test fixture with a directory to organize and a separate log directory.
struct TestFixture {
    _temp_dir: TempDir,
    log_dir: TempDir,
    root: PathBuf,
}

impl TestFixture {
    /// Create a new test fixture with temporary directories.
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let log_dir = TempDir::new().expect("Failed to create log directory");
        let root = fs::canonicalize(temp_dir.path()).expect("Failed to resolve temp directory");
        TestFixture {
            _temp_dir: temp_dir,
            log_dir,
            root,
        }
    }

    /// Get the path to the test directory.
    fn path(&self) -> &Path {
        &self.root
    }

    /// Get the path to the history directory.
    fn logs(&self) -> &Path {
        self.log_dir.path()
    }

    /// Create a file with content in the test directory.
    fn create_file(&self, name: &str, content: &[u8]) {
        let file_path = self.path().join(name);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        let mut file = File::create(&file_path).expect("Failed to create file");
        file.write_all(content)
            .expect("Failed to write file content");
    }

    /// Create a file with specific content (string version).
    fn create_text_file(&self, name: &str, content: &str) {
        self.create_file(name, content.as_bytes());
    }

    /// Create a file of the given size in bytes.
    fn create_sized_file(&self, name: &str, size: usize) {
        self.create_file(name, &vec![0u8; size]);
    }

    /// Create a subdirectory in the test directory.
    fn create_subdir(&self, name: &str) {
        let dir_path = self.path().join(name);
        fs::create_dir_all(&dir_path).expect("Failed to create subdirectory");
    }

    /// Assert that a directory exists with the expected structure.
    fn assert_dir_exists(&self, rel_path: &str) {
        let path = self.path().join(rel_path);
        assert!(
            path.exists() && path.is_dir(),
            "Directory should exist: {}",
            path.display()
        );
    }

    /// Assert that a file exists at the given relative path.
    fn assert_file_exists(&self, rel_path: &str) {
        let path = self.path().join(rel_path);
        assert!(
            path.exists() && path.is_file(),
            "File should exist: {}",
            path.display()
        );
    }

    /// Assert that nothing exists at the given relative path.
    fn assert_not_exists(&self, rel_path: &str) {
        let path = self.path().join(rel_path);
        assert!(!path.exists(), "Path should not exist: {}", path.display());
    }

    /// Count directories in the test directory (non-recursive).
    fn count_dirs(&self) -> usize {
        fs::read_dir(self.path())
            .expect("Failed to read directory")
            .filter_map(|entry| entry.ok()?.metadata().ok()?.is_dir().then_some(()))
            .count()
    }

    /// Count history files in the log directory.
    fn count_histories(&self) -> usize {
        list_histories(self.logs())
            .expect("Failed to list histories")
            .len()
    }

    /// List every file and directory under the test directory, relative to it.
    fn snapshot(&self) -> Vec<PathBuf> {
        let mut entries = Vec::new();
        Self::walk_dir(self.path(), self.path(), &mut entries);
        entries.sort();
        entries
    }

    fn walk_dir(root: &Path, dir: &Path, entries: &mut Vec<PathBuf>) {
        if let Ok(children) = fs::read_dir(dir) {
            for child in children.flatten() {
                let path = child.path();
                if let Ok(relative) = path.strip_prefix(root) {
                    entries.push(relative.to_path_buf());
                }
                if path.is_dir() {
                    Self::walk_dir(root, &path, entries);
                }
            }
        }
    }

    /// Guard that allows the test directory.
    fn guard(&self) -> PathGuard {
        PathGuard::with_home(None, vec![self.path().to_path_buf()])
    }

    /// Organize the test directory with the default rules.
    fn organize(&self, options: OrganizeOptions) -> OrganizeReport {
        self.organize_with(&Settings::default(), options)
            .expect("Organization failed")
    }

    fn organize_with(
        &self,
        settings: &Settings,
        options: OrganizeOptions,
    ) -> Result<OrganizeReport, OrganizeError> {
        let matcher = RuleMatcher::new(settings)?;
        let mut organizer = Organizer::new(matcher, options)?;
        organizer.organize_many(
            &[self.path().to_path_buf()],
            &self.guard(),
            false,
            self.logs(),
            &mut NoProgress,
        )
    }

    fn history_entries(&self) -> Vec<HistoryEntry> {
        let path = latest_history(self.logs())
            .expect("Failed to scan history")
            .expect("No history written");
        stream_history(&path)
            .expect("Failed to open history")
            .collect::<Result<Vec<_>, _>>()
            .expect("Failed to read history")
    }
}

fn dry_run() -> OrganizeOptions {
    OrganizeOptions {
        dry_run: true,
        ..OrganizeOptions::default()
    }
}

fn recursive() -> OrganizeOptions {
    OrganizeOptions {
        recursive: true,
        ..OrganizeOptions::default()
    }
}

// ============================================================================
// Basic Organization Workflows
// ============================================================================

#[test]
fn test_organize_empty_directory() {
    let fixture = TestFixture::new();

    let report = fixture.organize(OrganizeOptions::default());

    assert!(report.is_empty());
    assert!(report.history_file.is_none());
    assert_eq!(fixture.count_dirs(), 0);
    assert_eq!(fixture.count_histories(), 0);
}

#[test]
fn test_organize_image_and_unknown_file() {
    let fixture = TestFixture::new();
    fixture.create_sized_file("a.jpg", 2_000_000);
    fixture.create_text_file("b.unknown", "???");

    let report = fixture.organize(OrganizeOptions::default());

    assert_eq!(report.moved, 2);
    assert_eq!(report.created, 2);
    assert_eq!(report.errors, 0);
    fixture.assert_file_exists("Images/a.jpg");
    fixture.assert_file_exists("Other/b.unknown");

    let entries = fixture.history_entries();
    assert_eq!(entries.len(), 4);
    assert!(entries.iter().all(|e| e.status() == EntryStatus::Success));
    let creates = entries
        .iter()
        .filter(|e| matches!(e, HistoryEntry::CreateDir { .. }))
        .count();
    assert_eq!(creates, 2);
}

#[test]
fn test_organize_preserves_file_content() {
    let fixture = TestFixture::new();
    fixture.create_text_file("letter.txt", "Dear reader,\nhello.");

    fixture.organize(OrganizeOptions::default());

    let content = fs::read_to_string(fixture.path().join("Documents/letter.txt")).unwrap();
    assert_eq!(content, "Dear reader,\nhello.");
}

#[test]
fn test_organize_mixed_case_and_multiple_dots() {
    let fixture = TestFixture::new();
    fixture.create_text_file("HOLIDAY.JPG", "img");
    fixture.create_text_file("backup.2024.tar.gz", "gz");
    fixture.create_text_file("Makefile", "all:");

    fixture.organize(OrganizeOptions::default());

    fixture.assert_file_exists("Images/HOLIDAY.JPG");
    fixture.assert_file_exists("Archives/backup.2024.tar.gz");
    fixture.assert_file_exists("Other/Makefile");
}

#[test]
fn test_video_size_variants() {
    let fixture = TestFixture::new();
    fixture.create_sized_file("clip.mp4", 1_000);

    let mut settings = Settings::default();
    if let Some(videos) = settings.categories.iter_mut().find(|c| c.name == "Videos") {
        videos.variants[0].max_size_mb = Some(0.0005);
        videos.variants[1].min_size_mb = Some(0.0005);
    }
    fixture.create_sized_file("movie.mkv", 600);
    fixture.create_sized_file("short.mkv", 400);

    fixture
        .organize_with(&settings, OrganizeOptions::default())
        .unwrap();

    fixture.assert_file_exists("Long-Videos/clip.mp4");
    fixture.assert_file_exists("Long-Videos/movie.mkv");
    fixture.assert_file_exists("Short-Videos/short.mkv");
}

#[test]
fn test_collision_gets_numeric_suffix() {
    let fixture = TestFixture::new();
    fixture.create_subdir("Documents");
    fixture.create_text_file("Documents/report.pdf", "old");
    fixture.create_text_file("report.pdf", "new");

    let report = fixture.organize(OrganizeOptions::default());

    assert_eq!(report.created, 0);
    let old = fs::read_to_string(fixture.path().join("Documents/report.pdf")).unwrap();
    let new = fs::read_to_string(fixture.path().join("Documents/report_1.pdf")).unwrap();
    assert_eq!(old, "old");
    assert_eq!(new, "new");
}

#[test]
fn test_organize_then_add_files_then_organize_again() {
    let fixture = TestFixture::new();
    fixture.create_text_file("first.txt", "1");
    fixture.organize(OrganizeOptions::default());

    fixture.create_text_file("second.txt", "2");
    let report = fixture.organize(OrganizeOptions::default());

    assert_eq!(report.moved, 1);
    assert_eq!(report.created, 0);
    fixture.assert_file_exists("Documents/first.txt");
    fixture.assert_file_exists("Documents/second.txt");
    assert_eq!(fixture.count_histories(), 2);
}

#[test]
fn test_large_run_spans_several_batches() {
    let fixture = TestFixture::new();
    for i in 0..120 {
        fixture.create_text_file(&format!("note_{i:03}.txt"), "x");
    }

    let report = fixture.organize(OrganizeOptions::default());
    assert_eq!(report.moved, 120);

    let path = report.history_file.expect("history written");
    let content = fs::read_to_string(&path).unwrap();
    let parsed: Vec<serde_json::Value> = serde_json::from_str(&content).unwrap();
    assert_eq!(parsed.len(), 121);
    assert_eq!(parsed[0]["action"], "create_dir");
}

// ============================================================================
// Dry-Run Mode Verification
// ============================================================================

#[test]
fn test_dry_run_matches_real_run_without_changes() {
    let simulated = TestFixture::new();
    let real = TestFixture::new();
    for fixture in [&simulated, &real] {
        fixture.create_sized_file("a.jpg", 2_000_000);
        fixture.create_text_file("b.unknown", "?");
        fixture.create_text_file("nested/c.txt", "c");
    }
    let before = simulated.snapshot();

    let dry = simulated.organize(OrganizeOptions {
        dry_run: true,
        ..recursive()
    });
    let actual = real.organize(recursive());

    assert_eq!(dry.moved, actual.moved);
    assert_eq!(dry.created, actual.created);
    assert_eq!(dry.errors, actual.errors);
    assert_eq!(dry.suffixes, actual.suffixes);
    assert_eq!(simulated.snapshot(), before);
    assert_eq!(simulated.count_histories(), 0);
    assert!(dry.history_file.is_none());
}

#[test]
fn test_dry_run_reports_suffixes() {
    let fixture = TestFixture::new();
    fixture.create_text_file("a.PDF", "");
    fixture.create_text_file("b.mp3", "");
    fixture.create_text_file("c", "");

    let report = fixture.organize(dry_run());

    let suffixes = report.suffixes.into_iter().collect::<Vec<_>>();
    assert_eq!(suffixes, vec!["", ".mp3", ".pdf"]);
}

// ============================================================================
// History Log and Undo
// ============================================================================

#[test]
fn test_organize_then_undo_restores_directory() {
    let fixture = TestFixture::new();
    fixture.create_sized_file("a.jpg", 2_000_000);
    fixture.create_text_file("b.unknown", "?");
    let before = fixture.snapshot();

    fixture.organize(OrganizeOptions::default());
    let (report, cleanup) = UndoManager::undo_and_clean(fixture.logs())
        .unwrap()
        .expect("history to undo");

    assert_eq!(report.moved_back, 2);
    assert_eq!(cleanup.removed.len(), 2);
    assert_eq!(fixture.snapshot(), before);
    fixture.assert_not_exists("Images");
    fixture.assert_not_exists("Other");
}

#[test]
fn test_recursive_organize_undo_is_idempotent() {
    let fixture = TestFixture::new();
    fixture.create_text_file("top.txt", "1");
    fixture.create_text_file("photos/2023/beach.png", "2");
    fixture.create_text_file("photos/2023/beach.PNG.bak", "3");
    fixture.create_text_file("music/track.flac", "4");
    fixture.create_subdir("empty");
    let before = fixture.snapshot();

    let report = fixture.organize(recursive());
    assert_eq!(report.moved, 4);
    fixture.assert_file_exists("photos/2023/Images/beach.png");

    UndoManager::undo_and_clean(fixture.logs()).unwrap();
    assert_eq!(fixture.snapshot(), before);
}

#[test]
fn test_undo_without_history() {
    let fixture = TestFixture::new();
    assert!(UndoManager::undo_latest(fixture.logs()).unwrap().is_none());
}

#[test]
fn test_undo_with_modified_files() {
    let fixture = TestFixture::new();
    fixture.create_text_file("a.txt", "a");
    fixture.create_text_file("b.txt", "b");
    fixture.organize(OrganizeOptions::default());

    fs::remove_file(fixture.path().join("Documents/a.txt")).unwrap();
    fixture.create_text_file("b.txt", "replacement");

    let (report, cleanup) = UndoManager::undo_and_clean(fixture.logs())
        .unwrap()
        .unwrap();

    assert_eq!(report.moved_back, 0);
    assert_eq!(report.skipped.len(), 2);
    assert!(cleanup.removed.is_empty());
    fixture.assert_file_exists("Documents/b.txt");
    assert_eq!(
        fs::read_to_string(fixture.path().join("b.txt")).unwrap(),
        "replacement"
    );
}

#[test]
fn test_undo_walks_back_through_runs() {
    let fixture = TestFixture::new();
    fixture.create_text_file("first.txt", "1");
    fixture.organize(OrganizeOptions::default());
    fixture.create_text_file("second.jpg", "2");
    fixture.organize(OrganizeOptions::default());
    assert_eq!(fixture.count_histories(), 2);

    UndoManager::undo_and_clean(fixture.logs()).unwrap();
    fixture.assert_file_exists("second.jpg");
    fixture.assert_file_exists("Documents/first.txt");
    fixture.assert_not_exists("Images");

    UndoManager::undo_and_clean(fixture.logs()).unwrap();
    fixture.assert_file_exists("first.txt");
    fixture.assert_not_exists("Documents");
    assert_eq!(fixture.count_histories(), 0);
}

#[test]
fn test_interrupted_run_can_still_be_undone() {
    let fixture = TestFixture::new();
    fixture.create_text_file("a.txt", "a");
    fixture.create_text_file("b.png", "b");

    let matcher = RuleMatcher::new(&Settings::default()).unwrap();
    let mut organizer = Organizer::new(matcher, OrganizeOptions::default()).unwrap();
    let mut log = RunLog::new(fixture.logs());
    organizer
        .organize(fixture.path(), &mut log, &mut NoProgress)
        .unwrap();
    // Dropped without sealing: the array is never closed.
    drop(log);

    let report = UndoManager::undo_latest(fixture.logs()).unwrap().unwrap();
    assert!(report.truncated);
    assert_eq!(report.moved_back, 2);
    fixture.assert_file_exists("a.txt");
    fixture.assert_file_exists("b.png");
}

// ============================================================================
// Multi-Directory Runs
// ============================================================================

#[test]
fn test_multi_directory_run_writes_one_history() {
    let first = TestFixture::new();
    let second = TestFixture::new();
    first.create_text_file("a.txt", "a");
    second.create_text_file("b.zip", "b");

    let guard = PathGuard::with_home(
        None,
        vec![first.path().to_path_buf(), second.path().to_path_buf()],
    );
    let matcher = RuleMatcher::new(&Settings::default()).unwrap();
    let mut organizer = Organizer::new(matcher, OrganizeOptions::default()).unwrap();
    let report = organizer
        .organize_many(
            &[first.path().to_path_buf(), second.path().to_path_buf()],
            &guard,
            false,
            first.logs(),
            &mut NoProgress,
        )
        .unwrap();

    assert_eq!(report.moved, 2);
    assert_eq!(first.count_histories(), 1);
    first.assert_file_exists("Documents/a.txt");
    second.assert_file_exists("Archives/b.zip");

    UndoManager::undo_and_clean(first.logs()).unwrap();
    first.assert_file_exists("a.txt");
    second.assert_file_exists("b.zip");
    second.assert_not_exists("Archives");
}

// ============================================================================
// Configuration and Path Safety
// ============================================================================

#[test]
fn test_missing_variant_name_aborts_and_keeps_history() {
    let fixture = TestFixture::new();
    let config_dir = TempDir::new().unwrap();
    let config_path = config_dir.path().join("rules.toml");
    fs::write(
        &config_path,
        r#"
[defaults]
name = "Misc"

[[categories]]
name = "Logs"
type = "text"
extensions = ["log"]

[[categories.variants]]
max_size_mb = 1
"#,
    )
    .unwrap();
    let settings = Settings::load_from_file(&config_path).unwrap();
    fixture.create_text_file("0-readme.txt", "read me");
    fixture.create_text_file("server.log", "line");

    let result = fixture.organize_with(&settings, OrganizeOptions::default());

    assert!(matches!(result, Err(OrganizeError::Match(_))));
    fixture.assert_file_exists("Misc/0-readme.txt");
    fixture.assert_file_exists("server.log");

    let history = latest_history(fixture.logs()).unwrap().unwrap();
    let content = fs::read_to_string(history).unwrap();
    let parsed: Vec<serde_json::Value> = serde_json::from_str(&content).unwrap();
    assert_eq!(parsed.len(), 2);
}

#[test]
fn test_directory_outside_allow_list_needs_force() {
    let fixture = TestFixture::new();
    fixture.create_text_file("a.txt", "a");
    let guard = PathGuard::with_home(None, Vec::new());
    let matcher = RuleMatcher::new(&Settings::default()).unwrap();
    let mut organizer = Organizer::new(matcher, OrganizeOptions::default()).unwrap();
    let roots = [fixture.path().to_path_buf()];

    let denied = organizer.organize_many(&roots, &guard, false, fixture.logs(), &mut NoProgress);
    match denied {
        Err(OrganizeError::Access(e @ AccessError::NotAllowed(_))) => {
            assert!(e.to_string().contains("--force"));
        }
        other => panic!("expected NotAllowed, got {other:?}"),
    }
    fixture.assert_file_exists("a.txt");

    organizer
        .organize_many(&roots, &guard, true, fixture.logs(), &mut NoProgress)
        .unwrap();
    fixture.assert_file_exists("Documents/a.txt");
}

#[test]
fn test_protected_directory_is_refused_even_with_force() {
    let guard = PathGuard::with_home(None, vec![PathBuf::from("/")]);
    let matcher = RuleMatcher::new(&Settings::default()).unwrap();
    let mut organizer = Organizer::new(matcher, dry_run()).unwrap();
    let logs = TempDir::new().unwrap();

    let result = organizer.organize_many(
        &[PathBuf::from("/etc")],
        &guard,
        true,
        logs.path(),
        &mut NoProgress,
    );
    assert!(matches!(
        result,
        Err(OrganizeError::Access(AccessError::Protected(_)))
    ));
}

#[test]
fn test_sensitive_directories_under_home_are_refused() {
    let home = TestFixture::new();
    home.create_text_file(".ssh/id_rsa", "secret");
    home.create_text_file("Downloads/file.txt", "x");
    let guard = PathGuard::with_home(Some(home.path().to_path_buf()), Vec::new());

    assert!(guard.is_protected(&home.path().join(".ssh")));
    assert!(guard.is_protected(home.path()));
    assert!(!guard.is_protected(&home.path().join("Downloads")));
    assert!(!guard.is_allowed(home.path()));
}

// ============================================================================
// Command-Line Entry Point
// ============================================================================

fn write_config(dir: &Path) -> PathBuf {
    let path = dir.join("sortdir.yaml");
    fs::write(
        &path,
        "defaults:\n  name: Misc\ncategories:\n  - name: Text\n    type: document\n    extensions: [txt, md]\n",
    )
    .unwrap();
    path
}

#[test]
fn test_cli_organize_and_undo() {
    let fixture = TestFixture::new();
    let config_dir = TempDir::new().unwrap();
    let config = write_config(config_dir.path());
    fixture.create_text_file("notes.md", "# notes");
    fixture.create_text_file("photo.jpg", "jpg");

    let config_arg = config.to_string_lossy().into_owned();
    let logs_arg = fixture.logs().to_string_lossy().into_owned();
    let root_arg = fixture.path().to_string_lossy().into_owned();

    let organize = Cli::try_parse_from([
        "sortdir",
        "--config",
        &config_arg,
        "--history-dir",
        &logs_arg,
        "organize",
        &root_arg,
        "--force",
        "--yes",
    ])
    .unwrap();
    run_cli(organize).unwrap();

    fixture.assert_file_exists("Text/notes.md");
    fixture.assert_file_exists("Misc/photo.jpg");

    let undo = Cli::try_parse_from([
        "sortdir",
        "--config",
        &config_arg,
        "--history-dir",
        &logs_arg,
        "undo",
    ])
    .unwrap();
    run_cli(undo).unwrap();

    fixture.assert_file_exists("notes.md");
    fixture.assert_file_exists("photo.jpg");
    assert_eq!(fixture.count_dirs(), 0);
}

#[test]
fn test_cli_dry_run_writes_nothing() {
    let fixture = TestFixture::new();
    fixture.create_text_file("notes.txt", "x");
    let logs_arg = fixture.logs().to_string_lossy().into_owned();
    let root_arg = fixture.path().to_string_lossy().into_owned();

    let cli = Cli::parse_from([
        "sortdir",
        "--history-dir",
        &logs_arg,
        "organize",
        &root_arg,
        "--dry-run",
        "--force",
    ]);
    run_cli(cli).unwrap();

    fixture.assert_file_exists("notes.txt");
    assert_eq!(fixture.count_histories(), 0);
}

#[test]
fn test_cli_check_config_reports_problems() {
    let config_dir = TempDir::new().unwrap();
    let path = config_dir.path().join("broken.toml");
    fs::write(
        &path,
        "[defaults]\nname = \"\"\n\n[[categories]]\nname = \"Docs\"\ntype = \"document\"\nextensions = []\n",
    )
    .unwrap();
    let config_arg = path.to_string_lossy().into_owned();

    let cli = Cli::parse_from(["sortdir", "--config", &config_arg, "check-config"]);
    assert!(run_cli(cli).is_err());

    let good = write_config(config_dir.path());
    let good_arg = good.to_string_lossy().into_owned();
    let cli = Cli::parse_from(["sortdir", "--config", &good_arg, "check-config"]);
    assert!(run_cli(cli).is_ok());
}

#[test]
fn test_cli_undo_without_history_succeeds() {
    let logs = TempDir::new().unwrap();
    let logs_arg = logs.path().to_string_lossy().into_owned();
    let cli = Cli::parse_from(["sortdir", "--history-dir", &logs_arg, "undo"]);
    assert!(run_cli(cli).is_ok());
}

#[test]
fn test_cli_add_path_lets_directory_be_organized_without_force() {
    let fixture = TestFixture::new();
    fixture.create_text_file("notes.txt", "x");
    let config_dir = TempDir::new().unwrap();
    let config = write_config(config_dir.path());
    let config_arg = config.to_string_lossy().into_owned();
    let logs_arg = fixture.logs().to_string_lossy().into_owned();
    let root_arg = fixture.path().to_string_lossy().into_owned();

    let simulate = || {
        Cli::parse_from([
            "sortdir",
            "--config",
            &config_arg,
            "--history-dir",
            &logs_arg,
            "organize",
            &root_arg,
            "--dry-run",
        ])
    };
    assert!(run_cli(simulate()).is_err());

    for _ in 0..2 {
        let cli = Cli::parse_from(["sortdir", "--config", &config_arg, "add-path", &root_arg]);
        run_cli(cli).unwrap();
    }

    let settings = Settings::load_from_file(&config).unwrap();
    let root_entry = fixture.path().display().to_string();
    let matching = settings
        .allowed_paths
        .for_current_os()
        .iter()
        .filter(|entry| **entry == root_entry)
        .count();
    assert_eq!(matching, 1);
    assert_eq!(settings.defaults.name, "Misc");

    run_cli(simulate()).unwrap();
    fixture.assert_file_exists("notes.txt");
}

#[test]
fn test_cli_add_path_rejects_missing_directory() {
    let config_dir = TempDir::new().unwrap();
    let config = config_dir.path().join("rules.toml");
    let config_arg = config.to_string_lossy().into_owned();
    let missing = config_dir.path().join("missing").to_string_lossy().into_owned();

    let cli = Cli::parse_from(["sortdir", "--config", &config_arg, "add-path", &missing]);
    assert!(run_cli(cli).is_err());
    assert!(!config.exists());
}

#[test]
fn test_cli_show_config_in_every_format() {
    let config_dir = TempDir::new().unwrap();
    let config = write_config(config_dir.path());
    let config_arg = config.to_string_lossy().into_owned();

    for format in ["toml", "yaml", "json"] {
        let cli = Cli::parse_from([
            "sortdir",
            "--config",
            &config_arg,
            "show-config",
            "--format",
            format,
        ]);
        assert!(run_cli(cli).is_ok(), "{format}");
    }
}

#[test]
fn test_recursive_undo_with_name_clash_inside_category_dir() {
    let fixture = TestFixture::new();
    fixture.create_text_file("Images/a.jpg", "older");
    fixture.create_text_file("a.jpg", "newer");

    fixture.organize(recursive());
    fixture.assert_file_exists("Images/Images/a.jpg");

    let (report, _cleanup) = UndoManager::undo_and_clean(fixture.logs()).unwrap().unwrap();
    assert!(report.is_complete_success());
    assert_eq!(fs::read_to_string(fixture.path().join("a.jpg")).unwrap(), "newer");
    assert_eq!(
        fs::read_to_string(fixture.path().join("Images/a.jpg")).unwrap(),
        "older"
    );
    fixture.assert_not_exists("Images/Images");
}
