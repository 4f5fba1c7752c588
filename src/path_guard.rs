//! Path-safety gate.
//!
//! Decides whether a directory may be organized. Two independent checks exist:
//! - *protected*: core system directories, the home directory itself, and
//!   sensitive hidden directories inside home are never touched
//! - *allowed*: the directory must sit under one of the configured allow-list
//!   roots for the current OS (the `force` flag skips only this check)
//!
//! Every failure to resolve a path is treated as unsafe.

use crate::config::{AllowedPaths, expand_path};
use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use thiserror::Error;
use tracing::{debug, warn};

/// System locations that are protected together with everything beneath them.
const CORE_PROTECTED: &[&str] = &[
    "/bin",
    "/sbin",
    "/usr",
    "/etc",
    "/var",
    "/root",
    "/dev",
    "/proc",
    "/sys",
    "/boot",
    "/lib",
    "/lib64",
    "/System",
    "/Library",
    "/Applications",
    r"C:\Windows",
    r"C:\Program Files",
    r"C:\Program Files (x86)",
    r"C:\ProgramData",
    r"C:\$Recycle.Bin",
];

/// Hidden directory names that are protected anywhere under home.
const PROTECTED_HIDDEN: &[&str] = &[
    ".config",
    ".local",
    ".cache",
    ".ssh",
    ".gnupg",
    ".pki",
    ".npm",
    ".docker",
    ".git",
    ".svn",
    ".venv",
    ".env",
    ".bashrc",
    ".zshrc",
    ".bash_profile",
    ".profile",
    ".vim",
];

/// Reasons a directory is refused as an organization root.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("the path '{}' does not exist", .0.display())]
    NotFound(PathBuf),
    #[error("the path '{}' is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("insufficient permissions to read/write in '{}'", .0.display())]
    PermissionDenied(PathBuf),
    #[error("'{}' is a protected system or sensitive directory", .0.display())]
    Protected(PathBuf),
    #[error("the path '{}' is not an allowed directory; use --force to override this check", .0.display())]
    NotAllowed(PathBuf),
}

/// Protected/allowed gate with per-path memoization.
///
/// Build one per run and pass it by reference.
#[derive(Debug)]
pub struct PathGuard {
    home: Option<PathBuf>,
    core_protected: Vec<PathBuf>,
    allowed_roots: Vec<PathBuf>,
    protected_cache: RefCell<HashMap<PathBuf, bool>>,
    allowed_cache: RefCell<HashMap<PathBuf, bool>>,
}

impl PathGuard {
    /// Guard for the current user, using the allow-list entries for this OS.
    pub fn new(allowed: &AllowedPaths) -> Self {
        let roots = allowed
            .for_current_os()
            .iter()
            .map(|raw| expand_path(raw))
            .collect::<Vec<_>>();
        Self::with_home(dirs::home_dir(), roots)
    }

    /// Guard with an explicit home directory and allow-list roots.
    pub fn with_home(
        home: Option<PathBuf>,
        allowed_roots: impl IntoIterator<Item = PathBuf>,
    ) -> Self {
        Self {
            home: home.map(|h| resolve_lenient(&h)),
            core_protected: CORE_PROTECTED.iter().map(PathBuf::from).collect(),
            allowed_roots: allowed_roots
                .into_iter()
                .map(|root| resolve_lenient(&root))
                .collect(),
            protected_cache: RefCell::new(HashMap::new()),
            allowed_cache: RefCell::new(HashMap::new()),
        }
    }

    /// True if `path` must never be organized.
    ///
    /// Filesystem roots (`/`, `C:\`) are protected themselves; nesting under
    /// them is not, otherwise every path would be. Answers are memoized per
    /// resolved path, so different spellings of one directory share an entry.
    pub fn is_protected(&self, path: &Path) -> bool {
        let abs_path = match fs::canonicalize(path) {
            Ok(p) => p,
            Err(e) => {
                warn!("Path validation error for '{}': {}", path.display(), e);
                return true;
            }
        };
        if let Some(&cached) = self.protected_cache.borrow().get(&abs_path) {
            return cached;
        }
        let protected = self.compute_protected(&abs_path);
        self.protected_cache.borrow_mut().insert(abs_path, protected);
        protected
    }

    fn compute_protected(&self, abs_path: &Path) -> bool {
        if let Some(home) = &self.home {
            if abs_path == home.as_path() {
                return true;
            }
            if let Ok(relative) = abs_path.strip_prefix(home) {
                return relative.components().any(|part| {
                    PROTECTED_HIDDEN
                        .iter()
                        .any(|hidden| part.as_os_str() == OsStr::new(hidden))
                });
            }
        }

        if abs_path.parent().is_none() {
            return true;
        }

        self.core_protected
            .iter()
            .any(|protected| abs_path.starts_with(protected))
    }

    /// True if `path` sits under an allow-list root.
    ///
    /// The home directory itself only counts when listed explicitly.
    pub fn is_allowed(&self, path: &Path) -> bool {
        let abs_path = match fs::canonicalize(path) {
            Ok(p) => p,
            Err(e) => {
                debug!("Cannot resolve '{}': {}", path.display(), e);
                return false;
            }
        };
        if let Some(&cached) = self.allowed_cache.borrow().get(&abs_path) {
            return cached;
        }
        let allowed = self.compute_allowed(&abs_path);
        self.allowed_cache.borrow_mut().insert(abs_path, allowed);
        allowed
    }

    fn compute_allowed(&self, abs_path: &Path) -> bool {
        if self.home.as_deref() == Some(abs_path) {
            return self.allowed_roots.iter().any(|root| root == abs_path);
        }

        self.allowed_roots
            .iter()
            .any(|root| abs_path.starts_with(root))
    }

    /// Validates a directory before it is organized.
    ///
    /// Existence, type, permission and protection checks always run;
    /// `force` skips only the allow-list check. The directory must be
    /// readable, and also writable by the current user when `write` is set.
    /// Returns the canonical path.
    pub fn check_access(
        &self,
        path: &Path,
        force: bool,
        write: bool,
    ) -> Result<PathBuf, AccessError> {
        let metadata =
            fs::metadata(path).map_err(|_| AccessError::NotFound(path.to_path_buf()))?;
        if !metadata.is_dir() {
            return Err(AccessError::NotADirectory(path.to_path_buf()));
        }
        if fs::read_dir(path).is_err() || (write && !can_write_in(path)) {
            return Err(AccessError::PermissionDenied(path.to_path_buf()));
        }

        if self.is_protected(path) {
            return Err(AccessError::Protected(path.to_path_buf()));
        }

        if force {
            warn!(
                "Bypassing allow-list check for path '{}' due to --force flag",
                path.display()
            );
        } else if !self.is_allowed(path) {
            return Err(AccessError::NotAllowed(path.to_path_buf()));
        }

        fs::canonicalize(path).map_err(|_| AccessError::NotFound(path.to_path_buf()))
    }
}

/// Whether the current user can create files in `dir`, tested by creating
/// and removing an empty hidden file.
fn can_write_in(dir: &Path) -> bool {
    let marker = dir.join(format!(".sortdir_write_test_{}", process::id()));
    match OpenOptions::new().write(true).create_new(true).open(&marker) {
        Ok(file) => {
            drop(file);
            if let Err(e) = fs::remove_file(&marker) {
                warn!("Could not remove {}: {}", marker.display(), e);
            }
            true
        }
        Err(e) => e.kind() == io::ErrorKind::AlreadyExists,
    }
}

/// Canonicalizes when possible, otherwise returns the path unchanged.
fn resolve_lenient(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
