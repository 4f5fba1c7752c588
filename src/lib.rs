//! sortdir - sort a directory's files into category folders, and undo it
//!
//! This library provides the rule matcher that maps a file's extension and size
//! to a destination folder, the organizer that moves files while writing a
//! streaming history log, the undo manager that replays that log in reverse,
//! and the path guard that keeps system and sensitive directories untouched.

pub mod cli;
pub mod config;
pub mod file_category;
pub mod file_organizer;
pub mod history;
pub mod output;
pub mod path_guard;
pub mod undo;

pub use config::{ConfigError, Settings};
pub use file_category::{MatchError, RuleMatcher};
pub use file_organizer::{OrganizeOptions, OrganizeReport, Organizer, ProgressObserver};
pub use history::{HistoryEntry, HistoryError};
pub use path_guard::{AccessError, PathGuard};
pub use undo::{UndoManager, UndoReport};

pub use cli::{Cli, run_cli};
