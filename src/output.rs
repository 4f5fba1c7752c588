//! Output formatting and styling module.
//!
//! Provides a centralized interface for all CLI output, including colored output,
//! progress tracking, and formatted tables. This module abstracts away output details,
//! making it easy to change formatting globally.

use crate::file_organizer::{OrganizeReport, ProgressObserver};
use crate::undo::{CleanupReport, UndoReport};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Manages all CLI output with consistent styling and formatting.
///
/// This struct provides methods for:
/// - Success messages (green with ✓)
/// - Error messages (red with ✗)
/// - Warning messages (yellow with ⚠)
/// - Info messages (cyan)
/// - Progress spinners for long runs
/// - Summary tables with statistics
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use sortdir::output::OutputFormatter;
    /// OutputFormatter::success("Directory organized successfully!");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    /// Prints a regular message without styling.
    pub fn plain(message: &str) {
        println!("{}", message);
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Creates a spinner for runs whose length is not known up front.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use sortdir::output::OutputFormatter;
    /// let spinner = OutputFormatter::create_spinner("Organizing files...");
    /// spinner.inc(1);
    /// spinner.finish_and_clear();
    /// ```
    pub fn create_spinner(message: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {pos} files {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Prints a summary table with file counts per destination.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use sortdir::output::OutputFormatter;
    /// use std::collections::BTreeMap;
    ///
    /// let mut counts = BTreeMap::new();
    /// counts.insert("Documents".to_string(), 15);
    /// counts.insert("Short-Videos".to_string(), 8);
    /// OutputFormatter::summary_table(&counts, 23);
    /// ```
    pub fn summary_table(destination_counts: &BTreeMap<String, usize>, total_files: usize) {
        Self::header("SUMMARY");

        let max_name_len = destination_counts
            .keys()
            .map(String::len)
            .max()
            .unwrap_or(0)
            .max(11); // At least "Destination" width

        println!(
            "{:<width$} | {}",
            "Destination".bold(),
            "Files".bold(),
            width = max_name_len
        );
        println!("{}", "-".repeat(max_name_len + 10));

        for (destination, count) in destination_counts {
            println!(
                "{:<width$} | {} {}",
                destination,
                count.to_string().green(),
                file_word(*count),
                width = max_name_len
            );
        }

        println!("{}", "-".repeat(max_name_len + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total_files.to_string().green().bold(),
            file_word(total_files),
            width = max_name_len
        );
    }

    /// Prints the outcome of an organize run.
    pub fn organize_summary(report: &OrganizeReport, dry_run: bool) {
        if report.moved > 0 {
            Self::summary_table(&report.per_destination, report.moved);
        }

        Self::header(if dry_run { "DRY RUN RESULTS" } else { "RESULTS" });
        let (moved_label, created_label) = if dry_run {
            ("Files that would be moved", "Directories that would be created")
        } else {
            ("Files moved", "Directories created")
        };
        Self::plain(&format!("{moved_label}: {}", report.moved.to_string().green()));
        Self::plain(&format!(
            "{created_label}: {}",
            report.created.to_string().green()
        ));
        if report.errors > 0 {
            Self::plain(&format!("Errors: {}", report.errors.to_string().red()));
        }

        if dry_run {
            let suffixes = report
                .suffixes
                .iter()
                .map(|suffix| {
                    if suffix.is_empty() {
                        "(none)".to_string()
                    } else {
                        suffix.clone()
                    }
                })
                .collect::<Vec<_>>();
            Self::info(&format!("File suffixes processed: {}", suffixes.join(", ")));
        } else if let Some(history) = &report.history_file {
            Self::info(&format!("History saved to {}", history.display()));
        }
    }

    /// Prints the outcome of an undo run.
    pub fn undo_summary(report: &UndoReport, cleanup: &CleanupReport) {
        Self::header("UNDO RESULTS");
        Self::plain(&format!("History: {}", report.history_file.display()));
        Self::plain(&format!(
            "Files restored: {}",
            report.moved_back.to_string().green()
        ));
        Self::plain(&format!(
            "Directories removed: {}",
            cleanup.removed.len().to_string().green()
        ));

        for (path, reason) in &report.skipped {
            Self::warning(&format!("Skipped {}: {}", path.display(), reason));
        }
        for (path, reason) in &cleanup.skipped {
            Self::warning(&format!("Kept {}: {}", path.display(), reason));
        }
        for (path, reason) in &report.failed_restores {
            Self::error(&format!("{}: {}", path.display(), reason));
        }
        if report.truncated {
            Self::warning("History file was incomplete; entries after the cut were not undone");
        }
    }

    /// Prints a dry-run notice message.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }
}

fn file_word(count: usize) -> &'static str {
    if count == 1 { "file" } else { "files" }
}

/// Progress observer that drives a terminal spinner.
///
/// In dry-run mode every intended action is printed above the spinner.
pub struct CliProgress {
    bar: Option<ProgressBar>,
    dry_run: bool,
    hidden: bool,
    files_seen: usize,
    totals: OrganizeReport,
}

impl CliProgress {
    pub fn new() -> Self {
        Self {
            bar: None,
            dry_run: false,
            hidden: false,
            files_seen: 0,
            totals: OrganizeReport::default(),
        }
    }

    /// Observer that tracks counts without drawing anything.
    pub fn hidden() -> Self {
        Self {
            hidden: true,
            ..Self::new()
        }
    }

    pub fn files_seen(&self) -> usize {
        self.files_seen
    }

    /// Reports of every directory finished so far, merged.
    pub fn totals(&self) -> &OrganizeReport {
        &self.totals
    }

    fn println(&self, line: String) {
        match &self.bar {
            Some(bar) => bar.println(line),
            None if self.hidden => {}
            None => println!("{line}"),
        }
    }
}

impl Default for CliProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for CliProgress {
    fn on_directory_start(&mut self, root: &Path, dry_run: bool) {
        self.dry_run = dry_run;
        let action = if dry_run { "Simulating" } else { "Organizing" };
        let message = format!("{action} {}", root.display());
        self.bar = Some(if self.hidden {
            ProgressBar::hidden()
        } else {
            OutputFormatter::create_spinner(&message)
        });
    }

    fn on_file(&mut self, file: &Path, destination: &str) {
        self.files_seen += 1;
        let name = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.dry_run {
            self.println(format!("{}", format!("Would move: {name} -> {destination}").blue()));
        }
        if let Some(bar) = &self.bar {
            bar.set_message(name);
            bar.inc(1);
        }
    }

    fn on_dir_created(&mut self, dir: &Path) {
        if self.dry_run {
            self.println(format!(
                "{}",
                format!("Would create directory: {}", dir.display()).blue()
            ));
        }
    }

    fn on_error(&mut self, path: &Path, message: &str) {
        self.println(format!("{} {}: {}", "✗".red(), path.display(), message));
    }

    fn on_skipped_root(&mut self, root: &Path, reason: &str) {
        if !self.hidden {
            OutputFormatter::warning(&format!("Skipping {}: {}", root.display(), reason));
        }
    }

    fn on_directory_done(&mut self, root: &Path, report: &OrganizeReport) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
        self.totals.merge(report.clone());
        if !self.hidden && report.moved == 0 && report.errors == 0 {
            OutputFormatter::warning(&format!("No matching files found in {}", root.display()));
        }
    }
}
