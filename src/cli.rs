//! Command-line interface module for sortdir.
//!
//! This module handles all CLI-related functionality including:
//! - Command parsing
//! - Configuration loading
//! - Organization and undo orchestration
//! - User confirmation before files are moved

use crate::config::{ConfigFormat, Settings, user_config_path};
use crate::file_category::RuleMatcher;
use crate::file_organizer::{OrganizeOptions, Organizer};
use crate::output::{CliProgress, OutputFormatter};
use crate::path_guard::PathGuard;
use crate::undo::UndoManager;
use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "sortdir")]
#[command(version)]
#[command(about = "Sort files into category folders by extension and size, with undo")]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding history files
    #[arg(long, global = true, value_name = "DIR")]
    pub history_dir: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Log filter used when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Move files into category subfolders
    Organize(OrganizeArgs),
    /// Revert the most recent organize run
    Undo,
    /// Validate the configuration and list any problems
    CheckConfig,
    /// Print the configuration in effect
    ShowConfig {
        /// Output format
        #[arg(long, value_enum, default_value_t = ShowFormat::Toml)]
        format: ShowFormat,
    },
    /// Add a directory to the allow-list for this operating system
    AddPath {
        /// Directory to allow
        #[arg(value_name = "DIR")]
        path: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShowFormat {
    Toml,
    Yaml,
    Json,
}

impl From<ShowFormat> for ConfigFormat {
    fn from(format: ShowFormat) -> Self {
        match format {
            ShowFormat::Toml => ConfigFormat::Toml,
            ShowFormat::Yaml => ConfigFormat::Yaml,
            ShowFormat::Json => ConfigFormat::Json,
        }
    }
}

#[derive(Args, Debug)]
pub struct OrganizeArgs {
    /// Directories to organize
    #[arg(required = true, value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// Show what would happen without moving anything
    #[arg(long)]
    pub dry_run: bool,

    /// Descend into subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Maximum subdirectory depth when recursive (-1 for unlimited)
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub depth: i32,

    /// Include hidden files and directories
    #[arg(long)]
    pub include_hidden: bool,

    /// Only organize files matching this glob
    #[arg(long, default_value = "*")]
    pub pattern: String,

    /// Organize directories outside the allow-list
    #[arg(short, long)]
    pub force: bool,

    /// Do not ask for confirmation
    #[arg(short = 'y', long)]
    pub yes: bool,
}

impl OrganizeArgs {
    pub fn options(&self) -> OrganizeOptions {
        OrganizeOptions {
            dry_run: self.dry_run,
            recursive: self.recursive,
            include_hidden: self.include_hidden,
            pattern: self.pattern.clone(),
            depth: self.depth,
        }
    }
}

/// Runs the parsed command.
///
/// # Examples
///
/// ```no_run
/// use clap::Parser;
/// use sortdir::cli::{Cli, run_cli};
///
/// let cli = Cli::parse_from(["sortdir", "organize", "--dry-run", "/home/me/Downloads"]);
/// if let Err(e) = run_cli(cli) {
///     eprintln!("Error: {e:#}");
/// }
/// ```
pub fn run_cli(cli: Cli) -> Result<()> {
    match &cli.command {
        Command::Organize(args) => organize(&cli, args),
        Command::Undo => undo(&cli),
        Command::CheckConfig => check_config(&cli),
        Command::ShowConfig { format } => show_config(&cli, *format),
        Command::AddPath { path } => add_path(&cli, path),
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    Settings::load(cli.config.as_deref()).context("Error loading configuration")
}

fn history_dir(cli: &Cli, settings: &Settings) -> PathBuf {
    cli.history_dir
        .clone()
        .unwrap_or_else(|| settings.history_dir())
}

fn organize(cli: &Cli, args: &OrganizeArgs) -> Result<()> {
    let settings = load_settings(cli)?;
    for problem in settings.validate() {
        warn!("Configuration problem: {}", problem);
    }

    let matcher = RuleMatcher::new(&settings).context("Invalid category configuration")?;
    let mut organizer = Organizer::new(matcher, args.options())?;

    if args.dry_run {
        OutputFormatter::dry_run_notice("No files will be moved and no history will be written.");
    } else if !args.yes {
        let prompt = format!(
            "Organize {} director{}?",
            args.paths.len(),
            if args.paths.len() == 1 { "y" } else { "ies" }
        );
        if !confirm(&prompt)? {
            OutputFormatter::warning("Aborted. No files were moved.");
            return Ok(());
        }
    }

    let guard = PathGuard::new(&settings.allowed_paths);
    let history_dir = history_dir(cli, &settings);
    let mut progress = CliProgress::new();
    let report = match organizer.organize_many(
        &args.paths,
        &guard,
        args.force,
        &history_dir,
        &mut progress,
    ) {
        Ok(report) => report,
        Err(e) => {
            if !progress.totals().is_empty() {
                OutputFormatter::organize_summary(progress.totals(), args.dry_run);
                OutputFormatter::warning("Run stopped early; the counts above are partial.");
            }
            return Err(e.into());
        }
    };

    OutputFormatter::organize_summary(&report, args.dry_run);
    if args.dry_run {
        OutputFormatter::success("Dry run complete. No files were modified.");
    } else if report.history_file.is_some() {
        OutputFormatter::success("Organization complete! Run 'sortdir undo' to revert it.");
    }
    if report.errors > 0 {
        OutputFormatter::warning("Some files could not be organized. Please review errors above.");
    }
    Ok(())
}

fn undo(cli: &Cli) -> Result<()> {
    let settings = load_settings(cli)?;
    let history_dir = history_dir(cli, &settings);

    let outcome = UndoManager::undo_and_clean(&history_dir)
        .with_context(|| format!("Failed to undo from {}", history_dir.display()))?;

    match outcome {
        None => OutputFormatter::warning("No history found. Nothing to undo."),
        Some((report, cleanup)) => {
            OutputFormatter::undo_summary(&report, &cleanup);
            if report.is_complete_success() {
                OutputFormatter::success("Undo complete!");
            } else {
                OutputFormatter::warning(
                    "History file was kept because some files could not be restored.",
                );
            }
        }
    }
    Ok(())
}

fn check_config(cli: &Cli) -> Result<()> {
    let settings = load_settings(cli)?;
    let problems = settings.validate();
    if problems.is_empty() {
        OutputFormatter::success(&format!(
            "Configuration is valid ({} categories, default '{}')",
            settings.categories.len(),
            settings.defaults.name
        ));
        return Ok(());
    }

    for problem in &problems {
        OutputFormatter::error(problem);
    }
    bail!("configuration has {} problem(s)", problems.len())
}

fn show_config(cli: &Cli, format: ShowFormat) -> Result<()> {
    let settings = load_settings(cli)?;
    let rendered = settings
        .to_string_with_format(format.into())
        .map_err(anyhow::Error::msg)
        .context("Failed to render configuration")?;
    OutputFormatter::plain(rendered.trim_end());
    Ok(())
}

fn add_path(cli: &Cli, path: &Path) -> Result<()> {
    let dir = fs::canonicalize(path)
        .with_context(|| format!("Cannot resolve {}", path.display()))?;
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }

    let target = Settings::locate(cli.config.as_deref())
        .or_else(user_config_path)
        .context("Could not determine where to store the configuration")?;
    let mut settings = if target.exists() {
        Settings::load_from_file(&target).context("Error loading configuration")?
    } else {
        Settings::default()
    };

    if !settings.add_allowed_path(&dir) {
        OutputFormatter::warning(&format!(
            "{} is already allowed. No changes made.",
            dir.display()
        ));
        return Ok(());
    }
    settings
        .save(&target)
        .with_context(|| format!("Failed to write {}", target.display()))?;
    OutputFormatter::success(&format!(
        "Added {} to the allowed paths in {}",
        dir.display(),
        target.display()
    ));
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
