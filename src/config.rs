//! Rule-set and path-safety configuration.
//!
//! This module loads the categorization rules and the per-OS allow-list that
//! drive organization. Settings can be written in TOML, YAML or JSON; the format
//! is picked from the file extension.
//!
//! # Configuration File Format
//!
//! ```toml
//! history_dir = "~/.local/share/sortdir/logs"
//!
//! [defaults]
//! name = "Other"
//!
//! [[categories]]
//! name = "Videos"
//! type = "media"
//! extensions = [".mp4", ".mkv"]
//! risk = "low"
//!
//! [[categories.variants]]
//! name = "Short"
//! max_size_mb = 100
//!
//! [[categories.variants]]
//! name = "Long"
//! min_size_mb = 100
//!
//! [allowed_paths]
//! linux = ["~/Downloads", "$HOME/Desktop"]
//! mac = ["~/Downloads"]
//! windows = ["$USERPROFILE\\Downloads"]
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Local configuration file names looked up in the working directory, in order.
const LOCAL_CONFIG_NAMES: &[&str] = &[".sortdir.toml", ".sortdir.yaml", ".sortdir.yml"];

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    /// Invalid TOML/YAML/JSON syntax or structure.
    #[error("Invalid configuration in {}: {reason}", .path.display())]
    ConfigInvalid { path: PathBuf, reason: String },
    /// Invalid glob pattern provided.
    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidGlobPattern { pattern: String, reason: String },
    /// IO error while reading configuration.
    #[error("IO error reading configuration: {0}")]
    Io(#[from] std::io::Error),
    /// Settings could not be written back out.
    #[error("Could not serialize configuration: {0}")]
    Serialize(String),
}

/// Serialization format of a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Picks the format from a file extension, defaulting to TOML.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .as_deref()
        {
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            Some("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

/// Risk level attached to a category. Informational only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    #[default]
    Low,
    Medium,
    High,
}

/// A size-qualified subdivision of a category.
///
/// Bounds are in decimal megabytes. A missing `min_size_mb` means 0 and a
/// missing `max_size_mb` means unbounded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SizeVariant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size_mb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size_mb: Option<f64>,
}

impl SizeVariant {
    /// Lower bound in MB (inclusive).
    pub fn min_mb(&self) -> f64 {
        self.min_size_mb.unwrap_or(0.0)
    }

    /// Upper bound in MB (exclusive).
    pub fn max_mb(&self) -> f64 {
        self.max_size_mb.unwrap_or(f64::INFINITY)
    }
}

/// A named bucket of file extensions with optional size variants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub risk: Risk,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<SizeVariant>,
}

/// Destination used for files that match no category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Defaults {
    pub name: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            name: "Other".to_string(),
        }
    }
}

/// Directories that may be organized, per operating system.
///
/// Entries may contain `~`, `$VAR` or `${VAR}`; they are expanded when the
/// guard is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllowedPaths {
    #[serde(default)]
    pub linux: Vec<String>,
    #[serde(default, alias = "darwin")]
    pub mac: Vec<String>,
    #[serde(default)]
    pub windows: Vec<String>,
}

impl AllowedPaths {
    /// The allow-list for the operating system this binary runs on.
    ///
    /// Platforms without a list of their own share the Linux one.
    pub fn for_current_os(&self) -> &[String] {
        if cfg!(target_os = "windows") {
            &self.windows
        } else if cfg!(target_os = "macos") {
            &self.mac
        } else {
            &self.linux
        }
    }

    /// Mutable counterpart of [`for_current_os`](Self::for_current_os).
    pub fn for_current_os_mut(&mut self) -> &mut Vec<String> {
        if cfg!(target_os = "windows") {
            &mut self.windows
        } else if cfg!(target_os = "macos") {
            &mut self.mac
        } else {
            &mut self.linux
        }
    }
}

/// Complete in-memory configuration for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Directory holding `history_*.json` files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_dir: Option<String>,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub categories: Vec<CategoryRule>,
    #[serde(default)]
    pub allowed_paths: AllowedPaths,
}

impl Settings {
    /// Load configuration from a file, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. Look for `.sortdir.toml` (or `.yaml`/`.yml`) in the current directory
    /// 3. Look for `sortdir/config.toml` in the user configuration directory
    /// 4. Fall back to the built-in rule set
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is found or explicitly provided
    /// but cannot be read or parsed.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        match Self::locate(config_path) {
            Some(path) => Self::load_from_file(&path),
            None => {
                tracing::debug!("No configuration file found, using built-in rules");
                Ok(Self::default())
            }
        }
    }

    /// The file [`load`](Self::load) reads, or `None` when the built-in
    /// rules apply. An explicit path is returned even if it does not exist.
    pub fn locate(config_path: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = config_path {
            return Some(path.to_path_buf());
        }

        LOCAL_CONFIG_NAMES
            .iter()
            .map(PathBuf::from)
            .chain(user_config_path())
            .find(|candidate| candidate.exists())
    }

    /// Writes the settings to `path` in the format its extension names,
    /// creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self
            .to_string_with_format(ConfigFormat::from_path(path))
            .map_err(ConfigError::Serialize)?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        tracing::info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Renders the settings in the given format.
    pub fn to_string_with_format(&self, format: ConfigFormat) -> Result<String, String> {
        match format {
            ConfigFormat::Toml => toml::to_string_pretty(self).map_err(|e| e.to_string()),
            ConfigFormat::Yaml => serde_yaml::to_string(self).map_err(|e| e.to_string()),
            ConfigFormat::Json => serde_json::to_string_pretty(self).map_err(|e| e.to_string()),
        }
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigNotFound` if file does not exist.
    /// Returns `ConfigError::ConfigInvalid` if parsing fails.
    /// Returns `ConfigError::Io` if file cannot be read.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings = Self::from_str_with_format(&content, ConfigFormat::from_path(path))
            .map_err(|reason| ConfigError::ConfigInvalid {
                path: path.to_path_buf(),
                reason,
            })?;

        tracing::info!(
            "Loaded {} categories from {}",
            settings.categories.len(),
            path.display()
        );
        Ok(settings)
    }

    /// Parse settings from a string and normalize extensions.
    pub fn from_str_with_format(content: &str, format: ConfigFormat) -> Result<Self, String> {
        let mut settings: Settings = match format {
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| e.to_string())?,
            ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string())?,
            ConfigFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string())?,
        };
        settings.normalize();
        Ok(settings)
    }

    /// Lowercases extensions and gives every one of them a leading dot.
    fn normalize(&mut self) {
        for category in &mut self.categories {
            for ext in &mut category.extensions {
                *ext = normalize_extension(ext);
            }
        }
    }

    /// Resolved directory holding history files.
    pub fn history_dir(&self) -> PathBuf {
        match &self.history_dir {
            Some(raw) => expand_path(raw),
            None => default_history_dir(),
        }
    }

    /// Collects every structural problem in the rule set.
    ///
    /// An empty list means the configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.defaults.name.trim().is_empty() {
            errors.push("Default destination name cannot be empty".to_string());
        }

        for (idx, category) in self.categories.iter().enumerate() {
            let num = idx + 1;
            if category.name.trim().is_empty() {
                errors.push(format!("Category #{num} name cannot be empty"));
            }
            let label = if category.name.trim().is_empty() {
                format!("#{num}")
            } else {
                category.name.clone()
            };

            if category.kind.trim().is_empty() {
                errors.push(format!("Category {label} missing 'type'"));
            }
            if category.extensions.is_empty() {
                errors.push(format!("Category {label} has no extensions"));
            }
            if category.extensions.iter().any(|ext| ext.len() <= 1) {
                errors.push(format!("Category {label} contains an empty extension"));
            }

            for (var_idx, variant) in category.variants.iter().enumerate() {
                let var_num = var_idx + 1;
                if variant.name.as_deref().is_none_or(|n| n.trim().is_empty()) {
                    errors.push(format!("Category {label} variant #{var_num} missing 'name'"));
                }
                if variant.min_mb() < 0.0 {
                    errors.push(format!(
                        "Category {label} variant #{var_num} has negative min_size_mb"
                    ));
                }
                if variant.min_mb() >= variant.max_mb() {
                    errors.push(format!(
                        "Category {label} variant #{var_num} has min_size_mb >= max_size_mb"
                    ));
                }
            }
        }

        errors
    }

    /// Appends `dir` to the allow-list of the current operating system.
    ///
    /// Returns `false` and leaves the list alone when an existing entry
    /// already resolves to the same directory.
    pub fn add_allowed_path(&mut self, dir: &Path) -> bool {
        let wanted = resolve(dir);
        let list = self.allowed_paths.for_current_os_mut();
        if list.iter().any(|raw| resolve(&expand_path(raw)) == wanted) {
            return false;
        }
        list.push(dir.display().to_string());
        true
    }
}

impl Default for Settings {
    fn default() -> Self {
        let home_dirs = |prefix: &str, sep: &str| -> Vec<String> {
            ["Downloads", "Desktop", "Documents", "Pictures", "Music", "Videos"]
                .iter()
                .map(|dir| format!("{prefix}{sep}{dir}"))
                .collect()
        };

        Self {
            defaults: Defaults::default(),
            categories: vec![
                category(
                    "Images",
                    "media",
                    &[
                        ".png", ".jpg", ".jpeg", ".gif", ".webp", ".svg", ".bmp", ".tiff", ".ico",
                        ".heic",
                    ],
                ),
                CategoryRule {
                    variants: vec![
                        SizeVariant {
                            name: Some("Short".to_string()),
                            min_size_mb: None,
                            max_size_mb: Some(100.0),
                        },
                        SizeVariant {
                            name: Some("Long".to_string()),
                            min_size_mb: Some(100.0),
                            max_size_mb: None,
                        },
                    ],
                    ..category(
                        "Videos",
                        "media",
                        &[".mp4", ".mkv", ".avi", ".mov", ".flv", ".wmv", ".webm", ".3gp"],
                    )
                },
                category(
                    "Audio",
                    "media",
                    &[".mp3", ".wav", ".ogg", ".flac", ".aac", ".m4a", ".wma"],
                ),
                category(
                    "Documents",
                    "document",
                    &[
                        ".pdf", ".txt", ".doc", ".docx", ".html", ".htm", ".md", ".rtf", ".odt",
                    ],
                ),
                category(
                    "Spreadsheets",
                    "document",
                    &[".csv", ".xls", ".xlsx", ".ods"],
                ),
                category("Presentations", "document", &[".ppt", ".pptx", ".odp"]),
                CategoryRule {
                    risk: Risk::Medium,
                    ..category(
                        "Archives",
                        "archive",
                        &[".zip", ".rar", ".7z", ".tar", ".gz", ".bz2", ".xz"],
                    )
                },
                CategoryRule {
                    risk: Risk::High,
                    ..category(
                        "Code",
                        "code",
                        &[
                            ".py", ".java", ".c", ".cpp", ".h", ".hpp", ".js", ".ts", ".rs", ".go",
                            ".sh", ".json", ".xml", ".yaml", ".yml", ".toml",
                        ],
                    )
                },
                category("Fonts", "font", &[".ttf", ".otf", ".woff", ".woff2"]),
            ],
            allowed_paths: AllowedPaths {
                linux: home_dirs("~", "/"),
                mac: home_dirs("~", "/"),
                windows: home_dirs("$USERPROFILE", "\\"),
            },
            history_dir: None,
        }
    }
}

fn category(name: &str, kind: &str, extensions: &[&str]) -> CategoryRule {
    CategoryRule {
        name: name.to_string(),
        kind: kind.to_string(),
        extensions: extensions.iter().map(|ext| ext.to_string()).collect(),
        risk: Risk::Low,
        variants: Vec::new(),
    }
}

/// Lowercases an extension and prefixes it with `.` when missing.
pub fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}

/// Expands `~` and environment variables in a configured path.
///
/// Undefined variables leave the input untouched.
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(e) => {
            tracing::debug!("Could not expand '{}': {}", raw, e);
            PathBuf::from(raw)
        }
    }
}

/// `sortdir/config.toml` under the user configuration directory.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("sortdir").join("config.toml"))
}

fn resolve(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn default_history_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sortdir")
        .join("logs")
}
