/// Rule-based file categorization.
///
/// Maps a file's (suffix, size) to a destination directory name using an
/// ordered list of category rules. Categories are scanned in declaration
/// order; the first one whose extension set contains the suffix wins, and its
/// size variants are then tried in order.
///
/// # Examples
///
/// ```
/// use sortdir::config::Settings;
/// use sortdir::file_category::RuleMatcher;
///
/// let mut matcher = RuleMatcher::new(&Settings::default()).unwrap();
/// assert_eq!(matcher.categorize(".png", 2_000_000).unwrap(), "Images");
/// assert_eq!(matcher.categorize(".mp4", 5_000_000).unwrap(), "Short-Videos");
/// assert_eq!(matcher.categorize(".unknown", 10).unwrap(), "Other");
/// ```
use crate::config::{CategoryRule, Settings, SizeVariant};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

/// Bytes in a (decimal) megabyte.
pub const BYTES_PER_MB: f64 = 1_000_000.0;

/// Converts a byte count to decimal megabytes.
pub fn bytes_to_mb(size_bytes: u64) -> f64 {
    size_bytes as f64 / BYTES_PER_MB
}

/// Lowercase suffix of a file including the dot, or an empty string.
///
/// ```
/// use sortdir::file_category::file_suffix;
/// use std::path::Path;
///
/// assert_eq!(file_suffix(Path::new("photo.JPG")), ".jpg");
/// assert_eq!(file_suffix(Path::new("archive.tar.gz")), ".gz");
/// assert_eq!(file_suffix(Path::new("Makefile")), "");
/// ```
pub fn file_suffix(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Fatal rule-set errors. Any of these aborts the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    /// A category was declared without a name.
    #[error("category #{index} has an empty name")]
    EmptyCategoryName { index: usize },
    /// A file landed in a size variant that has no name.
    #[error("category '{category}' variant #{index} is missing a name")]
    MissingVariantName { category: String, index: usize },
}

/// Half-open size interval `[min_mb, max_mb)`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SizeBand {
    min_mb: f64,
    max_mb: f64,
}

impl SizeBand {
    const ANY: SizeBand = SizeBand {
        min_mb: f64::NEG_INFINITY,
        max_mb: f64::INFINITY,
    };

    fn of(variant: &SizeVariant) -> Self {
        Self {
            min_mb: variant.min_mb(),
            max_mb: variant.max_mb(),
        }
    }

    fn contains(&self, size_mb: f64) -> bool {
        size_mb >= self.min_mb && size_mb < self.max_mb
    }

    fn overlaps(&self, other: &SizeBand) -> bool {
        self.min_mb < other.max_mb && other.min_mb < self.max_mb
    }
}

#[derive(Debug, Clone)]
struct CompiledCategory {
    name: String,
    extensions: HashSet<String>,
    variants: Vec<SizeVariant>,
}

#[derive(Debug, Clone)]
struct CachedMatch {
    band: SizeBand,
    destination: String,
}

/// Resolves destination names for files, memoizing per (suffix, size band).
///
/// A matcher is built once per run from a fixed rule set, so a cached
/// destination stays valid for every later file with the same suffix whose
/// size falls in the same band.
#[derive(Debug, Clone)]
pub struct RuleMatcher {
    categories: Vec<CompiledCategory>,
    default_name: String,
    cache: HashMap<String, Vec<CachedMatch>>,
}

impl RuleMatcher {
    /// Builds a matcher from the categories and default of `settings`.
    pub fn new(settings: &Settings) -> Result<Self, MatchError> {
        Self::from_rules(&settings.categories, &settings.defaults.name)
    }

    /// Builds a matcher from an ordered list of rules.
    ///
    /// # Errors
    ///
    /// Returns `MatchError::EmptyCategoryName` if any category has no name.
    pub fn from_rules(categories: &[CategoryRule], default_name: &str) -> Result<Self, MatchError> {
        let categories = categories
            .iter()
            .enumerate()
            .map(|(idx, rule)| {
                if rule.name.trim().is_empty() {
                    return Err(MatchError::EmptyCategoryName { index: idx + 1 });
                }
                Ok(CompiledCategory {
                    name: rule.name.clone(),
                    extensions: rule.extensions.iter().map(|ext| ext.to_lowercase()).collect(),
                    variants: rule.variants.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            categories,
            default_name: default_name.to_string(),
            cache: HashMap::new(),
        })
    }

    /// Name used for files that match no category.
    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    /// Number of cached (suffix, band) destinations.
    pub fn cached_entries(&self) -> usize {
        self.cache.values().map(Vec::len).sum()
    }

    /// Returns the destination directory name for a file.
    ///
    /// `suffix` is the file suffix including the dot (case is ignored).
    /// The result is `"<variant>-<category>"` when a size variant matches,
    /// `"<category>"` when none does, and the default name when no category
    /// lists the suffix.
    ///
    /// # Errors
    ///
    /// Returns `MatchError::MissingVariantName` when the reached variant has
    /// no name. Callers must treat this as fatal for the run.
    pub fn categorize(&mut self, suffix: &str, size_bytes: u64) -> Result<String, MatchError> {
        let suffix = suffix.to_lowercase();
        let size_mb = bytes_to_mb(size_bytes);

        if let Some(hit) = self
            .cache
            .get(&suffix)
            .and_then(|bands| bands.iter().find(|cached| cached.band.contains(size_mb)))
        {
            return Ok(hit.destination.clone());
        }

        let (destination, band) = self.resolve(&suffix, size_mb)?;
        if let Some(band) = band {
            self.cache.entry(suffix).or_default().push(CachedMatch {
                band,
                destination: destination.clone(),
            });
        }
        Ok(destination)
    }

    /// Scans the rules. Also returns the band the answer is valid for, when
    /// that band can be cached without shadowing an earlier variant.
    fn resolve(&self, suffix: &str, size_mb: f64) -> Result<(String, Option<SizeBand>), MatchError> {
        let Some(category) = self
            .categories
            .iter()
            .find(|category| category.extensions.contains(suffix))
        else {
            return Ok((self.default_name.clone(), Some(SizeBand::ANY)));
        };

        for (idx, variant) in category.variants.iter().enumerate() {
            let band = SizeBand::of(variant);
            if !band.contains(size_mb) {
                continue;
            }

            let name = variant
                .name
                .as_deref()
                .filter(|name| !name.trim().is_empty())
                .ok_or_else(|| MatchError::MissingVariantName {
                    category: category.name.clone(),
                    index: idx + 1,
                })?;

            let shadowed = category.variants[..idx]
                .iter()
                .any(|earlier| SizeBand::of(earlier).overlaps(&band));
            let cacheable = (!shadowed).then_some(band);
            return Ok((format!("{}-{}", name, category.name), cacheable));
        }

        // Variants exist but none matched: the gap between them is not a
        // single band, so only the variant-free case is cached.
        let cacheable = category.variants.is_empty().then_some(SizeBand::ANY);
        Ok((category.name.clone(), cacheable))
    }
}
