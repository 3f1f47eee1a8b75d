//! Blog configuration module.
//!
//! Handles loading, validating, and layering `config.toml`. The stock
//! defaults are the base layer; the user's file is merged on top of them
//! key by key, so a config file only needs the values it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! datadir = "content"         # Where entries live
//! blog_title = "My Weblog"
//! blog_description = ""
//! blog_author = ""
//! blog_language = "en"
//! blog_encoding = "utf-8"
//! base_url = ""               # Absolute URL of the blog root, no trailing slash
//! default_flavour = "html"    # Used when the URL names no flavour
//! parser = "plain"            # Body formatter: "plain" or "markdown"
//! depth = 0                   # Listing depth below the category (0 = unlimited)
//! num_entries = 5             # Entries on a non-date listing (0 = all)
//! ignore_directories = []     # Directory names skipped while walking
//!
//! [static]
//! dir = ""                    # Output directory for `build` (required there)
//! flavours = ["html"]         # Flavours rendered per path
//! monthnames = true           # Render /2024/Mar style date indexes
//! monthnumbers = false        # Render /2024/03 style date indexes
//! urls = []                   # Extra paths, e.g. "/feeds/all.rss?flav=rss"
//!
//! [cache]
//! enabled = false             # Cache parsed entries between runs
//! dir = ".plainblog-cache"
//!
//! [logging]
//! level = "info"              # RUST_LOG overrides this
//! # file = "plainblog.log"
//!
//! [processing]
//! max_processes = 4           # Parallel static render workers (omit for auto)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Blog configuration loaded from `config.toml`.
///
/// All fields have defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Root of the content tree.
    pub datadir: PathBuf,
    pub blog_title: String,
    pub blog_description: String,
    pub blog_author: String,
    pub blog_language: String,
    pub blog_encoding: String,
    /// Absolute URL of the blog root. Stored without a trailing slash.
    pub base_url: String,
    /// Flavour used when neither the path nor the query names one.
    pub default_flavour: String,
    /// Default body formatter for entries that don't name one.
    pub parser: String,
    /// Maximum directory depth walked for a listing. 0 means unlimited.
    pub depth: usize,
    /// Maximum entries on a listing without a date filter. 0 means all.
    pub num_entries: usize,
    /// Directory names never descended into.
    pub ignore_directories: Vec<String>,
    /// Static rendering settings.
    #[serde(rename = "static")]
    pub static_site: StaticConfig,
    /// Parsed-entry cache settings.
    pub cache: CacheConfig,
    /// Log level and optional log file.
    pub logging: LoggingConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            datadir: PathBuf::from("content"),
            blog_title: "My Weblog".to_string(),
            blog_description: String::new(),
            blog_author: String::new(),
            blog_language: "en".to_string(),
            blog_encoding: "utf-8".to_string(),
            base_url: String::new(),
            default_flavour: "html".to_string(),
            parser: "plain".to_string(),
            depth: 0,
            num_entries: 5,
            ignore_directories: Vec::new(),
            static_site: StaticConfig::default(),
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_flavour_token(&self.default_flavour) {
            return Err(ConfigError::Validation(format!(
                "default_flavour must be a non-empty alphanumeric token, got {:?}",
                self.default_flavour
            )));
        }
        if self.static_site.flavours.is_empty() {
            return Err(ConfigError::Validation(
                "static.flavours must not be empty".into(),
            ));
        }
        if let Some(bad) = self
            .static_site
            .flavours
            .iter()
            .find(|f| !is_flavour_token(f))
        {
            return Err(ConfigError::Validation(format!(
                "static.flavours contains an invalid flavour {bad:?}"
            )));
        }
        if self.parser != "plain" && self.parser != "markdown" {
            return Err(ConfigError::Validation(format!(
                "parser must be \"plain\" or \"markdown\", got {:?}",
                self.parser
            )));
        }
        Ok(())
    }

    /// Trim trailing slashes that would otherwise double up in URLs.
    fn normalize(&mut self) {
        while self.base_url.ends_with('/') {
            self.base_url.pop();
        }
    }
}

fn is_flavour_token(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Static rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaticConfig {
    /// Output directory. Empty means "not configured".
    pub dir: PathBuf,
    /// Flavours rendered for every entry, category and date path. The first
    /// one decides staleness in incremental builds.
    pub flavours: Vec<String>,
    /// Emit `/YYYY/Mon` and `/YYYY/Mon/DD` date indexes.
    pub monthnames: bool,
    /// Emit `/YYYY/MM` and `/YYYY/MM/DD` date indexes.
    pub monthnumbers: bool,
    /// Extra paths rendered verbatim. A `?` splits off a query string.
    pub urls: Vec<String>,
}

impl Default for StaticConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::new(),
            flavours: vec!["html".to_string()],
            monthnames: true,
            monthnumbers: false,
            urls: Vec::new(),
        }
    }
}

/// Parsed-entry cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Directory holding the cache manifest.
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from(".plainblog-cache"),
        }
    }
}

/// Logging settings. `RUST_LOG` takes precedence over `level`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel render workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.clamp(1, cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(SiteConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize, normalize
/// and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let mut config: SiteConfig = merged.try_into()?;
    config.normalize();
    config.validate()?;
    Ok(config)
}

/// Load the config file at `path` on top of the stock defaults.
///
/// A missing file is not an error: the defaults are returned. A relative
/// `datadir` or `static.dir` is kept as written, i.e. relative to the
/// working directory.
pub fn load_config(path: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# plainblog configuration
# =======================
# All settings are optional. Values shown below are the defaults.
# Unknown keys will cause an error.

# Directory holding your entries. Subdirectories become categories.
datadir = "content"

blog_title = "My Weblog"
blog_description = ""
blog_author = ""
blog_language = "en"
blog_encoding = "utf-8"

# Absolute URL of the blog root, used for links. Trailing slashes are trimmed.
base_url = ""

# Flavour used when the URL doesn't name one (/index.rss, ?flav=rss).
default_flavour = "html"

# Default body formatter: "plain" keeps the text as written, "markdown"
# converts it. An entry can override this with a "#parser markdown" line.
parser = "plain"

# How deep listings look below the requested category. 0 = unlimited.
depth = 0

# Entries shown on a listing that has no date in its URL. 0 = all.
num_entries = 5

# Directory names that are never walked.
ignore_directories = []

# ---------------------------------------------------------------------------
# Static rendering (`plainblog build`)
# ---------------------------------------------------------------------------
[static]
# Output directory. Must be set before running a static build.
dir = ""

# Flavours rendered for each entry, category and date page.
flavours = ["html"]

# Date index styles: /2024/Mar (names) and /2024/03 (numbers).
monthnames = true
monthnumbers = false

# Extra paths to render as-is, optionally with a query string:
# urls = ["/feeds/all.rss?flav=rss"]
urls = []

# ---------------------------------------------------------------------------
# Entry cache
# ---------------------------------------------------------------------------
[cache]
# Keep parsed entries on disk so unchanged files are not parsed again.
enabled = false
dir = ".plainblog-cache"

# ---------------------------------------------------------------------------
# Logging
# ---------------------------------------------------------------------------
[logging]
# trace, debug, info, warn or error. RUST_LOG overrides this.
level = "info"
# file = "plainblog.log"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel render workers during a static build.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
