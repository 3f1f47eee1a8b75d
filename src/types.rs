//! Shared types passed between the resolver, the selector, the pipeline and
//! the static builder.

use crate::dates;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Whether a request names one entry or a set of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteKind {
    Entry,
    Listing,
}

/// Where a request points inside the content tree.
///
/// `day` is only ever set together with `month`, and `month` only together
/// with `year`. `month` is always the two-digit number, even when the URL
/// spelled it `Mar`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub kind: RouteKind,
    /// Directory the listing walks, or the entry's directory.
    pub base_dir: PathBuf,
    /// The content file for an `Entry` route.
    pub explicit_file: Option<PathBuf>,
    pub year: Option<String>,
    pub month: Option<String>,
    pub day: Option<String>,
    /// Forward-slash category, no leading or trailing slash. Root is `""`.
    pub category_path: String,
    pub flavour: String,
}

impl RoutingDecision {
    /// A listing of `base_dir` with no date filter.
    pub fn listing(base_dir: PathBuf, category_path: &str, flavour: &str) -> Self {
        Self {
            kind: RouteKind::Listing,
            base_dir,
            explicit_file: None,
            year: None,
            month: None,
            day: None,
            category_path: normalize_category(category_path),
            flavour: flavour.to_string(),
        }
    }

    /// A single entry.
    pub fn entry(file: PathBuf, category_path: &str, flavour: &str) -> Self {
        let base_dir = file.parent().map(Path::to_path_buf).unwrap_or_default();
        Self {
            kind: RouteKind::Entry,
            base_dir,
            explicit_file: Some(file),
            year: None,
            month: None,
            day: None,
            category_path: normalize_category(category_path),
            flavour: flavour.to_string(),
        }
    }

    pub fn has_date_filter(&self) -> bool {
        self.year.is_some()
    }

    /// Prefix an entry's [`EntryRecord::fulltime`] must start with, or
    /// `None` when no date filter is active.
    pub fn date_prefix(&self) -> Option<String> {
        let year = self.year.as_deref()?;
        let mut prefix = year.to_string();
        if let Some(month) = &self.month {
            prefix.push_str(month);
            if let Some(day) = &self.day {
                prefix.push_str(day);
            }
        }
        Some(prefix)
    }
}

/// Collapse a category to `a/b/c` form: forward slashes, no empty segments.
pub fn normalize_category(raw: &str) -> String {
    raw.split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// One parsed content file.
///
/// Built once per request by the selector and never mutated afterwards;
/// a re-parse produces a fresh record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub source_path: PathBuf,
    /// `None` when no time could be determined. Such entries sort first.
    pub modified_time: Option<DateTime<Local>>,
    /// Category relative to the content root, `""` for the root.
    pub category: String,
    pub metadata: BTreeMap<String, String>,
    pub title: String,
    /// Formatted body (after preformat).
    pub body: String,
}

impl EntryRecord {
    /// `YYYYMMDDHHMMSS`, or empty when the entry has no time.
    pub fn fulltime(&self) -> String {
        self.modified_time
            .as_ref()
            .map(dates::fulltime)
            .unwrap_or_default()
    }

    /// File stem: `hello` for `blog/hello.txt`.
    pub fn name(&self) -> String {
        self.source_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Logical path without extension: `blog/hello`.
    pub fn path(&self) -> String {
        if self.category.is_empty() {
            self.name()
        } else {
            format!("{}/{}", self.category, self.name())
        }
    }

    /// Absolute URL of this entry in the given flavour.
    pub fn url(&self, base_url: &str, flavour: &str) -> String {
        format!("{}/{}.{}", base_url, self.path(), flavour)
    }
}

/// One page the static builder renders: a request path plus query string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderTarget {
    pub output_path: String,
    pub query_string: String,
}

impl RenderTarget {
    pub fn new(output_path: impl Into<String>) -> Self {
        Self {
            output_path: output_path.into(),
            query_string: String::new(),
        }
    }

    /// Split `"/feeds/all.rss?flav=rss"` at the first `?`.
    pub fn from_url(url: &str) -> Self {
        match url.split_once('?') {
            Some((path, query)) => Self {
                output_path: path.to_string(),
                query_string: query.to_string(),
            },
            None => Self::new(url),
        }
    }
}
