//! Shared test utilities for the plainblog test suite.
//!
//! Builds throwaway content trees with controlled modification times.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let site = ContentTree::new()
//!     .entry("about.txt", "About me\nHello.")
//!     .entry_at("blog/first.txt", "First post\nBody.", (2024, 3, 7));
//!
//! let config = site.config();
//! assert_eq!(config.datadir, site.root());
//! ```

use crate::config::SiteConfig;
use chrono::{DateTime, Local, TimeZone};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::TempDir;

// =========================================================================
// Time
// =========================================================================

/// Noon local time on the given day.
pub fn local_noon((year, month, day): (i32, u32, u32)) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(year, month, day, 12, 0, 0)
        .single()
        .unwrap_or_else(|| panic!("ambiguous local time {year}-{month}-{day}"))
}

/// Set a file's mtime.
pub fn set_mtime(path: &Path, time: DateTime<Local>) {
    let file = fs::File::options()
        .write(true)
        .open(path)
        .unwrap_or_else(|e| panic!("open {} for set_modified: {e}", path.display()));
    file.set_modified(SystemTime::from(time))
        .unwrap_or_else(|e| panic!("set_modified {}: {e}", path.display()));
}

// =========================================================================
// Content tree builder
// =========================================================================

/// A content directory in a temp dir, removed on drop.
pub struct ContentTree {
    tmp: TempDir,
    root: PathBuf,
}

impl ContentTree {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("content");
        fs::create_dir_all(&root).unwrap();
        Self { tmp, root }
    }

    /// The content root (`datadir`).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A scratch directory next to the content root, e.g. for static output.
    pub fn scratch(&self, name: &str) -> PathBuf {
        self.tmp.path().join(name)
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }

    /// `path` relative to the root, with forward slashes.
    pub fn rel(&self, path: &Path) -> String {
        path.strip_prefix(self.root())
            .unwrap_or_else(|_| panic!("{} is outside the content tree", path.display()))
            .to_string_lossy()
            .replace('\\', "/")
    }

    /// Write a text file, creating parent directories.
    pub fn entry(self, rel: &str, content: &str) -> Self {
        self.raw(rel, content.as_bytes())
    }

    /// Write a text file and set its mtime to noon on `day`.
    pub fn entry_at(self, rel: &str, content: &str, day: (i32, u32, u32)) -> Self {
        let site = self.entry(rel, content);
        set_mtime(&site.path(rel), local_noon(day));
        site
    }

    pub fn raw(self, rel: &str, bytes: &[u8]) -> Self {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, bytes).unwrap();
        self
    }

    pub fn dir(self, rel: &str) -> Self {
        fs::create_dir_all(self.path(rel)).unwrap();
        self
    }

    /// Stock config pointing at this tree, with a static dir next to it.
    pub fn config(&self) -> SiteConfig {
        let mut config = SiteConfig {
            datadir: self.root().to_path_buf(),
            blog_title: "Test Blog".to_string(),
            base_url: "http://blog.test".to_string(),
            ..SiteConfig::default()
        };
        config.static_site.dir = self.scratch("static");
        config
    }
}

impl Default for ContentTree {
    fn default() -> Self {
        Self::new()
    }
}
