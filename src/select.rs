//! Entry selection.
//!
//! Given a [`RoutingDecision`], find the content files it covers, load each
//! one into an [`EntryRecord`], then order, date-filter and cap the list.
//!
//! ## Loading an entry
//!
//! ```text
//! file ──▶ cache hit? ──yes──────────────────────────────┐
//!              │ no                                      │
//!              ▼                                         ▼
//!         parser.parse ─▶ preformat ─▶ postformat ─▶ ParsedEntry ─▶ EntryRecord
//!                                          (cache.put)            (+ mtime, category)
//! ```
//!
//! The modification time is never cached: it comes from a `#date` metadata
//! line when there is a parseable one, otherwise from the filesystem mtime
//! passed through the `filestat` chain.
//!
//! A file that fails to parse is skipped with a warning; the rest of the
//! listing is unaffected. A failing callback handler is different: it aborts
//! the selection and the error reaches the caller.

use crate::cache::EntryCache;
use crate::callback::CallbackError;
use crate::config::SiteConfig;
use crate::parser::{self, Extensions, ParsedEntry};
use crate::plugin::{Callbacks, FileStat, Preformat};
use crate::types::{EntryRecord, RouteKind, RoutingDecision, normalize_category};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Everything entry loading needs from the blog.
pub struct Selector<'a> {
    pub config: &'a SiteConfig,
    pub extensions: &'a Extensions,
    pub callbacks: &'a Callbacks,
    pub cache: &'a dyn EntryCache,
}

impl Selector<'_> {
    /// The ordered, filtered and capped entries for a route.
    pub fn select(&self, route: &RoutingDecision) -> Result<Vec<EntryRecord>, CallbackError> {
        let candidates = match route.kind {
            RouteKind::Entry => route.explicit_file.iter().cloned().collect(),
            RouteKind::Listing => walk(
                &route.base_dir,
                self.config.depth,
                &self.config.ignore_directories,
                |ext| self.extensions.contains_key(ext),
            ),
        };
        debug!(count = candidates.len(), base = %route.base_dir.display(), "candidate files");

        let mut entries = Vec::with_capacity(candidates.len());
        for path in &candidates {
            if let Some(entry) = self.load(path)? {
                entries.push(entry);
            }
        }

        sort_entries(&mut entries);
        match route.date_prefix() {
            Some(prefix) => filter_by_date(&mut entries, &prefix),
            None => apply_cap(&mut entries, self.config.num_entries),
        }
        Ok(entries)
    }

    /// Load one file. `Ok(None)` means the file was skipped (no parser for
    /// its extension, or the parser failed).
    pub fn load(&self, path: &Path) -> Result<Option<EntryRecord>, CallbackError> {
        let Some(parsed) = self.parsed(path)? else {
            return Ok(None);
        };
        let modified_time = self.time_of(path, &parsed)?;

        Ok(Some(EntryRecord {
            source_path: path.to_path_buf(),
            modified_time,
            category: category_of(&self.config.datadir, path),
            metadata: parsed.metadata,
            title: parsed.title,
            body: parsed.body,
        }))
    }

    /// The time an entry is listed under: its `#date` when parseable,
    /// otherwise [`file_mtime`](Self::file_mtime). A file that can't be
    /// parsed falls back to its mtime.
    pub fn entry_time(&self, path: &Path) -> Result<Option<DateTime<Local>>, CallbackError> {
        match self.parsed(path)? {
            Some(parsed) => self.time_of(path, &parsed),
            None => self.file_mtime(path),
        }
    }

    /// Parsed and formatted entry, from the cache when current.
    fn parsed(&self, path: &Path) -> Result<Option<ParsedEntry>, CallbackError> {
        let Some(entry_parser) = extension_of(path).and_then(|ext| self.extensions.get(ext))
        else {
            return Ok(None);
        };

        if let Some(cached) = self.cache.get(path) {
            return Ok(Some(cached));
        }

        let mut parsed = match entry_parser.parse(path) {
            Ok(p) => p,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping entry that failed to parse");
                return Ok(None);
            }
        };
        let mut pre = Preformat {
            path: path.to_path_buf(),
            parser: parsed
                .metadata
                .get("parser")
                .cloned()
                .unwrap_or_else(|| self.config.parser.clone()),
            text: std::mem::take(&mut parsed.body),
        };
        parsed.body = self
            .callbacks
            .preformat
            .run_first(&mut pre, |ctx| Ok(parser::format_body(&ctx.parser, &ctx.text)))?;
        self.callbacks.postformat.run_all(&mut parsed)?;
        self.cache.put(path, &parsed);
        Ok(Some(parsed))
    }

    fn time_of(
        &self,
        path: &Path,
        parsed: &ParsedEntry,
    ) -> Result<Option<DateTime<Local>>, CallbackError> {
        match parsed.metadata.get("date").and_then(|d| parse_date(d)) {
            Some(t) => Ok(Some(t)),
            None => self.file_mtime(path),
        }
    }

    /// Filesystem mtime of `path` after the `filestat` chain had its say.
    pub fn file_mtime(&self, path: &Path) -> Result<Option<DateTime<Local>>, CallbackError> {
        let mut stat = FileStat {
            path: path.to_path_buf(),
            mtime: fs::metadata(path)
                .and_then(|m| m.modified())
                .ok()
                .map(DateTime::<Local>::from),
        };
        self.callbacks.filestat.run_all(&mut stat)?;
        Ok(stat.mtime)
    }
}

/// Content files under `root`, sorted by path.
///
/// `depth` bounds the walk (1 = only files directly in `root`, 0 =
/// unlimited). Hidden entries and directories named in `ignore` are never
/// descended into. A missing `root` yields nothing.
pub fn walk<F>(root: &Path, depth: usize, ignore: &[String], has_parser: F) -> Vec<PathBuf>
where
    F: Fn(&str) -> bool,
{
    let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name();
    if depth > 0 {
        walker = walker.max_depth(depth);
    }
    walker
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !name.starts_with('.')
                && !(e.file_type().is_dir() && ignore.iter().any(|i| *i == name))
        })
        .filter_map(|e| match e {
            Ok(e) => Some(e),
            Err(err) => {
                debug!(error = %err, "skipping unreadable path");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| extension_of(p).is_some_and(&has_parser))
        .collect()
}

/// Newest first, stable. Entries without a time come before all others.
pub fn sort_entries(entries: &mut [EntryRecord]) {
    entries.sort_by(|a, b| match (&a.modified_time, &b.modified_time) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => y.cmp(x),
    });
}

/// Keep entries whose `fulltime()` starts with `prefix`.
pub fn filter_by_date(entries: &mut Vec<EntryRecord>, prefix: &str) {
    entries.retain(|e| e.fulltime().starts_with(prefix));
}

/// Truncate to `num_entries`; 0 keeps everything.
pub fn apply_cap(entries: &mut Vec<EntryRecord>, num_entries: usize) {
    if num_entries > 0 {
        entries.truncate(num_entries);
    }
}

/// Category of a content file: its directory relative to `datadir`.
pub fn category_of(datadir: &Path, path: &Path) -> String {
    path.parent()
        .and_then(|dir| dir.strip_prefix(datadir).ok())
        .map(|rel| normalize_category(&rel.to_string_lossy()))
        .unwrap_or_default()
}

fn extension_of(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM` and `YYYY-MM-DD HH:MM:SS`, in
/// local time.
pub fn parse_date(value: &str) -> Option<DateTime<Local>> {
    let value = value.trim();
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    Local.from_local_datetime(&naive).earliest()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCache, NullCache};
    use crate::callback::Priority;
    use crate::parser::default_extensions;
    use crate::test_helpers::*;
    use std::collections::BTreeMap;

    fn record(name: &str, time: Option<(i32, u32, u32)>) -> EntryRecord {
        EntryRecord {
            source_path: PathBuf::from(format!("/d/{name}.txt")),
            modified_time: time.map(|(y, m, d)| Local.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()),
            category: String::new(),
            metadata: BTreeMap::new(),
            title: name.into(),
            body: String::new(),
        }
    }

    fn names(entries: &[EntryRecord]) -> Vec<String> {
        entries.iter().map(|e| e.name()).collect()
    }

    // =========================================================================
    // Ordering, filtering, capping
    // =========================================================================

    #[test]
    fn sort_newest_first_with_untimed_on_top() {
        let mut entries = vec![
            record("old", Some((2020, 1, 1))),
            record("untimed-a", None),
            record("new", Some((2024, 1, 1))),
            record("untimed-b", None),
        ];
        sort_entries(&mut entries);
        assert_eq!(names(&entries), ["untimed-a", "untimed-b", "new", "old"]);
    }

    #[test]
    fn sort_is_stable_for_equal_times() {
        let mut entries = vec![
            record("first", Some((2024, 1, 1))),
            record("second", Some((2024, 1, 1))),
            record("third", Some((2024, 1, 1))),
        ];
        sort_entries(&mut entries);
        assert_eq!(names(&entries), ["first", "second", "third"]);
    }

    #[test]
    fn date_filter_matches_prefix() {
        let mut entries = vec![
            record("a", Some((2024, 3, 7))),
            record("b", Some((2024, 11, 2))),
            record("c", Some((2023, 3, 7))),
            record("d", None),
        ];
        filter_by_date(&mut entries, "2024");
        assert_eq!(names(&entries), ["a", "b"]);
        filter_by_date(&mut entries, "202403");
        assert_eq!(names(&entries), ["a"]);
    }

    #[test]
    fn cap_law() {
        for n in 0..6 {
            let mut entries: Vec<_> = (0..4).map(|i| record(&i.to_string(), None)).collect();
            apply_cap(&mut entries, n);
            let expected = if n == 0 { 4 } else { n.min(4) };
            assert_eq!(entries.len(), expected, "num_entries = {n}");
        }
    }

    #[test]
    fn parse_date_formats() {
        assert_eq!(
            parse_date("2024-03-07 08:30:15").map(|t| crate::dates::fulltime(&t)),
            Some("20240307083015".into())
        );
        assert_eq!(
            parse_date("2024-03-07 08:30").map(|t| crate::dates::fulltime(&t)),
            Some("20240307083000".into())
        );
        assert_eq!(
            parse_date("2024-03-07").map(|t| crate::dates::fulltime(&t)),
            Some("20240307000000".into())
        );
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn category_is_relative_dir() {
        let root = Path::new("/data");
        assert_eq!(category_of(root, Path::new("/data/a.txt")), "");
        assert_eq!(category_of(root, Path::new("/data/blog/rust/a.txt")), "blog/rust");
        assert_eq!(category_of(root, Path::new("/elsewhere/a.txt")), "");
    }

    // =========================================================================
    // Walking
    // =========================================================================

    #[test]
    fn walk_skips_hidden_ignored_and_unknown() {
        let site = ContentTree::new()
            .entry("a.txt", "A")
            .entry("blog/b.txt", "B")
            .entry("blog/.draft.txt", "hidden")
            .entry(".git/c.txt", "hidden dir")
            .entry("attic/d.txt", "ignored")
            .entry("notes.md", "no parser");
        let ignore = vec!["attic".to_string()];
        let files = walk(site.root(), 0, &ignore, |e| e == "txt");
        let rel: Vec<_> = files.iter().map(|p| site.rel(p)).collect();
        assert_eq!(rel, ["a.txt", "blog/b.txt"]);
    }

    #[test]
    fn walk_respects_depth() {
        let site = ContentTree::new()
            .entry("a.txt", "A")
            .entry("x/b.txt", "B")
            .entry("x/y/c.txt", "C");
        assert_eq!(walk(site.root(), 1, &[], |_| true).len(), 1);
        assert_eq!(walk(site.root(), 2, &[], |_| true).len(), 2);
        assert_eq!(walk(site.root(), 0, &[], |_| true).len(), 3);
    }

    #[test]
    fn walk_root_may_be_hidden() {
        let site = ContentTree::new().entry(".site/a.txt", "A");
        assert_eq!(walk(&site.path(".site"), 0, &[], |_| true).len(), 1);
    }

    #[test]
    fn walk_missing_root_is_empty() {
        assert!(walk(Path::new("/no/such/dir"), 0, &[], |_| true).is_empty());
    }

    // =========================================================================
    // Loading and selecting
    // =========================================================================

    #[test]
    fn load_uses_metadata_date_then_mtime() {
        let site = ContentTree::new()
            .entry("dated.txt", "Dated\n#date 2021-06-01 10:00\nbody")
            .entry_at("plain.txt", "Plain\nbody", (2022, 2, 3));
        let config = site.config();
        let extensions = default_extensions();
        let callbacks = Callbacks::default();
        let cache = NullCache::default();
        let selector = Selector {
            config: &config,
            extensions: &extensions,
            callbacks: &callbacks,
            cache: &cache,
        };

        let dated = selector.load(&site.path("dated.txt")).unwrap().unwrap();
        assert!(dated.fulltime().starts_with("20210601"));
        let plain = selector.load(&site.path("plain.txt")).unwrap().unwrap();
        assert!(plain.fulltime().starts_with("20220203"));
        assert_eq!(plain.title, "Plain");
        assert_eq!(plain.body, "body\n");
    }

    #[test]
    fn filestat_handler_overrides_mtime() {
        let site = ContentTree::new().entry_at("a.txt", "A", (2022, 2, 3));
        let config = site.config();
        let extensions = default_extensions();
        let mut callbacks = Callbacks::default();
        callbacks.filestat.register(Priority::Normal, |stat: &mut FileStat| {
            stat.mtime = None;
            Ok(None)
        });
        let cache = NullCache::default();
        let selector = Selector {
            config: &config,
            extensions: &extensions,
            callbacks: &callbacks,
            cache: &cache,
        };
        let entry = selector.load(&site.path("a.txt")).unwrap().unwrap();
        assert_eq!(entry.modified_time, None);
    }

    #[test]
    fn markdown_metadata_selects_formatter() {
        let site = ContentTree::new()
            .entry("md.txt", "Md\n#parser markdown\n*hi*")
            .entry("plain.txt", "Plain\n*hi*");
        let config = site.config();
        let extensions = default_extensions();
        let callbacks = Callbacks::default();
        let cache = NullCache::default();
        let selector = Selector {
            config: &config,
            extensions: &extensions,
            callbacks: &callbacks,
            cache: &cache,
        };
        let md = selector.load(&site.path("md.txt")).unwrap().unwrap();
        assert!(md.body.contains("<em>hi</em>"));
        let plain = selector.load(&site.path("plain.txt")).unwrap().unwrap();
        assert_eq!(plain.body, "*hi*\n");
    }

    #[test]
    fn preformat_and_postformat_hooks() {
        let site = ContentTree::new().entry("a.txt", "Title\nbody");
        let config = site.config();
        let extensions = default_extensions();
        let mut callbacks = Callbacks::default();
        callbacks.preformat.register(Priority::Normal, |pre: &mut Preformat| {
            Ok(Some(pre.text.to_uppercase()))
        });
        callbacks
            .postformat
            .register(Priority::Normal, |e: &mut crate::parser::ParsedEntry| {
                e.title.push('!');
                Ok(None)
            });
        let cache = NullCache::default();
        let selector = Selector {
            config: &config,
            extensions: &extensions,
            callbacks: &callbacks,
            cache: &cache,
        };
        let e = selector.load(&site.path("a.txt")).unwrap().unwrap();
        assert_eq!(e.body, "BODY\n");
        assert_eq!(e.title, "Title!");
    }

    #[test]
    fn second_load_hits_cache() {
        let site = ContentTree::new().entry("a.txt", "A\nbody");
        let config = site.config();
        let extensions = default_extensions();
        let callbacks = Callbacks::default();
        let cache = MemoryCache::default();
        let selector = Selector {
            config: &config,
            extensions: &extensions,
            callbacks: &callbacks,
            cache: &cache,
        };
        selector.load(&site.path("a.txt")).unwrap();
        selector.load(&site.path("a.txt")).unwrap();
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[test]
    fn unreadable_entry_is_skipped() {
        let site = ContentTree::new()
            .entry("good.txt", "Good")
            .raw("bad.txt", &[0xff, 0xfe, 0x00]);
        let config = site.config();
        let extensions = default_extensions();
        let callbacks = Callbacks::default();
        let cache = NullCache::default();
        let selector = Selector {
            config: &config,
            extensions: &extensions,
            callbacks: &callbacks,
            cache: &cache,
        };
        let route = RoutingDecision::listing(site.root().to_path_buf(), "", "html");
        let entries = selector.select(&route).unwrap();
        assert_eq!(names(&entries), ["good"]);
    }

    #[test]
    fn listing_orders_and_caps() {
        let site = ContentTree::new()
            .entry_at("a.txt", "A", (2024, 1, 1))
            .entry_at("blog/b.txt", "B", (2024, 3, 1))
            .entry_at("blog/c.txt", "C", (2023, 5, 1));
        let mut config = site.config();
        config.num_entries = 2;
        let extensions = default_extensions();
        let callbacks = Callbacks::default();
        let cache = NullCache::default();
        let selector = Selector {
            config: &config,
            extensions: &extensions,
            callbacks: &callbacks,
            cache: &cache,
        };

        let route = RoutingDecision::listing(site.root().to_path_buf(), "", "html");
        assert_eq!(names(&selector.select(&route).unwrap()), ["b", "a"]);

        let mut dated = route.clone();
        dated.year = Some("2024".into());
        assert_eq!(names(&selector.select(&dated).unwrap()), ["b", "a"]);
        dated.year = Some("2023".into());
        assert_eq!(names(&selector.select(&dated).unwrap()), ["c"]);

        let blog = RoutingDecision::listing(site.path("blog"), "blog", "html");
        let entries = selector.select(&blog).unwrap();
        assert_eq!(names(&entries), ["b", "c"]);
        assert!(entries.iter().all(|e| e.category == "blog"));
    }
}
