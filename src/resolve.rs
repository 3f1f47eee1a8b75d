//! URL path resolution.
//!
//! Turns the path part of a request (`/blog/2024/Mar/07`, `/blog/hello.html`,
//! `/index.rss`) into a [`RoutingDecision`]. Resolution never fails: a path
//! that matches nothing becomes a listing of a directory that doesn't exist,
//! which selects zero entries and ends up as a 404 page.
//!
//! The steps, in order:
//!
//! 1. `.../index.<ext>` names its flavour directly; the suffix is dropped.
//! 2. An existing directory (or `<dir>/index`) is a category listing.
//! 3. A path that names a content file, with or without a trailing flavour
//!    (`hello` or `hello.html` for `hello.txt`), is a single entry.
//! 4. Anything else is read as `category/YYYY/MM/DD`. Category segments are
//!    peeled off until a four-digit segment appears, then year, month and
//!    day are matched greedily. If anything is left over the whole path is
//!    treated as a plain category instead.
//!
//! The four-digit rule means a category directory can't be named like a
//! year unless it exists on disk (step 2 wins).

use crate::dates;
use crate::types::RoutingDecision;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Resolve `path_info` against the content tree at `root`.
///
/// `flavour` is the flavour to use when the path doesn't name one (already
/// resolved from the `flav` query parameter or the configured default).
/// `extensions` are the registered content file extensions, tried in order.
pub fn resolve(
    path_info: &str,
    flavour: &str,
    root: &Path,
    extensions: &[String],
) -> RoutingDecision {
    let mut flavour = flavour.to_string();
    let mut path = path_info.trim_start_matches('/').to_string();

    if let Some((stem, ext)) = split_extension(&path)
        && (stem == "index" || stem.ends_with("/index"))
    {
        flavour = ext.to_string();
        path = stem.to_string();
    }

    let segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect();
    let relative = segments.join("/");
    let absolute = join_segments(root, &segments);

    if absolute.is_dir() {
        trace!(path = path_info, "resolved to directory listing");
        return RoutingDecision::listing(absolute, &relative, &flavour);
    }

    if let Some((last, parent)) = segments.split_last()
        && *last == "index"
    {
        let dir = join_segments(root, parent);
        if dir.is_dir() {
            trace!(path = path_info, "resolved to directory index");
            return RoutingDecision::listing(dir, &parent.join("/"), &flavour);
        }
    }

    if let Some(decision) = resolve_entry(root, &relative, &flavour, extensions) {
        trace!(path = path_info, file = %decision.explicit_file.as_deref().unwrap_or(root).display(), "resolved to entry");
        return decision;
    }

    resolve_dated(root, &segments, &absolute, &relative, &flavour)
}

/// Step 3: `relative` (optionally with a trailing flavour) names a file.
fn resolve_entry(
    root: &Path,
    relative: &str,
    flavour: &str,
    extensions: &[String],
) -> Option<RoutingDecision> {
    if relative.is_empty() {
        return None;
    }
    if let Some(file) = find_source(root, relative, extensions) {
        return Some(RoutingDecision::entry(file, parent_category(relative), flavour));
    }
    let (stem, explicit_flavour) = split_extension(relative)?;
    let file = find_source(root, stem, extensions)?;
    Some(RoutingDecision::entry(
        file,
        parent_category(stem),
        explicit_flavour,
    ))
}

/// Step 4: `category/YYYY[/MM[/DD]][/index]`.
fn resolve_dated(
    root: &Path,
    segments: &[&str],
    absolute: &Path,
    relative: &str,
    flavour: &str,
) -> RoutingDecision {
    let mut rest: VecDeque<&str> = segments.iter().copied().collect();
    let mut category = Vec::new();
    while let Some(segment) = rest.front()
        && !is_year(segment)
    {
        category.push(*segment);
        rest.pop_front();
    }

    let mut route = RoutingDecision::listing(
        join_segments(root, &category),
        &category.join("/"),
        flavour,
    );

    let mut leftover = None;
    if let Some(year) = rest.pop_front() {
        route.year = Some(year.to_string());
        if let Some(item) = rest.pop_front() {
            match dates::month_number(item) {
                Some(month) => {
                    route.month = Some(month);
                    if let Some(item) = rest.pop_front() {
                        if is_day(item) {
                            route.day = Some(item.to_string());
                            leftover = rest.pop_front();
                        } else {
                            leftover = Some(item);
                        }
                    }
                }
                None => leftover = Some(item),
            }
        }
    }

    if leftover == Some("index") {
        leftover = None;
    }

    if leftover.is_some() || !rest.is_empty() {
        trace!(path = relative, "unrecognized date fragment, treating as category");
        return RoutingDecision::listing(absolute.to_path_buf(), relative, flavour);
    }

    trace!(
        category = %route.category_path,
        year = ?route.year,
        month = ?route.month,
        day = ?route.day,
        "resolved to listing"
    );
    route
}

/// First registered extension `ext` for which `root/relative.ext` is a file.
fn find_source(root: &Path, relative: &str, extensions: &[String]) -> Option<PathBuf> {
    let segments: Vec<&str> = relative.split('/').collect();
    let base = join_segments(root, &segments);
    extensions.iter().find_map(|ext| {
        let mut candidate: OsString = base.clone().into_os_string();
        candidate.push(".");
        candidate.push(ext);
        let candidate = PathBuf::from(candidate);
        candidate.is_file().then_some(candidate)
    })
}

/// Split `a/b/name.ext` into `("a/b/name", "ext")`. Dotfiles and names
/// without an extension yield `None`.
fn split_extension(path: &str) -> Option<(&str, &str)> {
    let name_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    let dot = path[name_start..].rfind('.')?;
    if dot == 0 {
        return None;
    }
    let dot = name_start + dot;
    let ext = &path[dot + 1..];
    (!ext.is_empty()).then(|| (&path[..dot], ext))
}

fn parent_category(relative: &str) -> &str {
    relative.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

fn join_segments(root: &Path, segments: &[&str]) -> PathBuf {
    segments.iter().fold(root.to_path_buf(), |p, s| p.join(s))
}

fn is_year(segment: &str) -> bool {
    segment.len() == 4 && segment.bytes().all(|b| b.is_ascii_digit())
}

fn is_day(segment: &str) -> bool {
    segment.len() == 2 && segment.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RouteKind;
    use std::fs;
    use tempfile::TempDir;

    fn exts() -> Vec<String> {
        vec!["txt".to_string()]
    }

    fn tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("blog/rust")).unwrap();
        fs::write(tmp.path().join("blog/hello.txt"), "Hello\n").unwrap();
        fs::write(tmp.path().join("about.txt"), "About\n").unwrap();
        tmp
    }

    // =========================================================================
    // Directories
    // =========================================================================

    #[test]
    fn root_is_listing() {
        let tmp = tree();
        for path in ["", "/"] {
            let r = resolve(path, "html", tmp.path(), &exts());
            assert_eq!(r.kind, RouteKind::Listing);
            assert_eq!(r.base_dir, tmp.path());
            assert_eq!(r.category_path, "");
        }
    }

    #[test]
    fn directory_is_listing_with_category() {
        let tmp = tree();
        let r = resolve("/blog/rust", "html", tmp.path(), &exts());
        assert_eq!(r.kind, RouteKind::Listing);
        assert_eq!(r.base_dir, tmp.path().join("blog/rust"));
        assert_eq!(r.category_path, "blog/rust");
        assert!(!r.has_date_filter());
    }

    #[test]
    fn directory_resolution_is_idempotent() {
        let tmp = tree();
        let a = resolve("/blog/", "html", tmp.path(), &exts());
        let b = resolve("/blog/", "html", tmp.path(), &exts());
        assert_eq!(a, b);
        assert_eq!(a.base_dir, tmp.path().join("blog"));
    }

    #[test]
    fn index_with_flavour_sets_flavour() {
        let tmp = tree();
        let r = resolve("/blog/index.rss", "html", tmp.path(), &exts());
        assert_eq!(r.kind, RouteKind::Listing);
        assert_eq!(r.flavour, "rss");
        assert_eq!(r.category_path, "blog");

        let root = resolve("/index.atom", "html", tmp.path(), &exts());
        assert_eq!(root.flavour, "atom");
        assert_eq!(root.base_dir, tmp.path());
    }

    #[test]
    fn bare_index_suffix_is_category() {
        let tmp = tree();
        let r = resolve("/blog/index", "html", tmp.path(), &exts());
        assert_eq!(r.kind, RouteKind::Listing);
        assert_eq!(r.base_dir, tmp.path().join("blog"));
        assert_eq!(r.category_path, "blog");
    }

    // =========================================================================
    // Entries
    // =========================================================================

    #[test]
    fn file_with_flavour_is_entry() {
        let tmp = tree();
        let r = resolve("/blog/hello.html", "rss", tmp.path(), &exts());
        assert_eq!(r.kind, RouteKind::Entry);
        assert_eq!(r.explicit_file, Some(tmp.path().join("blog/hello.txt")));
        assert_eq!(r.flavour, "html");
        assert_eq!(r.category_path, "blog");
    }

    #[test]
    fn file_without_flavour_keeps_default() {
        let tmp = tree();
        let r = resolve("/about", "rss", tmp.path(), &exts());
        assert_eq!(r.kind, RouteKind::Entry);
        assert_eq!(r.flavour, "rss");
        assert_eq!(r.category_path, "");
    }

    #[test]
    fn unknown_extension_is_not_entry() {
        let tmp = tree();
        fs::write(tmp.path().join("notes.md"), "x").unwrap();
        let r = resolve("/notes.html", "html", tmp.path(), &exts());
        assert_eq!(r.kind, RouteKind::Listing);
    }

    // =========================================================================
    // Dates
    // =========================================================================

    #[test]
    fn named_month_normalizes_to_number() {
        let tmp = tree();
        let r = resolve("/2024/Mar/07", "html", tmp.path(), &exts());
        assert_eq!(r.kind, RouteKind::Listing);
        assert_eq!(r.year.as_deref(), Some("2024"));
        assert_eq!(r.month.as_deref(), Some("03"));
        assert_eq!(r.day.as_deref(), Some("07"));
        assert_eq!(r.category_path, "");
        assert_eq!(r.base_dir, tmp.path());
    }

    #[test]
    fn date_resolution_ignores_disk_state() {
        let tmp = TempDir::new().unwrap();
        let r = resolve("/2024/Mar/07", "html", tmp.path(), &exts());
        assert_eq!(r.date_prefix().as_deref(), Some("20240307"));
    }

    #[test]
    fn category_then_date() {
        let tmp = tree();
        let r = resolve("/blog/2023/11", "html", tmp.path(), &exts());
        assert_eq!(r.category_path, "blog");
        assert_eq!(r.base_dir, tmp.path().join("blog"));
        assert_eq!(r.year.as_deref(), Some("2023"));
        assert_eq!(r.month.as_deref(), Some("11"));
        assert_eq!(r.day, None);
    }

    #[test]
    fn date_index_with_flavour() {
        let tmp = tree();
        let r = resolve("/2024/03/index.rss", "html", tmp.path(), &exts());
        assert_eq!(r.flavour, "rss");
        assert_eq!(r.date_prefix().as_deref(), Some("202403"));
    }

    #[test]
    fn trailing_index_after_year_is_dropped() {
        let tmp = tree();
        let r = resolve("/2024/index", "html", tmp.path(), &exts());
        assert_eq!(r.year.as_deref(), Some("2024"));
        assert_eq!(r.month, None);
    }

    #[test]
    fn leftover_fragment_reverts_to_category() {
        let tmp = tree();
        let r = resolve("/2024/Foo", "html", tmp.path(), &exts());
        assert_eq!(r.kind, RouteKind::Listing);
        assert!(!r.has_date_filter());
        assert_eq!(r.category_path, "2024/Foo");
        assert_eq!(r.base_dir, tmp.path().join("2024/Foo"));

        let r = resolve("/2024/03/07/extra", "html", tmp.path(), &exts());
        assert!(!r.has_date_filter());
        assert_eq!(r.category_path, "2024/03/07/extra");
    }

    #[test]
    fn missing_category_is_empty_listing() {
        let tmp = tree();
        let r = resolve("/nope/nothing", "html", tmp.path(), &exts());
        assert_eq!(r.kind, RouteKind::Listing);
        assert_eq!(r.base_dir, tmp.path().join("nope/nothing"));
        assert!(!r.base_dir.exists());
    }

    #[test]
    fn parent_segments_are_dropped() {
        let tmp = tree();
        let r = resolve("/../blog/./..", "html", tmp.path(), &exts());
        assert_eq!(r.base_dir, tmp.path().join("blog"));
    }

    #[test]
    fn split_extension_cases() {
        assert_eq!(split_extension("a/b.html"), Some(("a/b", "html")));
        assert_eq!(split_extension("a.b/c"), None);
        assert_eq!(split_extension(".hidden"), None);
        assert_eq!(split_extension("x."), None);
    }
}
