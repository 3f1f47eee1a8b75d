//! Static site rendering.
//!
//! Renders every addressable page of the blog into `static.dir`, through
//! the same [`Blog::handle`] pipeline a live request uses. A build is two
//! steps:
//!
//! 1. **Plan** ([`plan`]): walk the content tree once, snapshot every mtime,
//!    decide which sources changed and list the [`RenderTarget`]s. Nothing is
//!    rendered here.
//! 2. **Render** ([`build`]): render the targets in parallel and write each
//!    response body to `static.dir` + target path.
//!
//! ## What gets rendered
//!
//! For every changed source, in this order, each in every configured flavour:
//!
//! ```text
//! entries      /blog/rust/hello.html
//! categories   /index.html  /blog/index.html  /blog/rust/index.html
//! dates        /2024/index.html  /2024/Mar/index.html  /2024/Mar/07/index.html
//! ```
//!
//! followed by the `static.urls` (verbatim, not multiplied by flavour) and
//! whatever the `staticrender_filelist` chain appends.
//!
//! ## Incremental builds
//!
//! A source is changed when its filesystem mtime is strictly newer than its
//! entry page in the first flavour, or when that page doesn't exist. Date
//! indexes follow the entry's listed time instead, which a `#date` line
//! overrides. A full build treats
//! every source as changed.
//!
//! ## Parallel Processing
//!
//! Targets render in parallel using [rayon](https://docs.rs/rayon). A target
//! that fails is reported through the event channel and the build moves on.
//! The entry cache is shared by all workers and flushed once, after the last
//! target.

use crate::cache::{CacheError, CacheStats};
use crate::callback::CallbackError;
use crate::config::SiteConfig;
use crate::dates;
use crate::pipeline::{Blog, PipelineError};
use crate::plugin::StaticRenderList;
use crate::request::HttpRequest;
use crate::select::{self, category_of};
use crate::types::RenderTarget;
use chrono::{DateTime, Local};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Callback(#[from] CallbackError),
    #[error("{0}")]
    Pipeline(#[from] PipelineError),
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Progress reported while building. Sent from worker threads, so
/// `Rendered` and `Failed` arrive in no particular order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    Planned {
        scanned: usize,
        changed: usize,
        targets: usize,
    },
    Rendered {
        path: String,
        output: PathBuf,
        status: u16,
    },
    Failed {
        path: String,
        error: String,
    },
}

/// One content file as seen at planning time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Path relative to the content root, extension dropped: `blog/hello`.
    pub stem: String,
    pub category: String,
    /// The time the entry is listed under (`#date`, else the mtime after
    /// the `filestat` chain). Drives the date indexes. Only looked up for
    /// changed sources.
    pub mtime: Option<DateTime<Local>>,
    pub changed: bool,
}

/// What a build will render.
#[derive(Debug, Clone, Default)]
pub struct StaticPlan {
    pub sources: Vec<SourceFile>,
    pub targets: Vec<RenderTarget>,
}

impl StaticPlan {
    pub fn changed(&self) -> impl Iterator<Item = &SourceFile> {
        self.sources.iter().filter(|s| s.changed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildResult {
    pub rendered: usize,
    pub failed: usize,
    pub cache_stats: CacheStats,
}

/// The configured output directory, or a config error when unset.
pub fn static_dir(config: &SiteConfig) -> Result<&Path, BuildError> {
    let dir = config.static_site.dir.as_path();
    if dir.as_os_str().is_empty() {
        return Err(BuildError::Config(
            "static.dir is not set; add `dir = \"...\"` under [static] in config.toml".into(),
        ));
    }
    Ok(dir)
}

/// Enumerate sources and render targets without rendering anything.
pub fn plan(blog: &Blog, incremental: bool) -> Result<StaticPlan, BuildError> {
    let config = blog.config();
    let out_dir = static_dir(config)?;
    let flavours = &config.static_site.flavours;
    let first_flavour = flavours
        .first()
        .ok_or_else(|| BuildError::Config("static.flavours must not be empty".into()))?;

    let selector = blog.selector();
    let files = select::walk(&config.datadir, 0, &config.ignore_directories, |ext| {
        blog.extension_names().iter().any(|e| e == ext)
    });

    let mut sources = Vec::with_capacity(files.len());
    for path in files {
        let stem = source_stem(&config.datadir, &path);
        let changed = !incremental
            || is_stale(&path, &output_file(out_dir, &format!("/{stem}.{first_flavour}")));
        let mtime = if changed {
            selector.entry_time(&path)?
        } else {
            None
        };
        sources.push(SourceFile {
            mtime,
            category: category_of(&config.datadir, &path),
            stem,
            path,
            changed,
        });
    }

    let mut targets = Vec::new();
    let changed: Vec<&SourceFile> = sources.iter().filter(|s| s.changed).collect();

    for source in &changed {
        for flavour in flavours {
            targets.push(RenderTarget::new(format!("/{}.{}", source.stem, flavour)));
        }
    }

    let categories: BTreeSet<String> = changed
        .iter()
        .flat_map(|s| category_chain(&s.category))
        .collect();
    for category in &categories {
        for flavour in flavours {
            targets.push(RenderTarget::new(index_path(category, flavour)));
        }
    }

    let date_paths: BTreeSet<String> = changed
        .iter()
        .filter_map(|s| s.mtime.as_ref())
        .flat_map(|t| {
            date_chain(
                t,
                config.static_site.monthnames,
                config.static_site.monthnumbers,
            )
        })
        .collect();
    for date in &date_paths {
        for flavour in flavours {
            targets.push(RenderTarget::new(index_path(date, flavour)));
        }
    }

    targets.extend(config.static_site.urls.iter().map(|u| RenderTarget::from_url(u)));

    let mut list = StaticRenderList {
        config: Arc::clone(config),
        incremental,
        targets,
    };
    blog.callbacks().staticrender_filelist.run_all(&mut list)?;

    debug!(
        sources = sources.len(),
        changed = changed.len(),
        targets = list.targets.len(),
        "static build planned"
    );

    Ok(StaticPlan {
        sources,
        targets: list.targets,
    })
}

/// Plan, then render every target into `static.dir`.
pub fn build(
    blog: &Blog,
    incremental: bool,
    events: Option<Sender<BuildEvent>>,
) -> Result<BuildResult, BuildError> {
    let plan = plan(blog, incremental)?;
    let out_dir = static_dir(blog.config())?;

    if let Some(tx) = &events {
        tx.send(BuildEvent::Planned {
            scanned: plan.sources.len(),
            changed: plan.changed().count(),
            targets: plan.targets.len(),
        })
        .ok();
    }

    let outcomes: Vec<bool> = plan
        .targets
        .par_iter()
        .map_with(events, |tx, target| {
            let event = match render_target(blog, out_dir, target) {
                Ok((output, status)) => BuildEvent::Rendered {
                    path: target.output_path.clone(),
                    output,
                    status,
                },
                Err(e) => {
                    warn!(path = %target.output_path, error = %e, "static render failed");
                    BuildEvent::Failed {
                        path: target.output_path.clone(),
                        error: e.to_string(),
                    }
                }
            };
            let ok = matches!(event, BuildEvent::Rendered { .. });
            if let Some(tx) = tx {
                tx.send(event).ok();
            }
            ok
        })
        .collect();

    blog.cache().close()?;

    let rendered = outcomes.iter().filter(|ok| **ok).count();
    Ok(BuildResult {
        rendered,
        failed: outcomes.len() - rendered,
        cache_stats: blog.cache().stats(),
    })
}

/// Render one target and write it out. Returns the file written and the
/// response status.
pub fn render_target(
    blog: &Blog,
    out_dir: &Path,
    target: &RenderTarget,
) -> Result<(PathBuf, u16), BuildError> {
    let response = blog.handle_deferred(HttpRequest::new(
        target.output_path.as_str(),
        target.query_string.as_str(),
    ))?;
    let output = output_file(out_dir, &target.output_path);
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&output, response.body.as_bytes())?;
    Ok((output, response.status_code()))
}

/// `out_dir` joined with a URL path, ignoring empty, `.` and `..` segments.
pub fn output_file(out_dir: &Path, url_path: &str) -> PathBuf {
    url_path
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .fold(out_dir.to_path_buf(), |p, s| p.join(s))
}

fn source_stem(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path).with_extension("");
    rel.to_string_lossy().replace('\\', "/")
}

/// True when `output` is missing or older than `source`.
fn is_stale(source: &Path, output: &Path) -> bool {
    let modified = |p: &Path| fs::metadata(p).and_then(|m| m.modified()).ok();
    match (modified(source), modified(output)) {
        (Some(src), Some(out)) => src > out,
        (None, Some(_)) => false,
        (_, None) => true,
    }
}

/// `""`, `a`, `a/b` for category `a/b`.
fn category_chain(category: &str) -> Vec<String> {
    let mut chain = vec![String::new()];
    let mut acc = String::new();
    for part in category.split('/').filter(|p| !p.is_empty()) {
        if !acc.is_empty() {
            acc.push('/');
        }
        acc.push_str(part);
        chain.push(acc.clone());
    }
    chain
}

/// Date index paths for one timestamp.
fn date_chain(t: &DateTime<Local>, monthnames: bool, monthnumbers: bool) -> Vec<String> {
    let year = t.format("%Y").to_string();
    let month = t.format("%m").to_string();
    let day = t.format("%d").to_string();
    let mut chain = vec![year.clone()];
    if monthnumbers {
        chain.push(format!("{year}/{month}"));
        chain.push(format!("{year}/{month}/{day}"));
    }
    if monthnames && let Some(name) = dates::month_name(&month) {
        chain.push(format!("{year}/{name}"));
        chain.push(format!("{year}/{name}/{day}"));
    }
    chain
}

fn index_path(dir: &str, flavour: &str) -> String {
    if dir.is_empty() {
        format!("/index.{flavour}")
    } else {
        format!("/{dir}/index.{flavour}")
    }
}
