//! The request pipeline.
//!
//! One call to [`Blog::handle`] takes a path and query string through every
//! stage and returns the finished [`Response`]:
//!
//! ```text
//! start ─▶ handle? ──claimed──────────────────────────────────────┐
//!            │ not claimed                                        │
//!            ▼                                                    │
//!         renderer ─▶ pathinfo ─▶ filelist ─▶ prepare ─▶ render ──┤
//!         (factory)   (resolve)   (select)               + logrequest
//!                                                                 ▼
//!                                                       end ─▶ cache.close
//! ```
//!
//! Each stage is a callback chain with a built-in default, so plugins can
//! replace any of them. `end` and the cache flush run even when an earlier
//! stage failed; the first error is then returned.
//!
//! A request that selects no entries is not an error: it renders a
//! `404 Not Found` page naming the blog.

use crate::cache::{self, CacheError, EntryCache};
use crate::callback::CallbackError;
use crate::config::SiteConfig;
use crate::dates::LatestDates;
use crate::parser::{self, EntryParser, Extensions};
use crate::plugin::{Callbacks, LogRequest, Plugin};
use crate::render::{self, BlogRendererFactory, Content, RenderError, RendererFactory};
use crate::request::{HttpRequest, Request, Response, ResponseError};
use crate::resolve;
use crate::select::Selector;
use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Callback(#[from] CallbackError),
    #[error("Render error: {0}")]
    Render(#[from] RenderError),
    #[error("Response error: {0}")]
    Response(#[from] ResponseError),
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Assembles a [`Blog`] from config, plugins and capabilities.
pub struct BlogBuilder {
    config: SiteConfig,
    plugins: Vec<Box<dyn Plugin>>,
    parsers: Extensions,
    cache: Option<Box<dyn EntryCache>>,
    renderer_factory: Box<dyn RendererFactory>,
}

impl BlogBuilder {
    pub fn new(config: SiteConfig) -> Self {
        Self {
            config,
            plugins: Vec::new(),
            parsers: parser::default_extensions(),
            cache: None,
            renderer_factory: Box::new(BlogRendererFactory),
        }
    }

    /// Add a plugin. Plugins register in the order they are added.
    pub fn plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    /// Register a parser for files ending in `.<extension>`.
    pub fn parser(mut self, extension: &str, parser: impl EntryParser + 'static) -> Self {
        self.parsers.insert(extension.to_string(), Arc::new(parser));
        self
    }

    /// Use this cache instead of the one `[cache]` describes.
    pub fn cache(mut self, cache: impl EntryCache + 'static) -> Self {
        self.cache = Some(Box::new(cache));
        self
    }

    pub fn renderer_factory(mut self, factory: impl RendererFactory + 'static) -> Self {
        self.renderer_factory = Box::new(factory);
        self
    }

    /// Register every plugin, then settle the parser table through the
    /// `entryparser` chain.
    pub fn build(self) -> Result<Blog, PipelineError> {
        let mut callbacks = Callbacks::default();
        for plugin in &self.plugins {
            debug!(plugin = plugin.name(), "registering plugin");
            plugin.register(&mut callbacks);
        }

        let mut base = self.parsers;
        let extensions = callbacks.entryparser.run_collect(
            &mut base,
            |base| Ok(base.clone()),
            |mut acc, more| {
                acc.extend(more);
                acc
            },
        )?;
        let extension_names = extensions.keys().cloned().collect();

        let cache = self
            .cache
            .unwrap_or_else(|| cache::open(&self.config.cache, &self.config.parser));

        Ok(Blog {
            config: Arc::new(self.config),
            callbacks,
            extensions,
            extension_names,
            cache,
            renderer_factory: self.renderer_factory,
            plugins: self.plugins,
        })
    }
}

/// Result of [`Blog::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub datadir: PathBuf,
    pub datadir_exists: bool,
    /// Optional keys left empty; pages render with blanks where they go.
    pub missing_optional: Vec<&'static str>,
    pub extensions: Vec<String>,
    pub chains: Vec<(&'static str, usize)>,
    pub plugins: Vec<(String, Result<(), String>)>,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.datadir_exists && self.plugins.iter().all(|(_, r)| r.is_ok())
    }
}

/// A configured blog, ready to answer requests. Shared by reference
/// between static build workers.
pub struct Blog {
    config: Arc<SiteConfig>,
    callbacks: Callbacks,
    extensions: Extensions,
    extension_names: Vec<String>,
    cache: Box<dyn EntryCache>,
    renderer_factory: Box<dyn RendererFactory>,
    plugins: Vec<Box<dyn Plugin>>,
}

impl Blog {
    pub fn config(&self) -> &Arc<SiteConfig> {
        &self.config
    }

    pub fn callbacks(&self) -> &Callbacks {
        &self.callbacks
    }

    /// Registered content file extensions, sorted.
    pub fn extension_names(&self) -> &[String] {
        &self.extension_names
    }

    pub fn cache(&self) -> &dyn EntryCache {
        &*self.cache
    }

    pub fn plugins(&self) -> impl Iterator<Item = &dyn Plugin> {
        self.plugins.iter().map(|p| &**p)
    }

    /// The entry loader for this blog.
    pub fn selector(&self) -> Selector<'_> {
        Selector {
            config: &self.config,
            extensions: &self.extensions,
            callbacks: &self.callbacks,
            cache: &*self.cache,
        }
    }

    /// Installation diagnostics for `plainblog check`.
    pub fn check(&self) -> CheckReport {
        let config = &self.config;
        let optional = [
            ("blog_title", config.blog_title.is_empty()),
            ("blog_description", config.blog_description.is_empty()),
            ("blog_author", config.blog_author.is_empty()),
            ("base_url", config.base_url.is_empty()),
        ];
        CheckReport {
            datadir: config.datadir.clone(),
            datadir_exists: config.datadir.is_dir(),
            missing_optional: optional
                .iter()
                .filter(|(_, missing)| *missing)
                .map(|(key, _)| *key)
                .collect(),
            extensions: self.extension_names.clone(),
            chains: self.callbacks.summary(),
            plugins: self
                .plugins()
                .map(|p| (p.name().to_string(), p.verify_installation(config)))
                .collect(),
        }
    }

    /// Answer one request, flushing the cache afterwards.
    pub fn handle(&self, http: HttpRequest) -> Result<Response, PipelineError> {
        self.respond(http, true)
    }

    /// Answer one request and leave the cache unflushed. For callers that
    /// serve many requests and close the cache once at the end, like the
    /// static build.
    pub fn handle_deferred(&self, http: HttpRequest) -> Result<Response, PipelineError> {
        self.respond(http, false)
    }

    fn respond(&self, http: HttpRequest, flush: bool) -> Result<Response, PipelineError> {
        let mut req = Request::new(Arc::clone(&self.config), http);

        let result = self.dispatch(&mut req);
        let end = self.callbacks.end.run_all(&mut req);
        let closed = if flush { self.cache.close() } else { Ok(()) };
        result?;
        end?;
        closed?;

        info!(
            path = %req.http.path_info,
            status = req.response.status_code(),
            "request"
        );
        Ok(req.response)
    }

    fn dispatch(&self, req: &mut Request) -> Result<(), PipelineError> {
        self.callbacks.start.run_all(req)?;
        let claimed = self
            .callbacks
            .handle
            .run_until(req, |claimed| *claimed, |_| Ok(false))?;
        if claimed {
            debug!(path = %req.http.path_info, "request claimed by a handle callback");
            return Ok(());
        }
        self.default_handler(req)
    }

    fn default_handler(&self, req: &mut Request) -> Result<(), PipelineError> {
        let renderer = self
            .callbacks
            .renderer
            .run_first(req, |r| Ok(self.renderer_factory.create(&r.config)))?;
        req.renderer = Some(renderer);

        req.data.flavour = req
            .http
            .param("flav")
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| default_flavour(&req.config).to_string());

        let route = self.callbacks.pathinfo.run_until(
            req,
            |_| true,
            |r| {
                Ok(resolve::resolve(
                    &r.http.path_info,
                    &r.data.flavour,
                    &r.config.datadir,
                    &self.extension_names,
                ))
            },
        )?;
        req.data.flavour = route.flavour.clone();
        req.data.blog_title_with_path = title_with_path(&req.config, &route.category_path);
        req.data.url = category_url(&req.config, &route.category_path);
        req.data.route = Some(route);

        let entries = self.callbacks.filelist.run_until(
            req,
            |_| true,
            |r| match &r.data.route {
                Some(route) => self.selector().select(route),
                None => Ok(Vec::new()),
            },
        )?;

        let latest = entries
            .first()
            .and_then(|e| e.modified_time)
            .unwrap_or_else(Local::now);
        req.data.latest = Some(LatestDates::from_time(&latest));
        req.data.entries = entries;

        self.callbacks.prepare.run_all(req)?;

        self.render(req)
    }

    fn render(&self, req: &mut Request) -> Result<(), PipelineError> {
        let mut renderer = match req.renderer.take() {
            Some(r) => r,
            None => self.renderer_factory.create(&req.config),
        };

        if !renderer.rendered() {
            let status = if req.data.entries.is_empty() {
                renderer.add_header("Status", "404 Not Found")?;
                renderer.set_content(render::not_found(&req.config));
                req.response.set_status("404 Not Found");
                404
            } else {
                renderer.set_content(Content::Entries(req.data.entries.clone()));
                200
            };

            self.callbacks.logrequest.run_all(&mut LogRequest {
                path_info: req.http.path_info.clone(),
                query: req.http.query.clone(),
                status,
            })?;

            renderer.render(&req.config, &req.data, &mut req.response)?;
        }

        req.renderer = Some(renderer);
        Ok(())
    }
}

fn default_flavour(config: &SiteConfig) -> &str {
    if config.default_flavour.is_empty() {
        "html"
    } else {
        &config.default_flavour
    }
}

fn title_with_path(config: &SiteConfig, category: &str) -> String {
    if category.is_empty() {
        config.blog_title.clone()
    } else {
        format!("{} : {}", config.blog_title, category)
    }
}

fn category_url(config: &SiteConfig, category: &str) -> String {
    if category.is_empty() {
        config.base_url.clone()
    } else {
        format!("{}/{}", config.base_url, category)
    }
}
