//! Plugins and the callback table they hook into.
//!
//! A [`Plugin`] is a Rust value handed to [`BlogBuilder::plugin`]. When the
//! blog is built, each plugin's [`register`](Plugin::register) runs once, in
//! the order the plugins were added, and adds handlers to [`Callbacks`].
//!
//! [`BlogBuilder::plugin`]: crate::pipeline::BlogBuilder::plugin

use crate::callback::Callback;
use crate::config::SiteConfig;
use crate::parser::{Extensions, ParsedEntry};
use crate::render::Renderer;
use crate::request::Request;
use crate::types::{EntryRecord, RenderTarget, RoutingDecision};
use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::sync::Arc;

/// An extension to the engine.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Add this plugin's handlers.
    fn register(&self, callbacks: &mut Callbacks);

    /// Report configuration problems for `plainblog check`.
    fn verify_installation(&self, _config: &SiteConfig) -> Result<(), String> {
        Ok(())
    }
}

// ============================================================================
// Callback contexts
// ============================================================================

/// Context of the `filestat` chain: handlers may replace `mtime`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub path: PathBuf,
    pub mtime: Option<DateTime<Local>>,
}

/// Context of the `preformat` chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preformat {
    pub path: PathBuf,
    /// Requested formatter: the entry's `parser` metadata or the config default.
    pub parser: String,
    pub text: String,
}

/// Context of the `logrequest` chain, fired once the status is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRequest {
    pub path_info: String,
    pub query: String,
    pub status: u16,
}

/// Context of the `staticrender_filelist` chain.
#[derive(Debug, Clone)]
pub struct StaticRenderList {
    pub config: Arc<SiteConfig>,
    pub incremental: bool,
    /// Targets planned so far. Handlers append to it.
    pub targets: Vec<RenderTarget>,
}

// ============================================================================
// Callback table
// ============================================================================

/// Every extension point, one chain each.
#[derive(Debug)]
pub struct Callbacks {
    pub start: Callback<Request, ()>,
    /// Return `true` to take over the request entirely.
    pub handle: Callback<Request, bool>,
    pub renderer: Callback<Request, Box<dyn Renderer>>,
    pub pathinfo: Callback<Request, RoutingDecision>,
    pub filelist: Callback<Request, Vec<EntryRecord>>,
    pub filestat: Callback<FileStat, ()>,
    pub preformat: Callback<Preformat, String>,
    pub postformat: Callback<ParsedEntry, ()>,
    pub prepare: Callback<Request, ()>,
    pub logrequest: Callback<LogRequest, ()>,
    pub end: Callback<Request, ()>,
    /// Returned maps are merged into the registered parsers.
    pub entryparser: Callback<Extensions, Extensions>,
    pub staticrender_filelist: Callback<StaticRenderList, ()>,
}

impl Default for Callbacks {
    fn default() -> Self {
        Self {
            start: Callback::new("start"),
            handle: Callback::new("handle"),
            renderer: Callback::new("renderer"),
            pathinfo: Callback::new("pathinfo"),
            filelist: Callback::new("filelist"),
            filestat: Callback::new("filestat"),
            preformat: Callback::new("preformat"),
            postformat: Callback::new("postformat"),
            prepare: Callback::new("prepare"),
            logrequest: Callback::new("logrequest"),
            end: Callback::new("end"),
            entryparser: Callback::new("entryparser"),
            staticrender_filelist: Callback::new("staticrender_filelist"),
        }
    }
}

impl Callbacks {
    /// `(name, handler count)` for every chain, in pipeline order.
    pub fn summary(&self) -> Vec<(&'static str, usize)> {
        vec![
            (self.start.name(), self.start.len()),
            (self.handle.name(), self.handle.len()),
            (self.renderer.name(), self.renderer.len()),
            (self.pathinfo.name(), self.pathinfo.len()),
            (self.filelist.name(), self.filelist.len()),
            (self.filestat.name(), self.filestat.len()),
            (self.preformat.name(), self.preformat.len()),
            (self.postformat.name(), self.postformat.len()),
            (self.prepare.name(), self.prepare.len()),
            (self.logrequest.name(), self.logrequest.len()),
            (self.end.name(), self.end.len()),
            (self.entryparser.name(), self.entryparser.len()),
            (
                self.staticrender_filelist.name(),
                self.staticrender_filelist.len(),
            ),
        ]
    }
}
