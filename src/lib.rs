//! # Plainblog
//!
//! A file-based weblog engine. Entries are plain text files in a directory
//! tree; directories are categories and file mtimes are publication dates.
//! The same request pipeline answers live requests and renders the whole
//! blog to static files.
//!
//! # Architecture: One Pipeline, Two Front Ends
//!
//! ```text
//! path + query ─▶ resolve ─▶ select ─▶ render ─▶ Response
//!                 (routing)  (entries)  (flavour)
//!
//! plainblog render /blog/2024/Mar?flav=rss     one request to stdout
//! plainblog build [--incremental]              every page into static.dir
//! ```
//!
//! Every stage is a named callback chain with a built-in default. Plugins
//! register handlers on those chains to take over routing, entry lists,
//! formatting, rendering, or the whole request.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | `config.toml` loading, stock defaults, validation |
//! | [`callback`] | Named handler chains and their four dispatch policies |
//! | [`plugin`] | The `Plugin` trait and the closed set of chains plugins see |
//! | [`resolve`] | Request path → `RoutingDecision` (entry, category, or date listing) |
//! | [`parser`] | Entry file formats; the built-in blosxom `.txt` parser |
//! | [`select`] | Walks the content tree and loads, sorts, filters, and caps entries |
//! | [`cache`] | Parsed-entry caches: none, in-memory, on-disk JSON |
//! | [`request`] | Request, per-request data, and the `Response` |
//! | [`render`] | The `Renderer` trait and the built-in maud renderer |
//! | [`pipeline`] | `Blog`: assembles the above and answers requests |
//! | [`static_build`] | Plans and renders the static site, incrementally if asked |
//! | [`dates`] | Month names and the date strings entries and feeds carry |
//! | [`types`] | Shared data types: routing decisions, entries, render targets |
//! | [`output`] | CLI output formatting |
//! | [`logging`] | Tracing subscriber setup for the binary |
//!
//! # Design Decisions
//!
//! ## Filesystem as Database
//!
//! There is no index to rebuild. A listing is a directory walk, a category
//! is a directory, and an entry's date is its mtime unless it names one with
//! `#date`. Moving a file re-files the entry.
//!
//! ## Static Rendering Reuses the Live Path
//!
//! A static build is a list of request paths fed through [`pipeline::Blog::handle`]
//! in parallel. Anything a plugin does to a live request it also does to
//! the static site, and there is no second renderer to keep in sync.
//!
//! ## Maud Over Template Engines
//!
//! Pages are built with [Maud](https://maud.lambda.xyz/). Interpolation is
//! escaped by default and malformed markup is a compile error. A plugin that
//! wants a different look registers a `renderer` handler.

pub mod cache;
pub mod callback;
pub mod config;
pub mod dates;
pub mod logging;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod plugin;
pub mod render;
pub mod request;
pub mod resolve;
pub mod select;
pub mod static_build;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
