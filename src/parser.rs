//! Content file parsing.
//!
//! A parser turns one file on disk into a [`ParsedEntry`]: a title, a raw
//! body and free-form metadata. Parsers are registered per file extension;
//! the built-in one handles `.txt` files in the blosxom layout:
//!
//! ```text
//! The title is the first line
//! #parser markdown
//! #date 2024-03-07 08:30
//! Everything after the metadata lines is the body.
//! ```
//!
//! Body formatting (plain or markdown) is not the parser's job. The selector
//! runs the raw body through the `preformat` chain, whose default is
//! [`format_body`].

use pulldown_cmark::{Options, Parser, html as md_html};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

/// What a parser extracts from a content file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedEntry {
    pub title: String,
    pub body: String,
    pub metadata: BTreeMap<String, String>,
}

/// Parses content files of one extension.
pub trait EntryParser: Send + Sync {
    fn parse(&self, path: &Path) -> Result<ParsedEntry, ParseError>;
}

/// Registered parsers keyed by file extension (without the dot).
pub type Extensions = BTreeMap<String, Arc<dyn EntryParser>>;

/// The parsers available without any plugin.
pub fn default_extensions() -> Extensions {
    let mut extensions: Extensions = BTreeMap::new();
    extensions.insert("txt".to_string(), Arc::new(BlosxomParser));
    extensions
}

/// The `.txt` format: title line, `#key value` metadata lines, body.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlosxomParser;

impl EntryParser for BlosxomParser {
    fn parse(&self, path: &Path) -> Result<ParsedEntry, ParseError> {
        let content = fs::read_to_string(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(parse_blosxom(&content))
    }
}

/// Split blosxom-format text into title, metadata and body.
pub fn parse_blosxom(content: &str) -> ParsedEntry {
    let mut lines = content.lines().peekable();
    let title = lines.next().map(|l| l.trim().to_string()).unwrap_or_default();

    let mut metadata = BTreeMap::new();
    while let Some(line) = lines.next_if(|l| l.starts_with('#')) {
        let meta = line[1..].trim();
        if meta.is_empty() {
            continue;
        }
        let (key, value) = meta.split_once(char::is_whitespace).unwrap_or((meta, ""));
        metadata.insert(key.to_string(), value.trim().to_string());
    }

    let mut body = lines.collect::<Vec<_>>().join("\n");
    if !body.is_empty() {
        body.push('\n');
    }

    ParsedEntry {
        title,
        body,
        metadata,
    }
}

/// Format a raw body with the named formatter: `markdown` renders HTML,
/// anything else returns the text unchanged.
pub fn format_body(formatter: &str, text: &str) -> String {
    if formatter != "markdown" {
        return text.to_string();
    }
    let parser = Parser::new_ext(text, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH);
    let mut html = String::new();
    md_html::push_html(&mut html, parser);
    html
}
