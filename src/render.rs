//! Page rendering.
//!
//! The pipeline only talks to a [`Renderer`]: it hands over the entries (or
//! a message, for the not-found page), adds headers, and asks it to render
//! into the [`Response`]. Which renderer is used is decided per request by
//! the `renderer` callback chain, falling back to the blog's
//! [`RendererFactory`].
//!
//! The built-in [`BlogRenderer`] knows three flavours:
//!
//! - **`html`**: a page with the blog title and every entry (title, date, body)
//! - **`rss`**: an RSS 2.0 channel
//! - anything else: a `text/plain` dump
//!
//! HTML and RSS are built with [maud](https://maud.lambda.xyz/), so titles
//! and text are escaped. Entry bodies are trusted: they come out of the
//! `preformat` chain as HTML already.

use crate::config::SiteConfig;
use crate::request::{RequestData, Response, ResponseError};
use crate::types::EntryRecord;
use maud::{DOCTYPE, Markup, PreEscaped, html};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("invalid header: {0}")]
    Header(#[from] ResponseError),
    #[error("render failed: {0}")]
    Failed(String),
}

/// What a renderer is asked to show.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Entries(Vec<EntryRecord>),
    /// A synthesized page. `body` is HTML.
    Message { title: String, body: String },
}

/// Produces the body (and headers) of a response.
pub trait Renderer: Send {
    fn set_content(&mut self, content: Content);

    /// Queue a header; it's applied to the response on [`render`](Self::render).
    fn add_header(&mut self, key: &str, value: &str) -> Result<(), ResponseError>;

    fn render(
        &mut self,
        config: &SiteConfig,
        data: &RequestData,
        response: &mut Response,
    ) -> Result<(), RenderError>;

    /// Whether [`render`](Self::render) already ran for this request.
    fn rendered(&self) -> bool;
}

/// Creates the renderer used when no `renderer` handler supplies one.
pub trait RendererFactory: Send + Sync {
    fn create(&self, config: &SiteConfig) -> Box<dyn Renderer>;
}

/// The not-found page: names the blog and links back to its root.
pub fn not_found(config: &SiteConfig) -> Content {
    let home = if config.base_url.is_empty() {
        "/"
    } else {
        config.base_url.as_str()
    };
    let body = html! {
        "Somehow I cannot find the page you want. Go Back to "
        a href=(home) { (config.blog_title) }
        "?"
    };
    Content::Message {
        title: "The page you are looking for is not available".to_string(),
        body: body.into_string(),
    }
}

// ============================================================================
// Built-in renderer
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct BlogRendererFactory;

impl RendererFactory for BlogRendererFactory {
    fn create(&self, _config: &SiteConfig) -> Box<dyn Renderer> {
        Box::new(BlogRenderer::default())
    }
}

#[derive(Debug, Default)]
pub struct BlogRenderer {
    content: Option<Content>,
    headers: Vec<(String, String)>,
    rendered: bool,
}

impl Renderer for BlogRenderer {
    fn set_content(&mut self, content: Content) {
        self.content = Some(content);
    }

    fn add_header(&mut self, key: &str, value: &str) -> Result<(), ResponseError> {
        // Validate now so the caller sees the error, not the render step.
        Response::default().add_header(key, value)?;
        self.headers.push((key.to_string(), value.to_string()));
        Ok(())
    }

    fn render(
        &mut self,
        config: &SiteConfig,
        data: &RequestData,
        response: &mut Response,
    ) -> Result<(), RenderError> {
        let flavour = data.flavour.as_str();
        let content = self
            .content
            .take()
            .unwrap_or_else(|| Content::Entries(Vec::new()));

        let (mime, body) = match flavour {
            "html" => ("text/html", render_html(config, data, &content).into_string()),
            "rss" => ("application/rss+xml", render_rss(config, data, &content)),
            _ => ("text/plain", render_text(data, &content)),
        };

        response.add_header(
            "Content-Type",
            &format!("{}; charset={}", mime, config.blog_encoding),
        )?;
        if let Some(latest) = &data.latest {
            response.add_header("Last-Modified", &latest.rfc822date)?;
        }
        for (k, v) in self.headers.drain(..) {
            response.add_header(&k, &v)?;
        }
        response.body = body;
        self.rendered = true;
        Ok(())
    }

    fn rendered(&self) -> bool {
        self.rendered
    }
}

const CSS: &str = "\
body { max-width: 42rem; margin: 2rem auto; padding: 0 1rem; font-family: Georgia, serif; line-height: 1.5; }
header.blog-header h1 a { color: inherit; text-decoration: none; }
article.entry { margin-bottom: 3rem; }
.entry-date { color: #666; font-size: 0.9rem; }
";

fn base_document(config: &SiteConfig, title: &str, content: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang=(config.blog_language) {
            head {
                meta charset=(config.blog_encoding);
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (title) }
                @if !config.blog_description.is_empty() {
                    meta name="description" content=(config.blog_description);
                }
                style { (PreEscaped(CSS)) }
            }
            body {
                (content)
            }
        }
    }
}

fn render_entry(config: &SiteConfig, flavour: &str, entry: &EntryRecord) -> Markup {
    html! {
        article.entry {
            h2 {
                a href=(entry.url(&config.base_url, flavour)) { (entry.title) }
            }
            @if let Some(t) = &entry.modified_time {
                p.entry-date {
                    time datetime=(t.to_rfc3339()) { (t.format("%a, %d %b %Y %H:%M").to_string()) }
                }
            }
            div.entry-body {
                (PreEscaped(&entry.body))
            }
        }
    }
}

fn render_html(config: &SiteConfig, data: &RequestData, content: &Content) -> Markup {
    let home = if config.base_url.is_empty() {
        "/".to_string()
    } else {
        format!("{}/", config.base_url)
    };
    let title = if data.blog_title_with_path.is_empty() {
        config.blog_title.as_str()
    } else {
        data.blog_title_with_path.as_str()
    };

    let main = html! {
        header.blog-header {
            h1 { a href=(home) { (config.blog_title) } }
            @if !config.blog_description.is_empty() {
                p.blog-description { (config.blog_description) }
            }
        }
        main {
            @match content {
                Content::Entries(entries) => {
                    @for entry in entries {
                        (render_entry(config, &data.flavour, entry))
                    }
                }
                Content::Message { title, body } => {
                    article.message {
                        h2 { (title) }
                        p { (PreEscaped(body)) }
                    }
                }
            }
        }
    };

    base_document(config, title, main)
}

fn render_rss(config: &SiteConfig, data: &RequestData, content: &Content) -> String {
    let channel_link = if data.url.is_empty() {
        config.base_url.as_str()
    } else {
        data.url.as_str()
    };
    let feed = html! {
        rss version="2.0" {
            channel {
                title { (data.blog_title_with_path) }
                link { (channel_link) }
                description { (config.blog_description) }
                language { (config.blog_language) }
                @if let Some(latest) = &data.latest {
                    lastBuildDate { (latest.rfc822date) }
                }
                @match content {
                    Content::Entries(entries) => {
                        @for entry in entries {
                            @let url = entry.url(&config.base_url, "html");
                            item {
                                title { (entry.title) }
                                link { (url) }
                                guid { (url) }
                                @if let Some(t) = &entry.modified_time {
                                    pubDate { (t.to_rfc2822()) }
                                }
                                description { (entry.body) }
                            }
                        }
                    }
                    Content::Message { title, body } => {
                        item {
                            title { (title) }
                            description { (body) }
                        }
                    }
                }
            }
        }
    };
    format!(
        "<?xml version=\"1.0\" encoding=\"{}\"?>\n{}",
        config.blog_encoding,
        feed.into_string()
    )
}

fn render_text(data: &RequestData, content: &Content) -> String {
    let mut out = String::new();
    match content {
        Content::Entries(entries) => {
            for entry in entries {
                out.push_str(&entry.title);
                out.push('\n');
                if let Some(t) = &entry.modified_time {
                    out.push_str(&t.format("%Y-%m-%d %H:%M").to_string());
                    out.push('\n');
                }
                out.push('\n');
                out.push_str(&entry.body);
                out.push('\n');
            }
        }
        Content::Message { title, body } => {
            out.push_str(title);
            out.push_str("\n\n");
            out.push_str(body);
            out.push('\n');
        }
    }
    if out.is_empty() {
        out.push_str(&data.blog_title_with_path);
        out.push('\n');
    }
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::LatestDates;
    use chrono::{Local, TimeZone};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn config() -> SiteConfig {
        SiteConfig {
            blog_title: "Test <Blog>".into(),
            base_url: "https://example.org".into(),
            ..SiteConfig::default()
        }
    }

    fn entry(title: &str, body: &str) -> EntryRecord {
        EntryRecord {
            source_path: PathBuf::from("/data/blog/first.txt"),
            modified_time: Some(Local.with_ymd_and_hms(2024, 3, 7, 8, 30, 0).unwrap()),
            category: "blog".into(),
            metadata: BTreeMap::new(),
            title: title.into(),
            body: body.into(),
        }
    }

    fn data(flavour: &str) -> RequestData {
        RequestData {
            flavour: flavour.into(),
            blog_title_with_path: "Test <Blog> : blog".into(),
            url: "https://example.org/blog".into(),
            ..RequestData::default()
        }
    }

    fn render(flavour: &str, content: Content) -> Response {
        let mut r = BlogRenderer::default();
        r.set_content(content);
        let mut resp = Response::default();
        r.render(&config(), &data(flavour), &mut resp).unwrap();
        assert!(r.rendered());
        resp
    }

    #[test]
    fn not_found_names_blog_and_links_home() {
        let Content::Message { title, body } = not_found(&config()) else {
            panic!("expected a message");
        };
        assert_eq!(title, "The page you are looking for is not available");
        assert!(body.contains("href=\"https://example.org\""));
        assert!(body.contains("Test &lt;Blog&gt;"));
    }

    #[test]
    fn html_lists_entries() {
        let resp = render("html", Content::Entries(vec![entry("First", "<p>Body</p>")]));
        assert!(resp.body.starts_with("<!DOCTYPE html>"));
        assert!(resp.body.contains("<title>Test &lt;Blog&gt; : blog</title>"));
        assert!(resp.body.contains("https://example.org/blog/first.html"));
        assert!(resp.body.contains("<p>Body</p>"));
        assert_eq!(resp.header("Content-Type"), Some("text/html; charset=utf-8"));
    }

    #[test]
    fn html_escapes_titles() {
        let resp = render("html", Content::Entries(vec![entry("<script>", "")]));
        assert!(resp.body.contains("&lt;script&gt;"));
        assert!(!resp.body.contains("<script>"));
    }

    #[test]
    fn rss_has_channel_and_items() {
        let resp = render("rss", Content::Entries(vec![entry("First", "<p>Body</p>")]));
        assert!(resp.body.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(resp.body.contains("<rss version=\"2.0\">"));
        assert!(resp.body.contains("<title>First</title>"));
        assert!(resp.body.contains("&lt;p&gt;Body&lt;/p&gt;"));
        assert_eq!(
            resp.header("Content-Type"),
            Some("application/rss+xml; charset=utf-8")
        );
    }

    #[test]
    fn other_flavours_are_plain_text() {
        let resp = render("txt", Content::Entries(vec![entry("First", "hello")]));
        assert!(resp.body.starts_with("First\n2024-03-07 08:30\n\nhello"));
        assert_eq!(resp.header("Content-Type"), Some("text/plain; charset=utf-8"));
    }

    #[test]
    fn message_page() {
        let resp = render(
            "html",
            Content::Message {
                title: "Gone".into(),
                body: "<a href=\"/\">home</a>".into(),
            },
        );
        assert!(resp.body.contains("<h2>Gone</h2>"));
        assert!(resp.body.contains("<a href=\"/\">home</a>"));
    }

    #[test]
    fn queued_headers_reach_response() {
        let mut r = BlogRenderer::default();
        r.add_header("Status", "404 Not Found").unwrap();
        r.add_header("X-Test", "1").unwrap();
        assert!(r.add_header("Bad Key", "1").is_err());
        let mut resp = Response::default();
        r.render(&config(), &data("html"), &mut resp).unwrap();
        assert_eq!(resp.status_code(), 404);
        assert_eq!(resp.header("X-Test"), Some("1"));
    }

    #[test]
    fn last_modified_from_latest() {
        let mut d = data("html");
        d.latest = Some(LatestDates {
            date: String::new(),
            w3cdate: String::new(),
            rfc822date: "Thu, 07 Mar 2024 08:30 GMT".into(),
        });
        let mut r = BlogRenderer::default();
        let mut resp = Response::default();
        r.render(&config(), &d, &mut resp).unwrap();
        assert_eq!(resp.header("Last-Modified"), Some("Thu, 07 Mar 2024 08:30 GMT"));
    }
}
