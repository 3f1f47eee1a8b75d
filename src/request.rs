//! Per-request state: the incoming path and query, what the pipeline has
//! worked out so far, and the response being built.

use crate::config::SiteConfig;
use crate::dates::LatestDates;
use crate::render::Renderer;
use crate::types::{EntryRecord, RoutingDecision};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use url::form_urlencoded;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ResponseError {
    #[error("invalid header name {0:?}: must not contain spaces or colons")]
    InvalidHeader(String),
}

/// Transport-level input: the path and the raw query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpRequest {
    pub path_info: String,
    pub query: String,
}

impl HttpRequest {
    pub fn new(path_info: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            path_info: path_info.into(),
            query: query.into(),
        }
    }

    /// First value of a query parameter, percent-decoded.
    pub fn param(&self, key: &str) -> Option<String> {
        form_urlencoded::parse(self.query.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}

/// Values computed while the request moves through the pipeline.
#[derive(Debug, Clone, Default)]
pub struct RequestData {
    /// Flavour before path resolution (query or config default), then the
    /// resolved flavour.
    pub flavour: String,
    pub route: Option<RoutingDecision>,
    pub entries: Vec<EntryRecord>,
    pub latest: Option<LatestDates>,
    /// `"<blog_title> : <category>"`, or the bare title at the root.
    pub blog_title_with_path: String,
    /// `base_url` plus the category path.
    pub url: String,
    /// Free-form values plugins hand to each other or to the renderer.
    pub extra: BTreeMap<String, String>,
}

/// Status line, headers and body of a rendered page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: String,
    headers: Vec<(String, String)>,
    pub body: String,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: "200 OK".to_string(),
            headers: Vec::new(),
            body: String::new(),
        }
    }
}

impl Response {
    /// Full status line, e.g. `404 Not Found`.
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Numeric part of the status line.
    pub fn status_code(&self) -> u16 {
        self.status
            .split_whitespace()
            .next()
            .and_then(|code| code.parse().ok())
            .unwrap_or(200)
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Add a header. A `Status` key sets the status line instead.
    pub fn add_header(&mut self, key: &str, value: &str) -> Result<(), ResponseError> {
        if key.is_empty() || key.contains([' ', ':']) {
            return Err(ResponseError::InvalidHeader(key.to_string()));
        }
        if key.eq_ignore_ascii_case("status") {
            self.status = value.trim().to_string();
            return Ok(());
        }
        match self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
        {
            Some(existing) => existing.1 = value.to_string(),
            None => self.headers.push((key.to_string(), value.to_string())),
        }
        Ok(())
    }
}

impl fmt::Display for Response {
    /// CGI-style output: status, headers, blank line, body.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Status: {}", self.status)?;
        for (k, v) in &self.headers {
            writeln!(f, "{k}: {v}")?;
        }
        writeln!(f)?;
        f.write_str(&self.body)
    }
}

/// Everything one request carries through the pipeline.
pub struct Request {
    pub config: Arc<SiteConfig>,
    pub http: HttpRequest,
    pub data: RequestData,
    /// Set by the `renderer` chain or the renderer factory.
    pub renderer: Option<Box<dyn Renderer>>,
    pub response: Response,
}

impl Request {
    pub fn new(config: Arc<SiteConfig>, http: HttpRequest) -> Self {
        Self {
            config,
            http,
            data: RequestData::default(),
            renderer: None,
            response: Response::default(),
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("http", &self.http)
            .field("data", &self.data)
            .field("renderer", &self.renderer.is_some())
            .field("response", &self.response)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_param_is_decoded() {
        let r = HttpRequest::new("/", "flav=rss&q=hello%20world&flav=atom");
        assert_eq!(r.param("flav").as_deref(), Some("rss"));
        assert_eq!(r.param("q").as_deref(), Some("hello world"));
        assert_eq!(r.param("missing"), None);
    }

    #[test]
    fn response_defaults_to_200() {
        let r = Response::default();
        assert_eq!(r.status(), "200 OK");
        assert_eq!(r.status_code(), 200);
    }

    #[test]
    fn status_header_sets_status() {
        let mut r = Response::default();
        r.add_header("Status", "404 Not Found").unwrap();
        assert_eq!(r.status_code(), 404);
        assert!(r.headers().is_empty());
    }

    #[test]
    fn header_keys_are_validated() {
        let mut r = Response::default();
        assert_eq!(
            r.add_header("Bad Key", "x"),
            Err(ResponseError::InvalidHeader("Bad Key".into()))
        );
        assert!(r.add_header("Bad:Key", "x").is_err());
        assert!(r.add_header("", "x").is_err());
    }

    #[test]
    fn header_replaces_existing() {
        let mut r = Response::default();
        r.add_header("Content-Type", "text/plain").unwrap();
        r.add_header("content-type", "text/html").unwrap();
        assert_eq!(r.headers().len(), 1);
        assert_eq!(r.header("Content-Type"), Some("text/html"));
    }

    #[test]
    fn display_is_cgi_style() {
        let mut r = Response::default();
        r.add_header("Content-Type", "text/plain").unwrap();
        r.body = "hi".into();
        assert_eq!(
            r.to_string(),
            "Status: 200 OK\nContent-Type: text/plain\n\nhi"
        );
    }
}
