//! CLI output formatting for every command.
//!
//! # Output Format
//!
//! ## Build
//!
//! ```text
//! Scanned 12 sources, 2 changed, 9 pages to render
//!     /blog/rust/hello.html → static/blog/rust/hello.html
//!     /2024/Mar/index.html → static/2024/Mar/index.html
//!     /drafts/index.html → static/drafts/index.html (404)
//!     /broken.html FAILED: Handler "start" #0 failed: ...
//! Rendered 8 pages, 1 failed
//! Cache: 10 cached, 2 parsed (12 total)
//! ```
//!
//! Page lines come from worker threads and arrive in completion order.
//!
//! ## Dry run
//!
//! ```text
//! Changed
//!     blog/rust/hello
//! Pages
//!     /blog/rust/hello.html
//!     /index.html
//! ```
//!
//! ## Check
//!
//! ```text
//! Datadir
//!     content/ (ok)
//! Config
//!     blog_author: not set
//! Extensions
//!     txt
//! Callbacks
//!     start: 0
//!     ...
//! Plugins
//!     tags: ok
//!     comments: needs comment_dir
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::pipeline::CheckReport;
use crate::request::Response;
use crate::static_build::{BuildEvent, BuildResult, StaticPlan};

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

// ============================================================================
// Render
// ============================================================================

/// One live request. With `headers`, CGI style: status, headers, blank
/// line, body.
pub fn format_render_output(response: &Response, headers: bool) -> String {
    if headers {
        response.to_string()
    } else {
        response.body.clone()
    }
}

pub fn print_render_output(response: &Response, headers: bool) {
    print!("{}", format_render_output(response, headers));
}

// ============================================================================
// Build
// ============================================================================

/// Format a single build event.
pub fn format_build_event(event: &BuildEvent) -> Vec<String> {
    match event {
        BuildEvent::Planned {
            scanned,
            changed,
            targets,
        } => vec![format!(
            "Scanned {}, {} changed, {} to render",
            plural(*scanned, "source"),
            changed,
            plural(*targets, "page"),
        )],
        BuildEvent::Rendered {
            path,
            output,
            status,
        } => {
            let line = format!("{}{} \u{2192} {}", indent(1), path, output.display());
            if *status == 200 {
                vec![line]
            } else {
                vec![format!("{line} ({status})")]
            }
        }
        BuildEvent::Failed { path, error } => {
            vec![format!("{}{} FAILED: {}", indent(1), path, error)]
        }
    }
}

pub fn format_build_summary(result: &BuildResult) -> Vec<String> {
    let mut lines = vec![if result.failed > 0 {
        format!(
            "Rendered {}, {} failed",
            plural(result.rendered, "page"),
            result.failed
        )
    } else {
        format!("Rendered {}", plural(result.rendered, "page"))
    }];
    if result.cache_stats.total() > 0 {
        lines.push(format!("Cache: {}", result.cache_stats));
    }
    lines
}

pub fn print_build_summary(result: &BuildResult) {
    for line in format_build_summary(result) {
        println!("{}", line);
    }
}

/// Changed sources and the pages a build would render.
pub fn format_plan(plan: &StaticPlan) -> Vec<String> {
    let mut lines = Vec::new();
    let changed: Vec<_> = plan.changed().collect();
    if !changed.is_empty() {
        lines.push("Changed".to_string());
        for source in changed {
            lines.push(format!("{}{}", indent(1), source.stem));
        }
    }
    if plan.targets.is_empty() {
        lines.push("Nothing to render".to_string());
    } else {
        lines.push("Pages".to_string());
        for target in &plan.targets {
            if target.query_string.is_empty() {
                lines.push(format!("{}{}", indent(1), target.output_path));
            } else {
                lines.push(format!(
                    "{}{}?{}",
                    indent(1),
                    target.output_path,
                    target.query_string
                ));
            }
        }
    }
    lines
}

pub fn print_plan(plan: &StaticPlan) {
    for line in format_plan(plan) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

pub fn format_check_report(report: &CheckReport) -> Vec<String> {
    let mut lines = vec!["Datadir".to_string()];
    let state = if report.datadir_exists {
        "ok"
    } else {
        "missing"
    };
    lines.push(format!(
        "{}{} ({})",
        indent(1),
        report.datadir.display(),
        state
    ));

    if !report.missing_optional.is_empty() {
        lines.push("Config".to_string());
        for key in &report.missing_optional {
            lines.push(format!("{}{}: not set", indent(1), key));
        }
    }

    lines.push("Extensions".to_string());
    for ext in &report.extensions {
        lines.push(format!("{}{}", indent(1), ext));
    }

    lines.push("Callbacks".to_string());
    for (name, count) in &report.chains {
        lines.push(format!("{}{}: {}", indent(1), name, count));
    }

    if !report.plugins.is_empty() {
        lines.push("Plugins".to_string());
        for (name, outcome) in &report.plugins {
            match outcome {
                Ok(()) => lines.push(format!("{}{}: ok", indent(1), name)),
                Err(msg) => lines.push(format!("{}{}: {}", indent(1), name, msg)),
            }
        }
    }
    lines
}

pub fn print_check_report(report: &CheckReport) {
    for line in format_check_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
