//! Tracing subscriber setup for the `plainblog` binary.
//!
//! Log lines go to stderr so `plainblog render` can write pages to stdout.
//! `RUST_LOG` overrides the configured level; `--verbose` forces `debug`.
//! With `[logging] file` set, a second layer appends every debug event to
//! that file without colours.

use crate::config::LoggingConfig;
use std::path::Path;
use thiserror::Error;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("cannot open log file {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid log filter: {0}")]
    Filter(String),
    #[error("logging already initialized: {0}")]
    Init(String),
}

/// Filter directive for the terminal layer.
pub fn filter_directive(level: &str, verbose: bool) -> String {
    let level = if verbose { "debug" } else { level };
    format!("plainblog={level}")
}

/// Install the global subscriber.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<(), LoggingError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(filter_directive(&config.level, verbose))
            .map_err(|e| LoggingError::Filter(e.to_string()))?,
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .with_filter(env_filter);

    let file = match &config.file {
        Some(path) => Some(file_layer(path)?),
        None => None,
    };

    tracing_subscriber::registry()
        .with(file)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn file_layer(path: &Path) -> Result<BoxedLayer, LoggingError> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LoggingError::File {
            path: path.display().to_string(),
            source,
        })?;
    let filter =
        EnvFilter::try_new("plainblog=debug").map_err(|e| LoggingError::Filter(e.to_string()))?;
    Ok(fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_filter(filter)
        .boxed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_uses_configured_level() {
        assert_eq!(filter_directive("warn", false), "plainblog=warn");
    }

    #[test]
    fn verbose_forces_debug() {
        assert_eq!(filter_directive("warn", true), "plainblog=debug");
    }

    #[test]
    fn unopenable_log_file_is_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("missing-dir").join("x.log");
        let err = file_layer(&path).err().unwrap();
        assert!(matches!(err, LoggingError::File { .. }));
    }
}
