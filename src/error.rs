//! Error Types
//!
//! Typed errors for the fallible internals of each component. Public
//! steady-state entry points (workflow parsing, log tailing, state
//! persistence) log these and degrade to an empty result instead of
//! returning them.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use log::error;
use thiserror::Error;

/// Errors raised while loading a workflow definition.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("workflow file '{}' does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("'{}' is a directory, not a workflow file", .0.display())]
    IsDirectory(PathBuf),

    #[error("workflow file '{}' is {size} bytes, larger than the {limit} byte limit", path.display())]
    TooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed XML in '{}': {source}", path.display())]
    Xml {
        path: PathBuf,
        #[source]
        source: roxmltree::Error,
    },
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("environment override {name}={value} is not a valid number")]
    Override { name: &'static str, value: String },

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Errors raised while setting up file monitoring.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("filesystem watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("failed to spawn polling thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Errors raised while persisting or restoring state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state file I/O failed for '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("state file '{}' does not hold a JSON object", .0.display())]
    NotAnObject(PathBuf),

    #[error("no home directory available for the default state file")]
    NoHomeDir,
}

/// Error type returned by event and change handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type returned by event and change handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// Runs one handler, logging an `Err` return or a panic instead of
/// propagating it. Returns true if the handler succeeded.
pub(crate) fn run_handler<F>(context: &str, handler: F) -> bool
where
    F: FnOnce() -> HandlerResult,
{
    match panic::catch_unwind(AssertUnwindSafe(handler)) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            error!("{} handler failed: {}", context, e);
            false
        }
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("{} handler panicked: {}", context, reason);
            false
        }
    }
}
