//! Error types.
//!
//! Each stage of the comparison has its own error enum so callers can
//! decide per stage whether a failure is fatal or recoverable. The fatal
//! ones for a single application are collected into [`AppError`].

use std::path::PathBuf;
use std::time::Duration;

/// Errors raised while loading settings or the apps file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("app '{app}': invalid regex for {field}: {source}")]
    Regex {
        app: String,
        field: String,
        #[source]
        source: regex::Error,
    },

    #[error("app '{app}': {reason}")]
    Invalid { app: String, reason: String },
}

/// Errors raised when running an external program.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {}s", after.as_secs())]
    Timeout { program: String, after: Duration },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
}

/// Errors raised while resolving the latest upstream version.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("no valid stable versions found at {url}")]
    NoVersionFound { url: String },
}

/// Errors raised while inspecting an image.
#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    #[error("failed to get manifest for {reference}: {reason}")]
    Manifest { reference: String, reason: String },

    #[error("failed to detect version in {reference}: {reason}")]
    VersionExtraction { reference: String, reason: String },
}

/// Errors raised by a vulnerability scanner adapter.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("failed to parse {scanner} output: {source}")]
    Parse {
        scanner: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised while persisting a report.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A failure that ends processing of one application.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("app '{app}': {source}")]
    Resolve {
        app: String,
        #[source]
        source: ResolveError,
    },

    #[error("app '{app}': {source}")]
    Report {
        app: String,
        #[source]
        source: ReportError,
    },
}

impl AppError {
    /// Name of the application that failed.
    pub fn app(&self) -> &str {
        match self {
            AppError::Resolve { app, .. } | AppError::Report { app, .. } => app,
        }
    }
}
