//! Configuration file handling.
//!
//! Two files drive a run:
//!
//! - the **settings** file (TOML): where to read and write, tool binaries,
//!   timeouts and the failure policy;
//! - the **apps** file (YAML): the tracked applications themselves.
//!
//! # Settings Location
//!
//! Unless `--settings` is given, settings are read from:
//! - Linux: `~/.config/release-comparer/config.toml`
//! - macOS: `~/Library/Application Support/release-comparer/config.toml`
//! - Windows: `%APPDATA%\release-comparer\config.toml`
//!
//! # Example Settings
//!
//! ```toml
//! apps_file = "config.yaml"
//! data_dir = "data"
//! failure_policy = "skip"
//!
//! [timeouts]
//! scan_secs = 1800
//!
//! [tools]
//! trivy = "/usr/local/bin/trivy"
//! ```
//!
//! # Example Apps File
//!
//! ```yaml
//! nginx:
//!   url: https://github.com/nginx/nginx/tags
//!   regex: 'release-(\d+\.\d+\.\d+)'
//!   bitnami: docker.io/bitnami/nginx:latest
//!   cg:
//!     image: cgr.dev/chainguard/nginx:latest
//!     command: nginx -v
//!     regex: 'nginx/(\d+\.\d+\.\d+)'
//! ```

use crate::error::ConfigError;
use crate::model::{AppEntry, TrackedApp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What to do when one application cannot be completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the whole run at the first failed application.
    #[default]
    Abort,
    /// Log the failure, skip the application and carry on.
    Skip,
}

/// Tool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path of the YAML apps file.
    ///
    /// Default: `config.yaml`
    pub apps_file: PathBuf,

    /// Directory reports are written to, one `<app>.json` per application.
    ///
    /// Default: `data`
    pub data_dir: PathBuf,

    /// Default: `abort`
    pub failure_policy: FailurePolicy,

    pub timeouts: Timeouts,

    pub tools: Tools,
}

/// Upper bounds for every external call, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub http_secs: u64,
    pub registry_secs: u64,
    pub run_secs: u64,
    pub scan_secs: u64,
}

impl Timeouts {
    pub fn http(&self) -> Duration {
        Duration::from_secs(self.http_secs)
    }

    pub fn registry(&self) -> Duration {
        Duration::from_secs(self.registry_secs)
    }

    pub fn run(&self) -> Duration {
        Duration::from_secs(self.run_secs)
    }

    pub fn scan(&self) -> Duration {
        Duration::from_secs(self.scan_secs)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            http_secs: 30,
            registry_secs: 120,
            run_secs: 120,
            scan_secs: 900,
        }
    }
}

/// Executables used for registry access, container runs and scanning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tools {
    pub crane: String,
    pub docker: String,
    pub trivy: String,
    pub grype: String,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            crane: "crane".to_string(),
            docker: "docker".to_string(),
            trivy: "trivy".to_string(),
            grype: "grype".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            apps_file: PathBuf::from("config.yaml"),
            data_dir: PathBuf::from("data"),
            failure_policy: FailurePolicy::default(),
            timeouts: Timeouts::default(),
            tools: Tools::default(),
        }
    }
}

impl Config {
    /// Loads settings from `path`, or from [`config_path`](Self::config_path)
    /// when `path` is `None`.
    ///
    /// A missing default settings file yields the defaults; an explicitly
    /// requested file must exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let path = Self::config_path();
                if !path.exists() {
                    return Ok(Self::default());
                }
                path
            }
        };

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path,
            reason: e.to_string(),
        })
    }

    /// Saves the settings to `path`.
    ///
    /// Creates the parent directory if it doesn't exist.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        fs::write(path, self.render()?)?;
        Ok(())
    }

    /// Returns the path to the default settings file.
    ///
    /// # Example
    ///
    /// ```
    /// use release_comparer::Config;
    ///
    /// let path = Config::config_path();
    /// assert!(path.ends_with("release-comparer/config.toml"));
    /// ```
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("release-comparer")
            .join("config.toml")
    }

    /// Renders these settings as TOML.
    pub fn render(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Reads and validates the apps file.
///
/// Applications come back sorted by name.
pub fn load_apps(path: &Path) -> Result<Vec<TrackedApp>, ConfigError> {
    tracing::info!("Reading {}...", path.display());

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    parse_apps(&content).map_err(|e| match e {
        ConfigError::Parse { reason, .. } => ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        },
        other => other,
    })
}

/// Parses and validates apps-file content.
pub fn parse_apps(content: &str) -> Result<Vec<TrackedApp>, ConfigError> {
    let entries: BTreeMap<String, AppEntry> =
        serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            reason: e.to_string(),
        })?;

    entries
        .iter()
        .map(|(name, entry)| TrackedApp::from_entry(name, entry))
        .collect()
}
