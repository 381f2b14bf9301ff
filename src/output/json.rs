use crate::error::ReportError;
use crate::model::AppReport;
use std::fs;
use std::path::{Path, PathBuf};

/// Writes one `<app>.json` report per application into a data directory.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Path the report for `app_name` is written to.
    pub fn report_path(&self, app_name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", app_name))
    }

    /// Serializes `report` and writes it, replacing any earlier report.
    pub fn write(&self, app_name: &str, report: &AppReport) -> Result<PathBuf, ReportError> {
        let json = serde_json::to_string_pretty(report)?;

        fs::create_dir_all(&self.dir).map_err(|source| ReportError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.report_path(app_name);
        fs::write(&path, json).map_err(|source| ReportError::Write {
            path: path.clone(),
            source,
        })?;

        Ok(path)
    }
}
