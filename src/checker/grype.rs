use crate::error::ScanError;
use crate::exec::CommandRunner;
use crate::model::SeverityCounts;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

pub struct GrypeScanner {
    runner: Arc<dyn CommandRunner>,
    program: String,
    timeout: Duration,
}

impl GrypeScanner {
    pub fn new(runner: Arc<dyn CommandRunner>, program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            runner,
            program: program.into(),
            timeout,
        }
    }
}

#[derive(Deserialize)]
struct GrypeReport {
    #[serde(default)]
    matches: Option<Vec<GrypeMatch>>,
}

#[derive(Deserialize)]
struct GrypeMatch {
    vulnerability: GrypeVulnerability,
}

#[derive(Deserialize)]
struct GrypeVulnerability {
    #[serde(default)]
    severity: String,
}

/// Counts every Grype match by its vulnerability severity.
pub fn parse_grype_report(raw: &[u8]) -> Result<SeverityCounts, serde_json::Error> {
    let report: GrypeReport = serde_json::from_slice(raw)?;

    let labels = report
        .matches
        .unwrap_or_default()
        .into_iter()
        .map(|m| m.vulnerability.severity);

    Ok(SeverityCounts::from_labels(labels))
}

#[async_trait]
impl super::VulnerabilityScanner for GrypeScanner {
    fn name(&self) -> &'static str {
        "grype"
    }

    async fn scan(&self, image: &str) -> Result<SeverityCounts, ScanError> {
        let args = vec![image.to_string(), "-o".to_string(), "json".to_string()];

        let stdout = self
            .runner
            .run(&self.program, &args, self.timeout)
            .await?
            .into_stdout(&self.program)?;

        parse_grype_report(&stdout).map_err(|source| ScanError::Parse {
            scanner: "grype",
            source,
        })
    }
}
