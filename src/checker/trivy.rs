use crate::error::ScanError;
use crate::exec::CommandRunner;
use crate::model::SeverityCounts;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

pub struct TrivyScanner {
    runner: Arc<dyn CommandRunner>,
    program: String,
    timeout: Duration,
}

impl TrivyScanner {
    pub fn new(runner: Arc<dyn CommandRunner>, program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            runner,
            program: program.into(),
            timeout,
        }
    }
}

#[derive(Deserialize)]
struct TrivyReport {
    #[serde(rename = "Results", default)]
    results: Option<Vec<TrivyResult>>,
}

#[derive(Deserialize)]
struct TrivyResult {
    #[serde(rename = "Vulnerabilities", default)]
    vulnerabilities: Option<Vec<TrivyVulnerability>>,
}

#[derive(Deserialize)]
struct TrivyVulnerability {
    #[serde(rename = "Severity", default)]
    severity: String,
}

/// Counts every vulnerability occurrence across all Trivy results.
pub fn parse_trivy_report(raw: &[u8]) -> Result<SeverityCounts, serde_json::Error> {
    let report: TrivyReport = serde_json::from_slice(raw)?;

    let labels = report
        .results
        .unwrap_or_default()
        .into_iter()
        .flat_map(|result| result.vulnerabilities.unwrap_or_default())
        .map(|vuln| vuln.severity);

    Ok(SeverityCounts::from_labels(labels))
}

#[async_trait]
impl super::VulnerabilityScanner for TrivyScanner {
    fn name(&self) -> &'static str {
        "trivy"
    }

    async fn scan(&self, image: &str) -> Result<SeverityCounts, ScanError> {
        let args: Vec<String> = [
            "image",
            "--quiet",
            "--severity",
            "CRITICAL,HIGH,MEDIUM,LOW",
            "--format",
            "json",
            image,
        ]
        .into_iter()
        .map(str::to_string)
        .collect();

        let stdout = self
            .runner
            .run(&self.program, &args, self.timeout)
            .await?
            .into_stdout(&self.program)?;

        parse_trivy_report(&stdout).map_err(|source| ScanError::Parse {
            scanner: "trivy",
            source,
        })
    }
}
