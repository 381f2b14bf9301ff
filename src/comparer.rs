//! Per-application comparison pipeline.
//!
//! For every tracked application the [`Comparer`] resolves the latest
//! upstream version, then for each image variant inspects the image and
//! runs both scanners, and finally writes the report. Applications,
//! variants and architectures are all processed one at a time.
//!
//! Failures below the application level never stop the run: a variant
//! whose manifest list is unavailable is left out, an architecture that
//! cannot be read is left out, a failed scanner reports zeros and a failed
//! version detection omits `detected_version`. Application-level failures
//! follow the configured [`FailurePolicy`].

use crate::checker::{GrypeScanner, TrivyScanner, VulnerabilityScanner};
use crate::config::{Config, FailurePolicy};
use crate::error::AppError;
use crate::exec::CommandRunner;
use crate::inspector::ImageInspector;
use crate::model::{AppReport, ArchSize, ImageReport, ImageVariant, SeverityCounts, TrackedApp};
use crate::output::ReportWriter;
use crate::resolver::{PageFetcher, VersionResolver};
use std::path::PathBuf;
use std::sync::Arc;

/// How processing of one application ended.
#[derive(Debug, Clone)]
pub enum AppStatus {
    Written(PathBuf),
    Skipped(String),
}

#[derive(Debug, Clone)]
pub struct AppOutcome {
    pub name: String,
    /// Present when the report was written.
    pub report: Option<AppReport>,
    pub status: AppStatus,
}

/// Outcomes of a whole run, in processing order.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub outcomes: Vec<AppOutcome>,
}

impl RunSummary {
    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, AppStatus::Skipped(_)))
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.skipped() == 0
    }
}

pub struct Comparer {
    resolver: VersionResolver,
    inspector: ImageInspector,
    grype: Box<dyn VulnerabilityScanner>,
    trivy: Box<dyn VulnerabilityScanner>,
    writer: ReportWriter,
    policy: FailurePolicy,
}

impl Comparer {
    /// Wires up the pipeline from settings.
    pub fn new(config: &Config, runner: Arc<dyn CommandRunner>, fetcher: Box<dyn PageFetcher>) -> Self {
        let scan_timeout = config.timeouts.scan();

        Self {
            resolver: VersionResolver::new(fetcher),
            inspector: ImageInspector::new(runner.clone(), &config.tools, &config.timeouts),
            grype: Box::new(GrypeScanner::new(
                runner.clone(),
                config.tools.grype.clone(),
                scan_timeout,
            )),
            trivy: Box::new(TrivyScanner::new(
                runner,
                config.tools.trivy.clone(),
                scan_timeout,
            )),
            writer: ReportWriter::new(&config.data_dir),
            policy: config.failure_policy,
        }
    }

    /// Processes every application in order.
    ///
    /// # Errors
    ///
    /// With [`FailurePolicy::Abort`], returns the first application failure.
    /// With [`FailurePolicy::Skip`], never fails; skipped applications are
    /// recorded in the summary.
    pub async fn run(&self, apps: &[TrackedApp]) -> Result<RunSummary, AppError> {
        let mut summary = RunSummary::default();

        for app in apps {
            match self.process_app(app).await {
                Ok((report, path)) => summary.outcomes.push(AppOutcome {
                    name: app.name.clone(),
                    report: Some(report),
                    status: AppStatus::Written(path),
                }),
                Err(e) => match self.policy {
                    FailurePolicy::Abort => return Err(e),
                    FailurePolicy::Skip => {
                        tracing::error!("Skipping {}: {}", app.name, e);
                        summary.outcomes.push(AppOutcome {
                            name: app.name.clone(),
                            report: None,
                            status: AppStatus::Skipped(e.to_string()),
                        });
                    }
                },
            }
        }

        Ok(summary)
    }

    /// Builds and writes the report for one application.
    pub async fn process_app(&self, app: &TrackedApp) -> Result<(AppReport, PathBuf), AppError> {
        let report = self.compare_app(app).await?;

        let path = self
            .writer
            .write(&app.name, &report)
            .map_err(|source| AppError::Report {
                app: app.name.clone(),
                source,
            })?;

        tracing::info!("{} processed successfully. JSON saved to {}", app.name, path.display());
        Ok((report, path))
    }

    /// Builds the report for one application without writing it.
    pub async fn compare_app(&self, app: &TrackedApp) -> Result<AppReport, AppError> {
        tracing::info!("Processing app '{}'...", app.name);

        let latest = self
            .resolver
            .resolve_latest_version(&app.url, &app.regex)
            .await
            .map_err(|source| AppError::Resolve {
                app: app.name.clone(),
                source,
            })?;
        tracing::info!("Latest stable version found: {}", latest);

        let mut report = AppReport::new(latest.to_string());
        for image in &app.variants {
            if let Some(image_report) = self.compare_variant(image).await {
                report.images.insert(image.variant, image_report);
            }
        }

        Ok(report)
    }

    /// Returns `None` when the variant's manifest list is unavailable.
    async fn compare_variant(&self, image: &ImageVariant) -> Option<ImageReport> {
        tracing::info!("===== Processing {} ({}) =====", image.variant, image.image);

        let inspection = match self.inspector.inspect_image(image).await {
            Ok(inspection) => inspection,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", image.variant, e);
                return None;
            }
        };

        let grype = self.scan_with(self.grype.as_ref(), &image.image).await;
        let trivy = self.scan_with(self.trivy.as_ref(), &image.image).await;

        Some(ImageReport {
            architectures: inspection
                .architectures
                .into_iter()
                .map(|(arch, bytes)| (arch, ArchSize::from_bytes(bytes)))
                .collect(),
            grype,
            trivy,
            detected_version: inspection.detected_version,
        })
    }

    async fn scan_with(&self, scanner: &dyn VulnerabilityScanner, image: &str) -> SeverityCounts {
        tracing::info!("Running {} scan for image '{}'...", scanner.name(), image);

        match scanner.scan(image).await {
            Ok(counts) => {
                tracing::debug!("{} found {} vulnerabilities in {}", scanner.name(), counts.total(), image);
                counts
            }
            Err(e) => {
                tracing::warn!("{} scan failed for {}: {}", scanner.name(), image, e);
                SeverityCounts::default()
            }
        }
    }
}
