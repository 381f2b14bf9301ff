use crate::comparer::{AppStatus, RunSummary};
use crate::model::{SeverityCounts, TrackedApp};
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "App")]
    app: String,
    #[tabled(rename = "Upstream")]
    upstream: String,
    #[tabled(rename = "Variant")]
    variant: String,
    #[tabled(rename = "Detected")]
    detected: String,
    #[tabled(rename = "Size (MB)")]
    sizes: String,
    #[tabled(rename = "Grype C/H/M/L")]
    grype: String,
    #[tabled(rename = "Trivy C/H/M/L")]
    trivy: String,
}

#[derive(Tabled)]
struct SkippedRow {
    #[tabled(rename = "App")]
    app: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

#[derive(Tabled)]
struct AppRow {
    #[tabled(rename = "App")]
    app: String,
    #[tabled(rename = "Variant")]
    variant: String,
    #[tabled(rename = "Image")]
    image: String,
    #[tabled(rename = "Detection")]
    detection: String,
}

/// Renders the end-of-run summary.
pub fn summary_table(summary: &RunSummary) -> String {
    let mut rows = Vec::new();
    let mut skipped = Vec::new();

    for outcome in &summary.outcomes {
        match (&outcome.status, &outcome.report) {
            (AppStatus::Written(_), Some(report)) => {
                if report.images.is_empty() {
                    rows.push(ResultRow {
                        app: outcome.name.clone(),
                        upstream: report.upstream.version.clone(),
                        variant: "-".to_string(),
                        detected: "-".to_string(),
                        sizes: "-".to_string(),
                        grype: "-".to_string(),
                        trivy: "-".to_string(),
                    });
                }

                for (variant, image) in &report.images {
                    let sizes = image
                        .architectures
                        .iter()
                        .map(|(arch, size)| format!("{}={}", arch, size.size_mb))
                        .collect::<Vec<_>>();

                    rows.push(ResultRow {
                        app: outcome.name.clone(),
                        upstream: report.upstream.version.clone(),
                        variant: variant.to_string(),
                        detected: image.detected_version.clone().unwrap_or_else(|| "-".to_string()),
                        sizes: if sizes.is_empty() {
                            "-".to_string()
                        } else {
                            sizes.join(" ")
                        },
                        grype: format_counts(&image.grype),
                        trivy: format_counts(&image.trivy),
                    });
                }
            }
            (AppStatus::Skipped(reason), _) => skipped.push(SkippedRow {
                app: outcome.name.clone(),
                reason: truncate(reason, 80),
            }),
            (AppStatus::Written(_), None) => {}
        }
    }

    let mut out = String::new();
    if rows.is_empty() {
        out.push_str("No reports written.\n");
    } else {
        out.push_str(&Table::new(rows).with(Style::rounded()).to_string());
        out.push('\n');
    }

    if !skipped.is_empty() {
        out.push('\n');
        out.push_str(&format!("Skipped {} app(s):\n", skipped.len()));
        out.push_str(&Table::new(skipped).with(Style::rounded()).to_string());
        out.push('\n');
    }

    out
}

pub fn print_summary_table(summary: &RunSummary) {
    println!();
    print!("{}", summary_table(summary));
}

/// Lists tracked applications and their configured variants.
pub fn print_apps_table(apps: &[TrackedApp]) {
    let mut rows = Vec::new();

    for app in apps {
        if app.variants.is_empty() {
            rows.push(AppRow {
                app: app.name.clone(),
                variant: "-".to_string(),
                image: "-".to_string(),
                detection: "-".to_string(),
            });
        }

        for image in &app.variants {
            rows.push(AppRow {
                app: app.name.clone(),
                variant: image.variant.to_string(),
                image: truncate(&image.image, 60),
                detection: image
                    .detection
                    .as_ref()
                    .map(|d| d.command.join(" "))
                    .unwrap_or_else(|| "-".to_string()),
            });
        }
    }

    if rows.is_empty() {
        println!("No apps configured.");
        return;
    }

    println!("{}", Table::new(rows).with(Style::rounded()).to_string());
}

fn format_counts(counts: &SeverityCounts) -> String {
    format!(
        "{}/{}/{}/{}",
        counts.critical, counts.high, counts.medium, counts.low
    )
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
