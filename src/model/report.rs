use super::Variant;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The four severity buckets counted per scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// Parses a scanner severity label, ignoring case.
    ///
    /// Labels outside the four buckets (`Unknown`, `Negligible`, ...) yield `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "critical" => Some(Severity::Critical),
            "high" => Some(Severity::High),
            "medium" => Some(Severity::Medium),
            "low" => Some(Severity::Low),
            _ => None,
        }
    }
}

/// Occurrence counts per severity bucket.
///
/// Serialized with decimal-string values, e.g. `{"critical": "2", ...}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    #[serde(with = "decimal_string")]
    pub critical: u64,
    #[serde(with = "decimal_string")]
    pub high: u64,
    #[serde(with = "decimal_string")]
    pub medium: u64,
    #[serde(with = "decimal_string")]
    pub low: u64,
}

impl SeverityCounts {
    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }

    /// Counts every recognised label; unknown labels are skipped.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut counts = Self::default();
        for label in labels {
            if let Some(severity) = Severity::from_label(label.as_ref()) {
                counts.record(severity);
            }
        }
        counts
    }

    pub fn total(&self) -> u64 {
        self.critical + self.high + self.medium + self.low
    }
}

/// Footprint of one platform image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchSize {
    pub size_mb: String,
}

impl ArchSize {
    pub fn from_bytes(bytes: u64) -> Self {
        Self {
            size_mb: format_size_mb(bytes),
        }
    }
}

/// Formats a byte count as mebibytes with two decimals.
pub fn format_size_mb(bytes: u64) -> String {
    format!("{:.2}", bytes as f64 / 1024.0 / 1024.0)
}

/// Results for one image variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageReport {
    /// Keyed by platform architecture (`amd64`, `arm64`, ...).
    #[serde(flatten)]
    pub architectures: BTreeMap<String, ArchSize>,
    pub grype: SeverityCounts,
    pub trivy: SeverityCounts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upstream {
    pub version: String,
}

/// The document written for one application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppReport {
    pub upstream: Upstream,
    pub images: BTreeMap<Variant, ImageReport>,
}

impl AppReport {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            upstream: Upstream {
                version: version.into(),
            },
            images: BTreeMap::new(),
        }
    }
}

mod decimal_string {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}
