//! Vulnerability scanner adapters.
//!
//! Each adapter runs an external scanner against an image reference and
//! reduces its JSON report to [`SeverityCounts`].
//!
//! | Scanner | Command |
//! |---------|---------|
//! | [`TrivyScanner`] | `trivy image --quiet --severity CRITICAL,HIGH,MEDIUM,LOW --format json <ref>` |
//! | [`GrypeScanner`] | `grype <ref> -o json` |

mod grype;
mod trivy;

pub use grype::{parse_grype_report, GrypeScanner};
pub use trivy::{parse_trivy_report, TrivyScanner};

use crate::error::ScanError;
use crate::model::SeverityCounts;
use async_trait::async_trait;

#[async_trait]
pub trait VulnerabilityScanner: Send + Sync {
    /// Key this scanner's counts are reported under.
    fn name(&self) -> &'static str;

    /// Scans `image` and counts findings per severity bucket.
    async fn scan(&self, image: &str) -> Result<SeverityCounts, ScanError>;
}
