//! Core data types for tracked applications and their reports.
//!
//! - [`TrackedApp`] - A validated application from the apps file
//! - [`ImageVariant`] - One image distribution of an application
//! - [`SeverityCounts`] - Per-bucket vulnerability counts
//! - [`AppReport`] - The JSON document written per application
//!
//! # Example
//!
//! ```
//! use release_comparer::model::{AppReport, ImageReport, Variant};
//!
//! let mut report = AppReport::new("1.27.3");
//! report.images.insert(Variant::Bitnami, ImageReport::default());
//!
//! let json = serde_json::to_string_pretty(&report).unwrap();
//! assert!(json.contains("\"bitnami\""));
//! ```

mod app;
mod report;

pub use app::*;
pub use report::*;
