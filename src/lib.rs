pub mod checker;
pub mod comparer;
pub mod config;
pub mod error;
pub mod exec;
pub mod inspector;
pub mod model;
pub mod output;
pub mod resolver;

pub use comparer::{Comparer, RunSummary};
pub use config::{Config, FailurePolicy};
pub use model::{AppReport, SeverityCounts, TrackedApp, Variant};
