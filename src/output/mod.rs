mod cli;
mod json;

pub use cli::{print_apps_table, print_summary_table};
pub use json::ReportWriter;
