//! Output generation.
//!
//! This module renders a computed dashboard as SVG charts or as a
//! Markdown/JSON summary.

pub mod chart;
pub mod summary;

pub use chart::export_screen;
pub use summary::{generate_json_summary, generate_markdown_summary, ReportMetadata, SummaryReport};
