//! Markdown and JSON summaries.
//!
//! This module renders the outcome of a dashboard run (task metadata, the
//! submitted filters and the aggregated counts) as a Markdown document or
//! as pretty-printed JSON.

use crate::analysis::UNKNOWN_LABEL;
use crate::models::{FilterSpec, ViewFilter};
use crate::view::{DashboardView, Screen};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Facts about the run that produced a summary.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    /// Backend base URL.
    pub server: String,
    /// Task the records came from, if one was created.
    pub task_id: Option<String>,
    pub generated_at: DateTime<Utc>,
    /// Filters submitted with the task.
    pub filters: Vec<FilterSpec>,
    pub duration_seconds: f64,
}

/// A complete summary document.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    pub metadata: ReportMetadata,
    /// `idle`, `polling`, `completed` or `failed`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<DashboardView>,
}

impl SummaryReport {
    /// Summarize what `screen` shows.
    pub fn new(metadata: ReportMetadata, screen: &Screen) -> Self {
        let (status, error, view) = match screen {
            Screen::Idle => ("idle", None, None),
            Screen::Waiting { .. } => ("polling", None, None),
            Screen::Failed { error, .. } => ("failed", Some(error.clone()), None),
            Screen::Dashboard(view) => ("completed", None, Some(view.clone())),
        };

        Self {
            metadata,
            status: status.to_string(),
            error,
            view,
        }
    }
}

/// Generate a Markdown summary.
pub fn generate_markdown_summary(report: &SummaryReport) -> String {
    let mut output = String::new();

    output.push_str("# TaskDash Summary\n\n");
    output.push_str(&generate_metadata_section(report));
    output.push_str(&generate_filters_section(&report.metadata.filters));

    match report.view {
        Some(ref view) => {
            output.push_str(&generate_view_filter_section(&view.filter));
            output.push_str(&generate_counts_section(view));
        }
        None => {
            output.push_str("## Results\n\n");
            match report.error {
                Some(ref error) => output.push_str(&format!("No records: {}\n\n", error)),
                None => output.push_str("No records were received.\n\n"),
            }
        }
    }

    output.push_str(&generate_footer());
    output
}

fn generate_metadata_section(report: &SummaryReport) -> String {
    let metadata = &report.metadata;
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Server:** {}\n", metadata.server));
    if let Some(ref task_id) = metadata.task_id {
        section.push_str(&format!("- **Task:** `{}`\n", task_id));
    }
    section.push_str(&format!("- **Status:** {}\n", report.status));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    if let Some(ref view) = report.view {
        section.push_str(&format!(
            "- **Records:** {} of {} shown\n",
            view.filtered_records, view.total_records
        ));
    }
    section.push('\n');

    section
}

fn generate_filters_section(filters: &[FilterSpec]) -> String {
    let mut section = String::new();

    section.push_str("## Task Filters\n\n");
    if filters.is_empty() {
        section.push_str("No filters were submitted.\n\n");
        return section;
    }

    section.push_str("| Field | Operator | Value | Source |\n");
    section.push_str("|:---|:---:|:---|:---:|\n");
    for filter in filters {
        let source = filter
            .source
            .map(|s| s.to_string())
            .unwrap_or_else(|| "any".to_string());
        section.push_str(&format!(
            "| {} | `{}` | {} | {} |\n",
            filter.field,
            filter.operator,
            escape_cell(&filter.value),
            source
        ));
    }
    section.push('\n');

    section
}

fn generate_view_filter_section(filter: &ViewFilter) -> String {
    if filter.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## View Filters\n\n");
    if let Some(ref year) = filter.year {
        section.push_str(&format!("- **Year:** {}\n", year));
    }
    if let Some(ref value) = filter.field_value {
        section.push_str(&format!("- **Value:** {}\n", value));
    }
    if let Some(ref start) = filter.start_date {
        section.push_str(&format!("- **From:** {}\n", start));
    }
    if let Some(ref end) = filter.end_date {
        section.push_str(&format!("- **To:** {}\n", end));
    }
    section.push('\n');

    section
}

fn generate_counts_section(view: &DashboardView) -> String {
    let mut section = String::new();

    let field = view.group_field.as_deref().unwrap_or("group");
    section.push_str(&format!("## Records by {}\n\n", field));
    if view.by_field.is_empty() {
        section.push_str("No records to display.\n\n");
    } else {
        section.push_str(&format!("| {} | Records |\n", escape_cell(field)));
        section.push_str("|:---|:---:|\n");
        for bucket in &view.by_field {
            let label = if bucket.label == UNKNOWN_LABEL {
                "*Unknown*".to_string()
            } else {
                escape_cell(&bucket.label)
            };
            section.push_str(&format!("| {} | {} |\n", label, bucket.count));
        }
        section.push('\n');
    }

    section.push_str("## Records by Year\n\n");
    if view.by_year.is_empty() {
        section.push_str("No dated records to display.\n\n");
    } else {
        section.push_str("| Year | Records |\n");
        section.push_str("|:---|:---:|\n");
        for bucket in &view.by_year {
            section.push_str(&format!("| {} | {} |\n", bucket.year, bucket.count));
        }
        section.push('\n');
    }

    section
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

fn generate_footer() -> String {
    "---\n\n*Summary generated by TaskDash*\n".to_string()
}

/// Generate a JSON summary.
pub fn generate_json_summary(report: &SummaryReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
