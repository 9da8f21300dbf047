//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::submission::{FilterDraft, FilterEdit};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// TaskDash - charts for backend filter tasks
///
/// Submit a filter task to the backend, wait for it to finish and export
/// the returned records as a bar chart (records per group value) and a
/// line chart (records per year).
///
/// Examples:
///   taskdash --filter location=Oslo,Bergen --filter date=2021-01-01,2021-12-31@A
///   taskdash --task 8f14e45f --group-field location --year 2021
///   taskdash --filter price=10,20 --format markdown --output summary.md
///   taskdash --list-fields
///   taskdash --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Base URL of the task backend
    ///
    /// Can also be set via TASKDASH_SERVER env var or .taskdash.toml config.
    #[arg(short, long, value_name = "URL", env = "TASKDASH_SERVER")]
    pub server: Option<String>,

    /// Filter clause for the new task (repeatable)
    ///
    /// Syntax: FIELD=VALUE[@A|@B]. Comma-separated text becomes a list,
    /// numbers and dates become a range (a single value is the range v,v).
    #[arg(short, long = "filter", value_name = "FIELD=VALUE")]
    pub filters: Vec<FilterDraft>,

    /// Edit a filter given earlier with --filter (repeatable)
    ///
    /// Syntax: INDEX:FIELD=VALUE[@A|@B]. Blank parts keep their old value,
    /// e.g. "1:=2022-01-01,2022-12-31".
    #[arg(long = "edit-filter", value_name = "INDEX:FIELD=VALUE")]
    pub edits: Vec<FilterEdit>,

    /// Poll an existing task instead of submitting a new one
    #[arg(short, long, value_name = "ID", conflicts_with_all = ["filters", "edits"])]
    pub task: Option<String>,

    /// List the fields offered by the backend and exit
    #[arg(long)]
    pub list_fields: bool,

    /// Field to group the bar chart by
    ///
    /// Defaults to the first text or numeric field of the records.
    #[arg(short, long, value_name = "FIELD")]
    pub group_field: Option<String>,

    /// Only chart records from this year
    #[arg(long, value_name = "YYYY")]
    pub year: Option<String>,

    /// Only chart records whose group field has this value
    #[arg(long, value_name = "VALUE")]
    pub field_value: Option<String>,

    /// Only chart records dated on or after this day
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub start_date: Option<String>,

    /// Only chart records dated on or before this day
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub end_date: Option<String>,

    /// Output file path
    ///
    /// Default: from config or charts.svg.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (svg, markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Delay between status checks in milliseconds
    #[arg(long, value_name = "MS")]
    pub poll_interval_ms: Option<u64>,

    /// Maximum number of status checks (0 = unbounded)
    #[arg(long, value_name = "COUNT")]
    pub max_attempts: Option<u32>,

    /// Give up polling after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Timeout for a single HTTP request in seconds
    #[arg(long, value_name = "SECS")]
    pub request_timeout: Option<u64>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .taskdash.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .taskdash.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the export.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Combined bar and line chart (default)
    #[default]
    Svg,
    /// Markdown summary
    Markdown,
    /// JSON summary
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(ref server) = self.server {
            if !server.starts_with("http://") && !server.starts_with("https://") {
                return Err("Server URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(ref year) = self.year {
            if year.len() != 4 || !year.chars().all(|c| c.is_ascii_digit()) {
                return Err(format!("Year must have four digits, got '{}'", year));
            }
        }

        for (flag, value) in [
            ("--start-date", &self.start_date),
            ("--end-date", &self.end_date),
        ] {
            if let Some(date) = value {
                if chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
                    return Err(format!("{} must be a YYYY-MM-DD date, got '{}'", flag, date));
                }
            }
        }

        if let (Some(start), Some(end)) = (&self.start_date, &self.end_date) {
            if start > end {
                return Err("--start-date must not be after --end-date".to_string());
            }
        }

        for edit in &self.edits {
            if edit.index >= self.filters.len() {
                return Err(format!(
                    "--edit-filter index {} is out of range ({} filters given)",
                    edit.index,
                    self.filters.len()
                ));
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.poll_interval_ms == Some(0) {
            return Err("Poll interval must be at least 1 ms".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if self.request_timeout == Some(0) {
            return Err("Request timeout must be at least 1 second".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
