//! Data models for the dashboard client.
//!
//! This module contains the core data structures shared by the backend
//! client, the filter/aggregation pipeline and the chart writers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A single record returned by a finished task.
///
/// The schema is not fixed; field order follows the backend payload.
pub type Record = serde_json::Map<String, Value>;

/// Comparison operator of a filter clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// Exact match against a single value
    #[serde(rename = "=")]
    Eq,
    /// Membership in a comma-separated list
    #[serde(rename = "in")]
    In,
    /// Inclusive range given as two comma-separated endpoints
    #[serde(rename = "between")]
    Between,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Eq => write!(f, "="),
            Operator::In => write!(f, "in"),
            Operator::Between => write!(f, "between"),
        }
    }
}

/// Backend data source a filter is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    A,
    B,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::A => write!(f, "A"),
            Source::B => write!(f, "B"),
        }
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "A" => Ok(Source::A),
            "B" => Ok(Source::B),
            other => Err(format!("Unknown source '{}', expected A or B", other)),
        }
    }
}

/// One predicate clause sent to the backend with a new task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Field the clause applies to.
    pub field: String,
    /// Comparison operator.
    pub operator: Operator,
    /// Raw value; encoding depends on `operator`.
    pub value: String,
    /// Restrict the clause to one source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
}

impl fmt::Display for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator, self.value)?;
        if let Some(source) = self.source {
            write!(f, " (Source {})", source)?;
        }
        Ok(())
    }
}

/// Status reported by the backend for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    NotFound,
    /// Any status string this client does not know about
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    /// Whether polling should stop after observing this status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::NotFound
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::NotFound => "not_found",
            TaskStatus::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// A server-side task and its last observed status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub status: TaskStatus,
}

impl Task {
    /// A freshly submitted task.
    pub fn pending(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: TaskStatus::Pending,
        }
    }
}

/// Inferred type of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Date,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String => write!(f, "string"),
            FieldType::Number => write!(f, "number"),
            FieldType::Date => write!(f, "date"),
        }
    }
}

/// Name and inferred type of a record field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// Count of records sharing a grouping label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub label: String,
    pub count: usize,
}

/// Count of records falling in one calendar year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearBucket {
    pub year: String,
    pub count: usize,
}

/// Client-side filter applied to the records of a finished task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewFilter {
    /// Four-digit year the date field must start with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    /// Exact value the group field must carry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_value: Option<String>,
    /// Inclusive lower date bound (`YYYY-MM-DD`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    /// Inclusive upper date bound (`YYYY-MM-DD`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

impl ViewFilter {
    /// Returns true when no predicate is set.
    pub fn is_empty(&self) -> bool {
        self.year.is_none()
            && self.field_value.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
    }

    /// Whether any predicate depends on the date field.
    pub fn uses_dates(&self) -> bool {
        self.year.is_some() || self.start_date.is_some() || self.end_date.is_some()
    }
}

/// Render a record value as a grouping label.
///
/// Null and empty strings have no label.
pub fn value_label(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(number_label(n)),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// `40.0` and `40` share the label `"40"`.
fn number_label(n: &serde_json::Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 => {
            format!("{}", f as i64)
        }
        _ => n.to_string(),
    }
}
