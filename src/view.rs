//! Application state and the record → chart pipeline.
//!
//! State changes only through [`AppState::apply`]. Everything rendered is
//! derived from the current state by [`screen_for`] and [`build_view`],
//! which are pure and recomputed from scratch on every call.

use crate::analysis::{self, apply_filters, FilterContext, Schema};
use crate::models::{Bucket, FieldDescriptor, Record, Task, TaskStatus, ViewFilter, YearBucket};
use serde::Serialize;
use tracing::{debug, warn};

/// Records of a completed task together with their inferred schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    records: Vec<Record>,
    schema: Schema,
}

impl Dataset {
    pub fn new(records: Vec<Record>) -> Self {
        let schema = Schema::infer(&records);
        Self { records, schema }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

/// Lifecycle of one dashboard session.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum AppState {
    /// Nothing submitted yet.
    #[default]
    Idle,
    /// Waiting for the backend to finish `task`.
    Polling { task: Task, attempts: u32 },
    /// Records received.
    Completed { task_id: String, dataset: Dataset },
    /// Polling ended without records.
    Failed { task_id: String, error: String },
}

/// Inputs that move the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// A task was created.
    Submitted(String),
    /// A status check answered.
    StatusObserved { attempt: u32, status: TaskStatus },
    /// The task's records arrived.
    Finished(Vec<Record>),
    /// Polling failed or was cancelled.
    Errored(String),
}

impl AppEvent {
    fn name(&self) -> &'static str {
        match self {
            AppEvent::Submitted(_) => "submitted",
            AppEvent::StatusObserved { .. } => "status",
            AppEvent::Finished(_) => "finished",
            AppEvent::Errored(_) => "errored",
        }
    }
}

impl AppState {
    /// Transition on `event`. Events that make no sense in the current
    /// state are ignored.
    pub fn apply(self, event: AppEvent) -> AppState {
        match (self, event) {
            (_, AppEvent::Submitted(task_id)) => AppState::Polling {
                task: Task::pending(task_id),
                attempts: 0,
            },
            (AppState::Polling { task, .. }, AppEvent::StatusObserved { attempt, status }) => {
                AppState::Polling {
                    task: Task {
                        id: task.id,
                        status,
                    },
                    attempts: attempt,
                }
            }
            (AppState::Polling { task, .. }, AppEvent::Finished(records)) => {
                debug!("Task {} finished with {} records", task.id, records.len());
                AppState::Completed {
                    task_id: task.id,
                    dataset: Dataset::new(records),
                }
            }
            (AppState::Polling { task, .. }, AppEvent::Errored(error)) => AppState::Failed {
                task_id: task.id,
                error,
            },
            (state, event) => {
                warn!("Ignoring '{}' event in {} state", event.name(), state.label());
                state
            }
        }
    }

    /// Short name of the state, for logs.
    pub fn label(&self) -> &'static str {
        match self {
            AppState::Idle => "idle",
            AppState::Polling { .. } => "polling",
            AppState::Completed { .. } => "completed",
            AppState::Failed { .. } => "failed",
        }
    }
}

/// User choices applied on top of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewSelection {
    /// Field to group the bar chart by; defaults to the first groupable field.
    pub group_field: Option<String>,
    pub filter: ViewFilter,
}

/// Everything the chart and summary writers need.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardView {
    pub group_field: Option<String>,
    pub date_field: Option<String>,
    pub fields: Vec<FieldDescriptor>,
    pub filter: ViewFilter,
    pub total_records: usize,
    pub filtered_records: usize,
    pub by_field: Vec<Bucket>,
    pub by_year: Vec<YearBucket>,
    /// Years present in the unfiltered records.
    pub years: Vec<String>,
    /// String values of the group field in the unfiltered records.
    pub values: Vec<String>,
}

impl DashboardView {
    /// Nothing to chart.
    pub fn is_empty(&self) -> bool {
        self.by_field.is_empty() && self.by_year.is_empty()
    }
}

/// Filter and aggregate `dataset` according to `selection`.
pub fn build_view(dataset: &Dataset, selection: &ViewSelection) -> DashboardView {
    let schema = dataset.schema();
    let records = dataset.records();

    let group_field = resolve_group_field(schema, selection.group_field.as_deref());
    let date_field = schema.date_field();
    if date_field.is_none() && selection.filter.uses_dates() {
        warn!("Records have no date field, date filters match nothing");
    }

    let ctx = FilterContext {
        group_field: group_field.as_deref(),
        date_field,
    };
    let filtered = apply_filters(records, &selection.filter, &ctx);

    let by_field = group_field
        .as_deref()
        .map(|field| analysis::group_by_field(&filtered, field))
        .unwrap_or_default();
    let by_year = date_field
        .map(|field| analysis::group_by_year(&filtered, field))
        .unwrap_or_default();
    let years = date_field
        .map(|field| analysis::unique_years(records, field))
        .unwrap_or_default();
    let values = group_field
        .as_deref()
        .map(|field| analysis::unique_values(records, field))
        .unwrap_or_default();

    debug!(
        "Built view: {} of {} records, {} field buckets, {} year buckets",
        filtered.len(),
        records.len(),
        by_field.len(),
        by_year.len()
    );

    DashboardView {
        group_field,
        date_field: date_field.map(String::from),
        fields: schema.fields().to_vec(),
        filter: selection.filter.clone(),
        total_records: records.len(),
        filtered_records: filtered.len(),
        by_field,
        by_year,
        years,
        values,
    }
}

fn resolve_group_field(schema: &Schema, requested: Option<&str>) -> Option<String> {
    match requested {
        Some(field) if schema.contains(field) || schema.fields().is_empty() => {
            Some(field.to_string())
        }
        Some(field) => {
            warn!("Group field '{}' not present in records, using default", field);
            schema.groupable_fields().first().cloned()
        }
        None => schema.groupable_fields().first().cloned(),
    }
}

/// What to show for a given state.
#[derive(Debug, Clone, PartialEq)]
pub enum Screen {
    Idle,
    Waiting {
        task_id: String,
        attempts: u32,
        status: TaskStatus,
    },
    Failed {
        task_id: String,
        error: String,
    },
    Dashboard(DashboardView),
}

/// Derive the screen for `state`.
pub fn screen_for(state: &AppState, selection: &ViewSelection) -> Screen {
    match state {
        AppState::Idle => Screen::Idle,
        AppState::Polling { task, attempts } => Screen::Waiting {
            task_id: task.id.clone(),
            attempts: *attempts,
            status: task.status,
        },
        AppState::Failed { task_id, error } => Screen::Failed {
            task_id: task_id.clone(),
            error: error.clone(),
        },
        AppState::Completed { dataset, .. } => Screen::Dashboard(build_view(dataset, selection)),
    }
}
