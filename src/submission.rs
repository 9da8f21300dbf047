//! Building and submitting filter tasks.
//!
//! Drafts are entered as `field=value` (optionally `field=value@A`), the
//! operator is picked from the shape of the value, and the finished list
//! is posted to the backend as one task.

use crate::analysis::schema::contains_iso_date;
use crate::client::{ApiError, TaskApi};
use crate::models::{FilterSpec, Operator, Source};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

/// Invalid user input for a filter entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterInputError {
    #[error("filter field must not be empty")]
    EmptyField,

    #[error("filter value must not be empty")]
    EmptyValue,

    #[error("expected FIELD=VALUE[@A|@B], got '{0}'")]
    Malformed(String),

    #[error("no filter at index {index} (have {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Rough shape of a filter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Number,
    Date,
    Text,
}

/// Classify a single value: numeric first, then ISO date, else text.
pub fn detect_value_kind(sample: &str) -> ValueKind {
    let sample = sample.trim();
    if !sample.is_empty() && sample.parse::<f64>().map_or(false, f64::is_finite) {
        ValueKind::Number
    } else if contains_iso_date(sample) {
        ValueKind::Date
    } else {
        ValueKind::Text
    }
}

/// Pick the operator for a raw value.
///
/// Numbers and dates always use `between`; everything else is a
/// membership list.
pub fn choose_operator(value: &str) -> Operator {
    let first = value.split(',').next().unwrap_or_default();
    match detect_value_kind(first) {
        ValueKind::Number | ValueKind::Date => Operator::Between,
        ValueKind::Text => Operator::In,
    }
}

/// Rewrite a number or date value as a `low,high` pair.
///
/// A single value becomes the range `v,v`. More than two values collapse
/// to their smallest and largest.
fn range_value(value: &str) -> String {
    let parts: Vec<&str> = value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();

    let (low, high) = match parts.as_slice() {
        [] => return value.to_string(),
        [single] => (*single, *single),
        [low, high] => (*low, *high),
        many => match detect_value_kind(many[0]) {
            ValueKind::Number => {
                let numbers: Vec<(f64, &str)> = many
                    .iter()
                    .filter_map(|part| part.parse::<f64>().ok().map(|n| (n, *part)))
                    .collect();
                let low = numbers.iter().min_by(|a, b| a.0.total_cmp(&b.0));
                let high = numbers.iter().max_by(|a, b| a.0.total_cmp(&b.0));
                match (low, high) {
                    (Some(low), Some(high)) => (low.1, high.1),
                    _ => return value.to_string(),
                }
            }
            _ => match (many.iter().min(), many.iter().max()) {
                (Some(low), Some(high)) => (*low, *high),
                _ => return value.to_string(),
            },
        },
    };

    format!("{},{}", low, high)
}

/// A filter entry before operator selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterDraft {
    pub field: String,
    pub value: String,
    pub source: Option<Source>,
}

impl FilterDraft {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            source: None,
        }
    }

    /// Validate and turn the draft into a filter clause.
    pub fn into_spec(self) -> Result<FilterSpec, FilterInputError> {
        let field = self.field.trim().to_string();
        let value = self.value.trim().to_string();
        if field.is_empty() {
            return Err(FilterInputError::EmptyField);
        }
        if value.is_empty() {
            return Err(FilterInputError::EmptyValue);
        }

        let operator = choose_operator(&value);
        let value = match operator {
            Operator::Between => range_value(&value),
            _ => value,
        };

        Ok(FilterSpec {
            operator,
            field,
            value,
            source: self.source,
        })
    }
}

impl From<&FilterSpec> for FilterDraft {
    fn from(spec: &FilterSpec) -> Self {
        Self {
            field: spec.field.clone(),
            value: spec.value.clone(),
            source: spec.source,
        }
    }
}

impl FromStr for FilterDraft {
    type Err = FilterInputError;

    /// Parse `field=value`, with an optional `@A` / `@B` source suffix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, rest) = s
            .split_once('=')
            .ok_or_else(|| FilterInputError::Malformed(s.to_string()))?;

        let (value, source) = match rest.rsplit_once('@') {
            Some((value, suffix)) => match suffix.parse::<Source>() {
                Ok(source) => (value, Some(source)),
                Err(_) => (rest, None),
            },
            None => (rest, None),
        };

        Ok(Self {
            field: field.trim().to_string(),
            value: value.trim().to_string(),
            source,
        })
    }
}

/// Indexed edit of an existing filter: `INDEX:FIELD=VALUE[@SRC]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterEdit {
    pub index: usize,
    pub draft: FilterDraft,
}

impl FromStr for FilterEdit {
    type Err = FilterInputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (index, draft) = s
            .split_once(':')
            .ok_or_else(|| FilterInputError::Malformed(s.to_string()))?;
        let index = index
            .trim()
            .parse::<usize>()
            .map_err(|_| FilterInputError::Malformed(s.to_string()))?;

        Ok(Self {
            index,
            draft: draft.parse()?,
        })
    }
}

/// Filters collected for the next task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterList {
    filters: Vec<FilterSpec>,
}

impl FilterList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `draft` and append it.
    pub fn add(&mut self, draft: FilterDraft) -> Result<&FilterSpec, FilterInputError> {
        let spec = draft.into_spec()?;
        debug!("Adding filter: {}", spec);
        self.filters.push(spec);
        Ok(&self.filters[self.filters.len() - 1])
    }

    /// The draft behind entry `index`, for editing.
    pub fn edit(&self, index: usize) -> Result<FilterDraft, FilterInputError> {
        self.filters
            .get(index)
            .map(FilterDraft::from)
            .ok_or(FilterInputError::IndexOutOfRange {
                index,
                len: self.filters.len(),
            })
    }

    /// Replace entry `index` in place.
    pub fn replace(&mut self, index: usize, draft: FilterDraft) -> Result<&FilterSpec, FilterInputError> {
        let len = self.filters.len();
        if index >= len {
            return Err(FilterInputError::IndexOutOfRange { index, len });
        }
        let spec = draft.into_spec()?;
        debug!("Replacing filter {}: {}", index, spec);
        self.filters[index] = spec;
        Ok(&self.filters[index])
    }

    /// Apply an indexed edit, keeping fields the edit leaves blank.
    pub fn apply_edit(&mut self, edit: FilterEdit) -> Result<&FilterSpec, FilterInputError> {
        let mut draft = self.edit(edit.index)?;
        if !edit.draft.field.is_empty() {
            draft.field = edit.draft.field;
        }
        if !edit.draft.value.is_empty() {
            draft.value = edit.draft.value;
        }
        if edit.draft.source.is_some() {
            draft.source = edit.draft.source;
        }
        self.replace(edit.index, draft)
    }

    pub fn as_slice(&self) -> &[FilterSpec] {
        &self.filters
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

/// Post `filters` as a new task and return its id.
pub async fn submit<A: TaskApi + ?Sized>(api: &A, filters: FilterList) -> Result<String, ApiError> {
    info!("Submitting task with {} filters", filters.len());
    let task_id = api.create_task(filters.as_slice()).await?;
    info!("Created task {}", task_id);
    Ok(task_id)
}

/// Field names the backend offers across both sources.
pub async fn available_fields<A: TaskApi + ?Sized>(api: &A) -> Result<Vec<String>, ApiError> {
    let fields = api.fetch_fields().await?;
    Ok(fields.merged())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::stub::ScriptedApi;

    #[test]
    fn test_detect_value_kind() {
        assert_eq!(detect_value_kind("42"), ValueKind::Number);
        assert_eq!(detect_value_kind(" 3.5 "), ValueKind::Number);
        assert_eq!(detect_value_kind("2021-05-01"), ValueKind::Date);
        assert_eq!(detect_value_kind("Oslo"), ValueKind::Text);
        assert_eq!(detect_value_kind("NaN"), ValueKind::Text);
        assert_eq!(detect_value_kind(""), ValueKind::Text);
    }

    #[test]
    fn test_choose_operator() {
        assert_eq!(choose_operator("10,20"), Operator::Between);
        assert_eq!(choose_operator("2021-01-01,2021-12-31"), Operator::Between);
        assert_eq!(choose_operator("42"), Operator::Between);
        assert_eq!(choose_operator("2021-01-01"), Operator::Between);
        assert_eq!(choose_operator("1,2,3"), Operator::Between);
        assert_eq!(choose_operator("Oslo,Bergen"), Operator::In);
        assert_eq!(choose_operator("Oslo"), Operator::In);
    }

    #[test]
    fn test_range_values_have_two_endpoints() {
        let spec = FilterDraft::new("price", "42").into_spec().unwrap();
        assert_eq!(spec.operator, Operator::Between);
        assert_eq!(spec.value, "42,42");

        let spec = FilterDraft::new("date", "2021-01-01").into_spec().unwrap();
        assert_eq!(spec.value, "2021-01-01,2021-01-01");

        let spec = FilterDraft::new("price", " 10 , 20 ").into_spec().unwrap();
        assert_eq!(spec.value, "10,20");

        let spec = FilterDraft::new("price", "7,-3,12.5,x").into_spec().unwrap();
        assert_eq!(spec.value, "-3,12.5");

        let spec = FilterDraft::new("date", "2022-03-01,2021-01-01,2021-06-30")
            .into_spec()
            .unwrap();
        assert_eq!(spec.value, "2021-01-01,2022-03-01");

        let spec = FilterDraft::new("location", "Oslo").into_spec().unwrap();
        assert_eq!(spec.operator, Operator::In);
        assert_eq!(spec.value, "Oslo");
    }

    #[test]
    fn test_add_requires_field_and_value() {
        let mut list = FilterList::new();
        assert_eq!(
            list.add(FilterDraft::new("", "x")),
            Err(FilterInputError::EmptyField)
        );
        assert_eq!(
            list.add(FilterDraft::new("location", "  ")),
            Err(FilterInputError::EmptyValue)
        );
        assert!(list.is_empty());

        let spec = list.add(FilterDraft::new("price", "10,20")).unwrap();
        assert_eq!(spec.operator, Operator::Between);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_edit_and_replace_in_place() {
        let mut list = FilterList::new();
        list.add(FilterDraft::new("location", "Oslo")).unwrap();
        list.add(FilterDraft {
            source: Some(Source::B),
            ..FilterDraft::new("price", "10,20")
        })
        .unwrap();

        let mut draft = list.edit(1).unwrap();
        assert_eq!(draft.source, Some(Source::B));
        draft.value = "15".to_string();
        list.replace(1, draft).unwrap();

        assert_eq!(list.len(), 2);
        assert_eq!(list.as_slice()[1].value, "15,15");
        assert_eq!(list.as_slice()[1].operator, Operator::Between);
        assert_eq!(list.as_slice()[0].field, "location");

        assert_eq!(
            list.edit(5),
            Err(FilterInputError::IndexOutOfRange { index: 5, len: 2 })
        );
        assert!(list.replace(2, FilterDraft::new("a", "b")).is_err());
    }

    #[test]
    fn test_parse_draft() {
        let draft: FilterDraft = "location=Oslo,Bergen".parse().unwrap();
        assert_eq!(draft, FilterDraft::new("location", "Oslo,Bergen"));

        let draft: FilterDraft = "date=2021-01-01,2021-06-30@a".parse().unwrap();
        assert_eq!(draft.source, Some(Source::A));
        assert_eq!(draft.value, "2021-01-01,2021-06-30");

        let draft: FilterDraft = "contact=ops@example.org".parse().unwrap();
        assert_eq!(draft.value, "ops@example.org");
        assert_eq!(draft.source, None);

        assert!("no-equals".parse::<FilterDraft>().is_err());
    }

    #[test]
    fn test_apply_edit_keeps_blank_parts() {
        let mut list = FilterList::new();
        list.add(FilterDraft::new("location", "Oslo")).unwrap();

        let edit: FilterEdit = "0:=Bergen@B".parse().unwrap();
        list.apply_edit(edit).unwrap();

        let spec = &list.as_slice()[0];
        assert_eq!(spec.field, "location");
        assert_eq!(spec.value, "Bergen");
        assert_eq!(spec.source, Some(Source::B));

        assert!("x:location=Oslo".parse::<FilterEdit>().is_err());
    }

    #[tokio::test]
    async fn test_submit_posts_current_list() {
        let api = ScriptedApi::with_statuses(&[], vec![]);
        let mut list = FilterList::new();
        list.add(FilterDraft::new("location", "Oslo")).unwrap();

        let task_id = submit(&api, list).await.unwrap();

        assert_eq!(task_id, "task-1");
        let submitted = api.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0][0].operator, Operator::In);
    }

    #[tokio::test]
    async fn test_available_fields_are_merged() {
        let api = ScriptedApi::with_statuses(&[], vec![]);
        let fields = available_fields(&api).await.unwrap();
        assert_eq!(fields, vec!["name", "date", "location"]);
        assert_eq!(api.calls(), vec!["fields"]);
    }
}
