//! Client-side record filtering.
//!
//! A single predicate set drives every view: the chart pipeline and the
//! summary listing both go through [`apply_filters`].

use crate::analysis::schema::parse_date;
use crate::models::{value_label, Record, ViewFilter};
use chrono::NaiveDate;
use serde_json::Value;
use tracing::{debug, warn};

/// Fields the filter predicates are evaluated against.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterContext<'a> {
    /// Active group field, matched by `field_value`.
    pub group_field: Option<&'a str>,
    /// Field holding record dates, matched by `year` and the date range.
    pub date_field: Option<&'a str>,
}

/// Inclusive date range, open on absent ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct DateBounds {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl DateBounds {
    fn from_filter(filter: &ViewFilter) -> Self {
        Self {
            start: parse_bound(filter.start_date.as_deref(), "start"),
            end: parse_bound(filter.end_date.as_deref(), "end"),
        }
    }

    fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date <= end)
    }
}

fn parse_bound(raw: Option<&str>, which: &str) -> Option<NaiveDate> {
    let raw = raw?;
    let parsed = parse_date(raw);
    if parsed.is_none() {
        warn!("Ignoring unparseable {} date bound: {}", which, raw);
    }
    parsed
}

/// Keep the records matching every predicate of `filter`.
///
/// Records missing the active group field, or without a parseable date
/// when a date field is known, are dropped.
pub fn apply_filters(records: &[Record], filter: &ViewFilter, ctx: &FilterContext<'_>) -> Vec<Record> {
    let bounds = DateBounds::from_filter(filter);

    let kept: Vec<Record> = records
        .iter()
        .filter(|record| matches_record(record, filter, ctx, &bounds))
        .cloned()
        .collect();

    debug!("Filtered {} records down to {}", records.len(), kept.len());
    kept
}

fn matches_record(
    record: &Record,
    filter: &ViewFilter,
    ctx: &FilterContext<'_>,
    bounds: &DateBounds,
) -> bool {
    let group_value = match ctx.group_field {
        Some(field) => match record.get(field) {
            None | Some(Value::Null) => return false,
            Some(value) => Some(value),
        },
        None => None,
    };

    let raw_date = ctx
        .date_field
        .and_then(|field| record.get(field))
        .and_then(Value::as_str);
    let date = raw_date.and_then(parse_date);
    if ctx.date_field.is_some() && date.is_none() {
        return false;
    }

    if let Some(ref year) = filter.year {
        match raw_date.and_then(|d| d.trim().get(..4)) {
            Some(prefix) if prefix == year => {}
            _ => return false,
        }
    }

    if let Some(ref wanted) = filter.field_value {
        if group_value.and_then(value_label).as_ref() != Some(wanted) {
            return false;
        }
    }

    if bounds.start.is_some() || bounds.end.is_some() {
        match date {
            Some(date) if bounds.contains(date) => {}
            _ => return false,
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records() -> Vec<Record> {
        vec![
            json!({"date": "2021-05-01", "location": "A"}),
            json!({"date": "2022-01-01", "location": "B"}),
            json!({"date": "2021-07-01", "location": "A"}),
            json!({"date": "not a date", "location": "C"}),
            json!({"date": "2023-03-03"}),
        ]
        .into_iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect()
    }

    fn ctx() -> FilterContext<'static> {
        FilterContext {
            group_field: Some("location"),
            date_field: Some("date"),
        }
    }

    fn locations(records: &[Record]) -> Vec<&str> {
        records
            .iter()
            .map(|r| r["location"].as_str().unwrap())
            .collect()
    }

    #[test]
    fn test_empty_filter_drops_only_incomplete_records() {
        let kept = apply_filters(&records(), &ViewFilter::default(), &ctx());
        assert_eq!(locations(&kept), vec!["A", "B", "A"]);
    }

    #[test]
    fn test_without_context_everything_passes() {
        let kept = apply_filters(&records(), &ViewFilter::default(), &FilterContext::default());
        assert_eq!(kept.len(), 5);
    }

    #[test]
    fn test_year_predicate() {
        let filter = ViewFilter {
            year: Some("2021".to_string()),
            ..Default::default()
        };
        let kept = apply_filters(&records(), &filter, &ctx());
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_field_value_uses_active_group_field() {
        let filter = ViewFilter {
            field_value: Some("B".to_string()),
            ..Default::default()
        };
        let kept = apply_filters(&records(), &filter, &ctx());
        assert_eq!(locations(&kept), vec!["B"]);

        // Numbers compare by their label
        let numeric: Vec<Record> = vec![
            json!({"seats": 40, "date": "2021-01-01"}),
            json!({"seats": 40.0, "date": "2021-01-02"}),
        ]
            .into_iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect();
        let filter = ViewFilter {
            field_value: Some("40".to_string()),
            ..Default::default()
        };
        let ctx = FilterContext {
            group_field: Some("seats"),
            date_field: Some("date"),
        };
        assert_eq!(apply_filters(&numeric, &filter, &ctx).len(), 2);
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let filter = ViewFilter {
            start_date: Some("2021-05-01".to_string()),
            end_date: Some("2021-07-01".to_string()),
            ..Default::default()
        };
        let kept = apply_filters(&records(), &filter, &ctx());
        assert_eq!(kept.len(), 2);

        let open_start = ViewFilter {
            end_date: Some("2021-06-30".to_string()),
            ..Default::default()
        };
        let kept = apply_filters(&records(), &open_start, &ctx());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0]["date"], "2021-05-01");
    }

    #[test]
    fn test_predicates_are_anded() {
        let filter = ViewFilter {
            year: Some("2021".to_string()),
            field_value: Some("B".to_string()),
            ..Default::default()
        };
        assert!(apply_filters(&records(), &filter, &ctx()).is_empty());
    }

    #[test]
    fn test_filtering_is_idempotent() {
        let filters = vec![
            ViewFilter::default(),
            ViewFilter {
                year: Some("2021".to_string()),
                ..Default::default()
            },
            ViewFilter {
                field_value: Some("A".to_string()),
                start_date: Some("2021-06-01".to_string()),
                ..Default::default()
            },
        ];

        for filter in filters {
            let once = apply_filters(&records(), &filter, &ctx());
            let twice = apply_filters(&once, &filter, &ctx());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_unparseable_bound_is_open() {
        let filter = ViewFilter {
            start_date: Some("yesterday".to_string()),
            ..Default::default()
        };
        assert_eq!(apply_filters(&records(), &filter, &ctx()).len(), 3);
    }
}
