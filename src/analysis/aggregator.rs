//! Record aggregation and option lists.
//!
//! This module groups filtered records into label/count buckets for the
//! bar chart and year/count buckets for the line chart.

use crate::models::{value_label, Bucket, Record, YearBucket};
use std::collections::HashMap;

/// Label used when a record has neither the group field nor a name.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Field consulted when the group field is missing.
const FALLBACK_FIELD: &str = "name";

/// Count records per value of `field`, in first-seen order.
///
/// Missing values fall back to the record's `name`, then to
/// [`UNKNOWN_LABEL`], so every record lands in exactly one bucket.
pub fn group_by_field(records: &[Record], field: &str) -> Vec<Bucket> {
    let mut buckets: Vec<Bucket> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        let label = record
            .get(field)
            .and_then(value_label)
            .or_else(|| record.get(FALLBACK_FIELD).and_then(value_label))
            .unwrap_or_else(|| UNKNOWN_LABEL.to_string());

        match index.get(&label) {
            Some(&i) => buckets[i].count += 1,
            None => {
                index.insert(label.clone(), buckets.len());
                buckets.push(Bucket { label, count: 1 });
            }
        }
    }

    buckets
}

/// Count records per year of `date_field`, sorted by year ascending.
///
/// Records whose date value does not start with four digits are skipped.
pub fn group_by_year(records: &[Record], date_field: &str) -> Vec<YearBucket> {
    let mut counts: HashMap<String, usize> = HashMap::new();

    for record in records {
        if let Some(year) = record_year(record, date_field) {
            *counts.entry(year).or_default() += 1;
        }
    }

    let mut buckets: Vec<YearBucket> = counts
        .into_iter()
        .map(|(year, count)| YearBucket { year, count })
        .collect();
    buckets.sort_by(|a, b| a.year.cmp(&b.year));

    buckets
}

/// Distinct years present in `date_field`, ascending.
pub fn unique_years(records: &[Record], date_field: &str) -> Vec<String> {
    group_by_year(records, date_field)
        .into_iter()
        .map(|b| b.year)
        .collect()
}

/// Distinct string values of `field`, in first-seen order.
pub fn unique_values(records: &[Record], field: &str) -> Vec<String> {
    let mut values: Vec<String> = Vec::new();

    for record in records {
        if let Some(value) = record.get(field).and_then(|v| v.as_str()) {
            if !values.iter().any(|v| v == value) {
                values.push(value.to_string());
            }
        }
    }

    values
}

fn record_year(record: &Record, date_field: &str) -> Option<String> {
    let raw = record.get(date_field)?.as_str()?;
    let year = raw.trim().get(..4)?;
    if year.bytes().all(|b| b.is_ascii_digit()) {
        Some(year.to_string())
    } else {
        None
    }
}
