//! Field type inference over a record set.
//!
//! Every non-null value votes for a type. Precedence per value is
//! date pattern, then numeric, then string. A field whose votes disagree
//! falls back to string.

use crate::models::{FieldDescriptor, FieldType, Record};
use chrono::NaiveDate;
use serde_json::Value;
use tracing::debug;

/// Inferred schema of a record set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<FieldDescriptor>,
    groupable: Vec<String>,
}

impl Schema {
    /// Run inference over every record, keeping first-seen field order.
    pub fn infer(records: &[Record]) -> Self {
        let mut slots: Vec<(String, Option<FieldType>, bool, bool)> = Vec::new();

        for record in records {
            for (name, value) in record {
                let idx = match slots.iter().position(|(n, ..)| n == name) {
                    Some(idx) => idx,
                    None => {
                        slots.push((name.clone(), None, false, false));
                        slots.len() - 1
                    }
                };
                let (_, inferred, conflicted, scalar) = &mut slots[idx];

                if matches!(value, Value::String(_) | Value::Number(_)) {
                    *scalar = true;
                }

                let Some(vote) = infer_value_type(value) else {
                    continue;
                };
                match *inferred {
                    None => *inferred = Some(vote),
                    Some(current) if current != vote => *conflicted = true,
                    Some(_) => {}
                }
            }
        }

        let mut fields = Vec::with_capacity(slots.len());
        let mut groupable = Vec::new();
        for (name, inferred, conflicted, scalar) in slots {
            let field_type = match inferred {
                Some(t) if !conflicted => t,
                _ => FieldType::String,
            };
            if scalar {
                groupable.push(name.clone());
            }
            fields.push(FieldDescriptor { name, field_type });
        }

        debug!("Inferred schema with {} fields", fields.len());
        Self { fields, groupable }
    }

    /// All fields with their inferred types.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Fields carrying string or number values, usable as group fields.
    pub fn groupable_fields(&self) -> &[String] {
        &self.groupable
    }

    /// Returns true if the schema knows the field.
    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// The field holding record dates.
    ///
    /// First field whose name contains "date" (any case), else the first
    /// field inferred as a date.
    pub fn date_field(&self) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| is_date_name(&f.name))
            .or_else(|| self.fields.iter().find(|f| f.field_type == FieldType::Date))
            .map(|f| f.name.as_str())
    }
}

/// Type of a single value, `None` for null.
pub fn infer_value_type(value: &Value) -> Option<FieldType> {
    match value {
        Value::Null => None,
        Value::Number(_) => Some(FieldType::Number),
        Value::String(s) => {
            if parse_date(s).is_some() {
                Some(FieldType::Date)
            } else if s.trim().parse::<f64>().is_ok() {
                Some(FieldType::Number)
            } else {
                Some(FieldType::String)
            }
        }
        _ => Some(FieldType::String),
    }
}

/// Case-insensitive "date" name heuristic.
pub fn is_date_name(name: &str) -> bool {
    name.to_lowercase().contains("date")
}

/// Parse the leading `YYYY-MM-DD` of a string.
///
/// Trailing time components (`2021-05-01T10:00:00`) are ignored.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let head = s.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// Returns true if `s` contains a `dddd-dd-dd` run anywhere.
pub fn contains_iso_date(s: &str) -> bool {
    const SHAPE: &[u8; 10] = b"dddd-dd-dd";
    s.as_bytes().windows(SHAPE.len()).any(|window| {
        window.iter().zip(SHAPE.iter()).all(|(b, shape)| match shape {
            b'd' => b.is_ascii_digit(),
            _ => b == shape,
        })
    })
}
