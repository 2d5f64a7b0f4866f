use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

/// A single cell as loaded from the warehouse or a CSV export.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Numeric view of the cell; `None` for anything that is not a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) if !v.is_nan() => Some(*v),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int64",
            Value::Float(_) => "float64",
            Value::Date(_) => "date",
            Value::Timestamp(_) => "datetime",
            Value::Text(_) => "string",
        }
    }

    /// Key used when grouping or counting by this cell. Nulls have no key.
    pub fn key(&self) -> Option<String> {
        if self.is_null() {
            None
        } else {
            Some(self.to_string())
        }
    }

    /// Rough heap + inline footprint, used for the memory usage card.
    pub fn approx_size(&self) -> usize {
        let inline = std::mem::size_of::<Value>();
        match self {
            Value::Text(text) => inline + text.capacity(),
            _ => inline,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Date(v) => write!(f, "{v}"),
            Value::Timestamp(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
        }
    }
}

/// Ordered rows sharing one column header.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl RecordSet {
    /// Rows shorter than the header are padded with nulls; longer rows are truncated.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Value::Null);
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Values of one column in row order; empty when the column does not exist.
    pub fn column_values<'a>(&'a self, name: &str) -> Vec<&'a Value> {
        match self.column_index(name) {
            Some(idx) => self.rows.iter().map(|row| &row[idx]).collect(),
            None => Vec::new(),
        }
    }

    pub fn filter_rows<F>(&self, mut keep: F) -> RecordSet
    where
        F: FnMut(&[Value]) -> bool,
    {
        RecordSet {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .filter(|row| keep(row))
                .cloned()
                .collect(),
        }
    }

    pub fn head(&self, n: usize) -> RecordSet {
        RecordSet {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    pub fn tail(&self, n: usize) -> RecordSet {
        let skip = self.rows.len().saturating_sub(n);
        RecordSet {
            columns: self.columns.clone(),
            rows: self.rows[skip..].to_vec(),
        }
    }

    pub fn cell_count(&self) -> usize {
        self.rows.len() * self.columns.len()
    }

    pub fn null_count(&self) -> usize {
        self.rows
            .iter()
            .flat_map(|row| row.iter())
            .filter(|value| value.is_null())
            .count()
    }
}

/// Result of a single dashboard metric. A failed metric never aborts the page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Metric<T> {
    Available(T),
    Unavailable(String),
}

impl<T> Metric<T> {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Metric::Unavailable(reason.into())
    }

    pub fn as_option(&self) -> Option<&T> {
        match self {
            Metric::Available(value) => Some(value),
            Metric::Unavailable(_) => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Metric::Available(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Metric<U> {
        match self {
            Metric::Available(value) => Metric::Available(f(value)),
            Metric::Unavailable(reason) => Metric::Unavailable(reason),
        }
    }

    /// Display form for metric cards: the value or `N/A`.
    pub fn display_with(&self, format: impl Fn(&T) -> String) -> String {
        match self {
            Metric::Available(value) => format(value),
            Metric::Unavailable(_) => "N/A".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ValueSegment {
    Low,
    Medium,
    High,
}

impl ValueSegment {
    pub const ALL: [ValueSegment; 3] = [ValueSegment::Low, ValueSegment::Medium, ValueSegment::High];

    pub fn label(self) -> &'static str {
        match self {
            ValueSegment::Low => "Low Value",
            ValueSegment::Medium => "Medium Value",
            ValueSegment::High => "High Value",
        }
    }
}

impl fmt::Display for ValueSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerAggregate {
    pub customer: String,
    pub total_spent: f64,
    pub avg_purchase: f64,
    pub purchase_count: usize,
    pub segment: ValueSegment,
}

/// A value and how many rows carry it, as produced by a value count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
}
