use std::collections::HashSet;

use serde::Serialize;

use crate::metrics::{completeness, Card, CardValue};
use crate::models::{Metric, RecordSet, Value};

const SAMPLE_ROWS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub dtype: String,
    pub null_count: usize,
    pub unique_count: usize,
}

/// Everything shown on the Data Overview tab.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataOverview {
    pub table: String,
    pub record_count: usize,
    pub column_count: usize,
    pub columns: Vec<ColumnInfo>,
    pub memory_bytes: usize,
    pub completeness: Metric<f64>,
    pub head: RecordSet,
    pub tail: RecordSet,
}

impl DataOverview {
    pub fn cards(&self) -> Vec<Card> {
        vec![
            Card {
                label: "Total Records".to_string(),
                value: Metric::Available(CardValue::Count(self.record_count)),
            },
            Card {
                label: "Total Columns".to_string(),
                value: Metric::Available(CardValue::Count(self.column_count)),
            },
            Card {
                label: "Memory Usage".to_string(),
                value: Metric::Available(CardValue::Megabytes(
                    self.memory_bytes as f64 / 1024.0 / 1024.0,
                )),
            },
            Card {
                label: "Data Completeness".to_string(),
                value: self.completeness.clone().map(CardValue::Percent),
            },
        ]
    }
}

pub fn describe(table: &str, records: &RecordSet) -> DataOverview {
    let columns = records
        .columns()
        .iter()
        .map(|name| describe_column(name, &records.column_values(name)))
        .collect();

    let memory_bytes = records
        .columns()
        .iter()
        .map(|c| c.capacity())
        .sum::<usize>()
        + records
            .rows()
            .iter()
            .flat_map(|row| row.iter())
            .map(Value::approx_size)
            .sum::<usize>();

    DataOverview {
        table: table.to_string(),
        record_count: records.len(),
        column_count: records.columns().len(),
        columns,
        memory_bytes,
        completeness: completeness(records),
        head: records.head(SAMPLE_ROWS),
        tail: records.tail(SAMPLE_ROWS),
    }
}

fn describe_column(name: &str, values: &[&Value]) -> ColumnInfo {
    let mut types: HashSet<&'static str> = HashSet::new();
    let mut unique: HashSet<String> = HashSet::new();
    let mut null_count = 0;

    for value in values {
        match value.key() {
            Some(key) => {
                types.insert(value.type_name());
                unique.insert(key);
            }
            None => null_count += 1,
        }
    }

    ColumnInfo {
        name: name.to_string(),
        dtype: column_dtype(&types).to_string(),
        null_count,
        unique_count: unique.len(),
    }
}

/// A single type names the column; ints mixed with floats widen to float64; anything else is object.
fn column_dtype(types: &HashSet<&'static str>) -> &'static str {
    match types.len() {
        1 => types.iter().next().copied().unwrap_or("object"),
        2 if types.contains("int64") && types.contains("float64") => "float64",
        _ => "object",
    }
}
