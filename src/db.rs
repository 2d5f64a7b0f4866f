use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Column, Row, TypeInfo};
use tracing::{error, info};

use crate::config::{AuthMode, Credentials, WarehouseConfig};
use crate::models::{RecordSet, Value};

/// Runs the fixed query and materializes the full result set.
pub async fn fetch_records(
    config: &WarehouseConfig,
    credentials: &Credentials,
) -> anyhow::Result<RecordSet> {
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect_with(config.connect_options(credentials))
        .await
        .with_context(|| format!("failed to connect to warehouse {}", config.warehouse_id))?;

    // Simple-query protocol: every value comes back in text format.
    let query = config.query();
    let rows = sqlx::raw_sql(&query)
        .fetch_all(&pool)
        .await
        .with_context(|| format!("query failed: {query}"))?;
    pool.close().await;

    let columns = match rows.first() {
        Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
        None => Vec::new(),
    };

    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
        records.push(decode_row(row)?);
    }

    info!(rows = records.len(), table = %config.table, "loaded records");
    Ok(RecordSet::new(columns, records))
}

fn decode_row(row: &PgRow) -> anyhow::Result<Vec<Value>> {
    let mut values = Vec::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let raw: Option<String> = row
            .try_get_unchecked(idx)
            .with_context(|| format!("failed to read column {}", column.name()))?;
        values.push(match raw {
            Some(text) => parse_typed(column.type_info().name(), &text),
            None => Value::Null,
        });
    }
    Ok(values)
}

/// Decodes a text-format value using the column's reported SQL type.
pub fn parse_typed(type_name: &str, text: &str) -> Value {
    let parsed = match type_name {
        "INT2" | "INT4" | "INT8" | "OID" => text.parse().ok().map(Value::Int),
        "FLOAT4" | "FLOAT8" | "NUMERIC" | "MONEY" => parse_number(text).map(Value::Float),
        "BOOL" => match text {
            "t" | "true" => Some(Value::Bool(true)),
            "f" | "false" => Some(Value::Bool(false)),
            _ => None,
        },
        "DATE" => NaiveDate::parse_from_str(text, "%Y-%m-%d").ok().map(Value::Date),
        "TIMESTAMP" => parse_timestamp(text).map(Value::Timestamp),
        "TIMESTAMPTZ" => DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z")
            .ok()
            .map(|ts| Value::Timestamp(ts.naive_utc())),
        _ => None,
    };
    parsed.unwrap_or_else(|| Value::Text(text.to_string()))
}

/// Parses a numeric or money literal such as `-$1,234.50`. Infinity and NaN are rejected.
fn parse_number(text: &str) -> Option<f64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value: f64 = digits.trim_start_matches('$').replace(',', "").parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value } else { value })
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
}

/// Infers a CSV cell's type: empty is null, then integer, float, boolean, date, datetime, text.
pub fn infer_value(text: &str) -> Value {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(v) = trimmed.parse::<i64>() {
        return Value::Int(v);
    }
    if let Ok(v) = trimmed.parse::<f64>() {
        if v.is_finite() {
            return Value::Float(v);
        }
    }
    match trimmed.to_ascii_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(v) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Value::Date(v);
    }
    if let Some(v) = parse_timestamp(trimmed) {
        return Value::Timestamp(v);
    }
    Value::Text(text.to_string())
}

/// Loads an exported copy of the table from CSV.
pub fn load_csv(path: &Path) -> anyhow::Result<RecordSet> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let columns: Vec<String> = reader
        .headers()
        .with_context(|| format!("failed to read header of {}", path.display()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.with_context(|| format!("malformed row in {}", path.display()))?;
        rows.push(record.iter().map(infer_value).collect());
    }

    info!(rows = rows.len(), path = %path.display(), "loaded csv snapshot");
    Ok(RecordSet::new(columns, rows))
}

/// A load attempt: the record set, or an empty one plus the reason it failed.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub records: RecordSet,
    pub error: Option<String>,
}

impl Loaded {
    fn ok(records: RecordSet) -> Self {
        Self {
            records,
            error: None,
        }
    }

    fn failed(message: String) -> Self {
        error!("failed to load records: {message}");
        Self {
            records: RecordSet::empty(),
            error: Some(message),
        }
    }
}

/// Where the dashboard reads its rows from.
#[derive(Debug, Clone)]
pub enum DataSource {
    Warehouse {
        config: WarehouseConfig,
        mode: AuthMode,
    },
    Snapshot {
        label: String,
        records: Arc<RecordSet>,
    },
}

impl DataSource {
    pub fn label(&self) -> &str {
        match self {
            DataSource::Warehouse { config, .. } => &config.table,
            DataSource::Snapshot { label, .. } => label,
        }
    }

    /// Loads the record set, degrading to an empty set on any failure.
    pub async fn load_or_empty(&self, user_token: Option<&str>) -> Loaded {
        match self {
            DataSource::Warehouse { config, mode } => {
                let credentials = match config.credentials(*mode, user_token) {
                    Ok(credentials) => credentials,
                    Err(err) => return Loaded::failed(format!("{err:#}")),
                };
                match fetch_records(config, &credentials).await {
                    Ok(records) => Loaded::ok(records),
                    Err(err) => Loaded::failed(format!("Database connection error: {err:#}")),
                }
            }
            DataSource::Snapshot { records, .. } => Loaded::ok(records.as_ref().clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn typed_text_values_decode_by_column_type() {
        assert_eq!(parse_typed("INT8", "42"), Value::Int(42));
        assert_eq!(parse_typed("NUMERIC", "19.99"), Value::Float(19.99));
        assert_eq!(parse_typed("BOOL", "t"), Value::Bool(true));
        assert_eq!(
            parse_typed("DATE", "2024-03-01"),
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        assert!(matches!(
            parse_typed("TIMESTAMPTZ", "2024-03-01 10:00:00+02"),
            Value::Timestamp(ts) if ts.to_string() == "2024-03-01 08:00:00"
        ));
        assert_eq!(parse_typed("VARCHAR", "42"), Value::Text("42".to_string()));
    }

    #[test]
    fn unparseable_typed_values_fall_back_to_text() {
        assert_eq!(parse_typed("INT4", "n/a"), Value::Text("n/a".to_string()));
    }

    #[test]
    fn money_keeps_its_sign_and_grouping() {
        assert_eq!(parse_typed("MONEY", "-$5.00"), Value::Float(-5.0));
        assert_eq!(parse_typed("MONEY", "$1,234.50"), Value::Float(1234.5));
        assert_eq!(parse_typed("NUMERIC", "-12.5"), Value::Float(-12.5));
    }

    #[test]
    fn non_finite_floats_are_not_numbers() {
        assert_eq!(parse_typed("FLOAT8", "Infinity"), Value::Text("Infinity".to_string()));
        assert_eq!(parse_typed("FLOAT8", "-Infinity"), Value::Text("-Infinity".to_string()));
        assert_eq!(parse_typed("NUMERIC", "NaN"), Value::Text("NaN".to_string()));
    }

    #[test]
    fn csv_cells_are_inferred() {
        assert_eq!(infer_value(""), Value::Null);
        assert_eq!(infer_value("7"), Value::Int(7));
        assert_eq!(infer_value("7.5"), Value::Float(7.5));
        assert_eq!(infer_value("TRUE"), Value::Bool(true));
        assert!(matches!(infer_value("2024-01-02 03:04:05"), Value::Timestamp(_)));
        assert_eq!(infer_value("Books"), Value::Text("Books".to_string()));
        assert_eq!(infer_value("NaN"), Value::Text("NaN".to_string()));
    }

    #[test]
    fn loads_csv_snapshot() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "customer_id,category,purchase_amount,purchase_date").unwrap();
        writeln!(file, "1,Books,12.50,2024-01-03").unwrap();
        writeln!(file, "2,Toys,,2024-01-04").unwrap();
        writeln!(file, "3,Toys").unwrap();
        file.flush().unwrap();

        let records = load_csv(file.path()).unwrap();
        assert_eq!(records.columns().len(), 4);
        assert_eq!(records.len(), 3);
        assert_eq!(records.rows()[0][2], Value::Float(12.5));
        assert_eq!(records.rows()[1][2], Value::Null);
        assert_eq!(records.rows()[2][3], Value::Null);
    }

    #[test]
    fn missing_csv_is_an_error() {
        assert!(load_csv(Path::new("/nonexistent/purchases.csv")).is_err());
    }

    #[tokio::test]
    async fn missing_user_token_degrades_to_empty_records() {
        let config = WarehouseConfig::from_lookup(|key| {
            (key == "WAREHOUSE_ID").then(|| "wh-1".to_string())
        })
        .unwrap();
        let source = DataSource::Warehouse {
            config,
            mode: AuthMode::UserToken,
        };
        let loaded = source.load_or_empty(None).await;
        assert!(loaded.records.is_empty());
        assert_eq!(loaded.error.as_deref(), Some("User access token is missing."));
    }

    #[tokio::test]
    async fn snapshot_source_returns_its_records() {
        let records = RecordSet::new(vec!["a".to_string()], vec![vec![Value::Int(1)]]);
        let source = DataSource::Snapshot {
            label: "fixture".to_string(),
            records: Arc::new(records.clone()),
        };
        let loaded = source.load_or_empty(None).await;
        assert_eq!(loaded.records, records);
        assert!(loaded.error.is_none());
        assert_eq!(source.label(), "fixture");
    }
}
