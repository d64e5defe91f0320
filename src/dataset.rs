//! Tabular Data Store - immutable parsed dataset plus per-column metadata

use crate::error::{DashboardError, Result};
use crate::profile::{profile_columns, ColumnMetadata};
use csv::ReaderBuilder;
use serde_json::{Map, Value};
use uuid::Uuid;

/// One parsed row: column name -> scalar value.
pub type Row = Map<String, Value>;

/// Maximum accepted upload size (50 MB source file).
pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

const ACCEPTED_EXTENSIONS: &[&str] = &["csv", "xlsx", "xls"];

/// The parsed dataset. Created once per upload and never mutated afterwards;
/// everything downstream (filtering, aggregation) reads through shared
/// references.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub id: String,
    pub name: String,
    /// Column names in source order.
    pub columns: Vec<String>,
    /// Rows in source order.
    pub rows: Vec<Row>,
    /// Per-column profile, computed once at ingestion.
    pub metadata: Vec<ColumnMetadata>,
}

impl Dataset {
    /// Build a dataset from already-parsed rows (e.g. an external parser for
    /// xlsx/xls). Column metadata is profiled here.
    pub fn from_rows(name: &str, columns: Vec<String>, rows: Vec<Row>) -> Self {
        let metadata = profile_columns(&columns, &rows);
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            columns,
            rows,
            metadata,
        }
    }

    /// Parse CSV text into a dataset. Cells are coerced to scalars:
    /// empty -> null, true/false -> bool, integer/float parse -> number,
    /// anything else -> trimmed string.
    pub fn from_csv_text(name: &str, csv_text: &str) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(csv_text.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| DashboardError::Ingest(format!("Failed to read CSV headers: {}", e)))?
            .clone();
        let columns: Vec<String> = headers.iter().map(|h| h.trim().to_string()).collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record =
                record.map_err(|e| DashboardError::Ingest(format!("Failed to read CSV row: {}", e)))?;
            let mut row = Map::new();
            for (idx, column) in columns.iter().enumerate() {
                let value = record
                    .get(idx)
                    .map(coerce_cell)
                    .unwrap_or(Value::Null);
                row.insert(column.clone(), value);
            }
            rows.push(row);
        }

        tracing::info!(
            dataset = name,
            rows = rows.len(),
            columns = columns.len(),
            "Parsed CSV dataset"
        );

        Ok(Self::from_rows(name, columns, rows))
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_metadata(&self, column: &str) -> Option<&ColumnMetadata> {
        self.metadata.iter().find(|m| m.name == column)
    }
}

/// Validate an upload before any parsing happens. Rejections here create no
/// partial state.
pub fn validate_upload(file_name: &str, size_bytes: u64) -> Result<()> {
    let extension = file_name
        .rsplit('.')
        .next()
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if file_name.rfind('.').is_none() || !ACCEPTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(DashboardError::Upload(format!(
            "Unsupported file type: {} (expected .csv, .xlsx or .xls)",
            file_name
        )));
    }

    if size_bytes > MAX_UPLOAD_BYTES {
        return Err(DashboardError::Upload(format!(
            "File too large: {} bytes (limit {} bytes)",
            size_bytes, MAX_UPLOAD_BYTES
        )));
    }

    Ok(())
}

fn coerce_cell(s: &str) -> Value {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }

    if trimmed.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }

    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Number(i.into());
    }

    if let Ok(f) = trimmed.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }

    Value::String(trimmed.to_string())
}
