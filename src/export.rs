//! CSV and JSON export of record collections for CRM hand-off.
//!
//! Files are named `{name}_{YYYY-MM-DD}.{csv|json}` (UTC date) and written
//! into the export directory.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::util::{file_stem, write_atomic};

/// Render uniform records as CSV. Headers come from the first record's
/// fields. Returns `None` for an empty collection.
pub fn to_csv<T: Serialize>(records: &[T]) -> Result<Option<String>, ApiError> {
    let rows = records
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ApiError::Decode(format!("Failed to serialize records: {}", e)))?;

    let headers: Vec<String> = match rows.first() {
        None => return Ok(None),
        Some(Value::Object(first)) => first.keys().cloned().collect(),
        Some(_) => {
            return Err(ApiError::Decode(
                "CSV export needs records with named fields".to_string(),
            ))
        }
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(headers.join(","));
    for row in &rows {
        let cells: Vec<String> = headers
            .iter()
            .map(|h| csv_cell(row.get(h).unwrap_or(&Value::Null)))
            .collect();
        lines.push(cells.join(","));
    }
    Ok(Some(lines.join("\n")))
}

fn csv_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(n),
        Value::String(s) => {
            if s.contains(',') || s.contains('"') || s.contains('\n') {
                quote(s)
            } else {
                s.clone()
            }
        }
        // nested values are always quoted
        Value::Array(_) | Value::Object(_) => quote(&value.to_string()),
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Integral floats print without a fractional part (`82`, not `82.0`).
fn format_number(n: &serde_json::Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        _ => n.to_string(),
    }
}

/// Export file name for `name` on `date`.
pub fn export_file_name(name: &str, date: NaiveDate, extension: &str) -> String {
    format!("{}_{}.{}", file_stem(name), date.format("%Y-%m-%d"), extension)
}

/// Write `records` as CSV into `dir`. Empty input is a silent no-op and
/// returns `Ok(None)`.
pub fn export_to_csv<T: Serialize>(
    records: &[T],
    name: &str,
    dir: &Path,
) -> Result<Option<PathBuf>, ApiError> {
    let Some(content) = to_csv(records)? else {
        log::debug!("CSV export of '{}' skipped: no records", name);
        return Ok(None);
    };
    let path = dir.join(export_file_name(name, Utc::now().date_naive(), "csv"));
    write_atomic(&path, content.as_bytes())?;
    log::info!("Exported {} rows to {}", records.len(), path.display());
    Ok(Some(path))
}

/// Write `records` as pretty-printed JSON into `dir`. An empty collection
/// still produces a file containing `[]`.
pub fn export_to_json<T: Serialize>(
    records: &[T],
    name: &str,
    dir: &Path,
) -> Result<PathBuf, ApiError> {
    let content = serde_json::to_string_pretty(records)
        .map_err(|e| ApiError::Decode(format!("Failed to serialize records: {}", e)))?;
    let path = dir.join(export_file_name(name, Utc::now().date_naive(), "json"));
    write_atomic(&path, content.as_bytes())?;
    log::info!("Exported {} records to {}", records.len(), path.display());
    Ok(path)
}
