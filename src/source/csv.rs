//! CSV source units.

use std::path::Path;

use crate::error::MergeResult;
use crate::types::Value;

use super::UnitData;

/// Read a whole CSV file as one source unit.
///
/// The first record is the header; every following record becomes an all-text row. Empty
/// fields become [`Value::Null`].
pub fn read_file(path: impl AsRef<Path>) -> MergeResult<UnitData> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)?;

    let columns: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let mut row: Vec<Value> = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            let raw = record.get(idx).unwrap_or("");
            if raw.is_empty() {
                row.push(Value::Null);
            } else {
                row.push(Value::text(raw));
            }
        }
        rows.push(row);
    }

    Ok(UnitData { columns, rows })
}
