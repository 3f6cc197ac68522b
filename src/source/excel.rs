#![cfg(feature = "excel")]

//! Workbook-sheet source units.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};

use crate::error::{MergeError, MergeResult};
use crate::types::Value;

use super::UnitData;

/// Read one sheet of a workbook as a source unit.
///
/// The first non-empty row is the header; remaining rows are coerced to all-text values,
/// padded with nulls to the header width. A sheet with no non-empty rows has no header and
/// is unreadable.
pub fn read_sheet(workbook: impl AsRef<Path>, sheet: &str) -> MergeResult<UnitData> {
    let mut workbook = open_workbook_auto(workbook)?;
    let range = workbook.worksheet_range(sheet)?;

    let mut header_row_idx: Option<usize> = None;
    let mut columns: Vec<String> = Vec::new();
    for (idx0, row) in range.rows().enumerate() {
        if row.iter().any(|c| !matches!(c, Data::Empty)) {
            header_row_idx = Some(idx0);
            columns = row.iter().map(header_cell_text).collect();
            break;
        }
    }

    let header_row_idx = header_row_idx.ok_or_else(|| MergeError::SourceRead {
        unit: sheet.to_string(),
        message: "sheet has no non-empty rows (no header row found)".to_string(),
    })?;

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for (idx0, row) in range.rows().enumerate() {
        if idx0 <= header_row_idx {
            continue;
        }

        let mut out_row: Vec<Value> = Vec::with_capacity(columns.len());
        for col_idx in 0..columns.len() {
            let cell = row.get(col_idx).unwrap_or(&Data::Empty);
            out_row.push(cell_value(cell));
        }
        rows.push(out_row);
    }

    Ok(UnitData { columns, rows })
}

fn header_cell_text(c: &Data) -> String {
    match c {
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 => (*f as i64).to_string(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn cell_value(c: &Data) -> Value {
    match c {
        Data::Empty => Value::Null,
        Data::String(s) => {
            if s.is_empty() {
                Value::Null
            } else {
                Value::text(s.clone())
            }
        }
        Data::Int(i) => Value::text(i.to_string()),
        Data::Float(f) => {
            // Whole floats render without the trailing ".0" so workbook cells typed as
            // numbers line up with the same values typed as text in other units.
            if f.fract() == 0.0 && f.abs() < 1e15 {
                Value::text((*f as i64).to_string())
            } else {
                Value::text(f.to_string())
            }
        }
        Data::Bool(b) => Value::text(b.to_string()),
        other => Value::text(other.to_string()),
    }
}
