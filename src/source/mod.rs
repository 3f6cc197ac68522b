//! Source-unit readers.
//!
//! Each reader turns one [`SourceUnit`] into its native header plus all-text rows; every
//! cell is coerced to text here so that units whose native cell types differ (number vs text
//! vs blank) still union cleanly downstream. The projection is applied later by the worker,
//! not by the readers.

pub mod csv;
#[cfg(feature = "excel")]
pub mod excel;

use crate::catalog::SourceUnit;
use crate::error::MergeResult;
use crate::types::Value;

/// Raw, unprojected content of one source unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitData {
    /// Native column names, in source order.
    pub columns: Vec<String>,
    /// All-text rows, padded to `columns.len()`.
    pub rows: Vec<Vec<Value>>,
}

/// Read one source unit into memory.
pub fn read_unit(unit: &SourceUnit) -> MergeResult<UnitData> {
    match unit {
        #[cfg(feature = "excel")]
        SourceUnit::Sheet { workbook, name } => excel::read_sheet(workbook, name),
        SourceUnit::File(path) => csv::read_file(path),
    }
}
