//! Source-unit enumeration.
//!
//! A [`Container`] is a handle to a set of same-schema tabular source units: either one
//! workbook whose sheets are the units, or an explicit list of CSV files. Enumeration is
//! deterministic (workbook sheet order / list order), but merge order follows worker
//! completion, not enumeration order; see [`crate::merge`].

use std::path::PathBuf;

use crate::error::MergeResult;

#[cfg(feature = "excel")]
use calamine::{open_workbook_auto, Reader};

#[cfg(feature = "excel")]
use crate::error::MergeError;

/// A tabular container holding zero or more source units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Container {
    #[cfg(feature = "excel")]
    /// A workbook file; each sheet is one source unit.
    Workbook(PathBuf),
    /// An explicit list of CSV files; each file is one source unit.
    Files(Vec<PathBuf>),
}

/// One homogeneous chunk of tabular data to be ingested.
///
/// Immutable once enumerated; consumed exactly once by one ingestion worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceUnit {
    #[cfg(feature = "excel")]
    /// One sheet inside a workbook.
    Sheet { workbook: PathBuf, name: String },
    /// One whole CSV file.
    File(PathBuf),
}

impl SourceUnit {
    /// Human-readable unit label used in errors, events and logs.
    pub fn label(&self) -> String {
        match self {
            #[cfg(feature = "excel")]
            Self::Sheet { workbook, name } => {
                format!("{}#{name}", workbook.display())
            }
            Self::File(path) => path.display().to_string(),
        }
    }
}

/// Enumerate a container's source units in their natural order.
///
/// Returns `Ok(vec![])` for a container with zero units: a recognized empty result, not an
/// error; callers treat it as a no-op merge. Fails with
/// [`crate::error::MergeError::ContainerNotFound`] when a workbook path does not exist or
/// cannot be opened. File-list containers are enumerated as-is; a missing file surfaces
/// later as a per-unit read failure, so the calling layer can decide which files to pass in.
pub fn enumerate_units(container: &Container) -> MergeResult<Vec<SourceUnit>> {
    match container {
        #[cfg(feature = "excel")]
        Container::Workbook(path) => {
            if !path.exists() {
                return Err(MergeError::ContainerNotFound { path: path.clone() });
            }
            let workbook = open_workbook_auto(path).map_err(|_| MergeError::ContainerNotFound {
                path: path.clone(),
            })?;

            Ok(workbook
                .sheet_names()
                .iter()
                .map(|name| SourceUnit::Sheet {
                    workbook: path.clone(),
                    name: name.clone(),
                })
                .collect())
        }
        Container::Files(paths) => Ok(paths.iter().cloned().map(SourceUnit::File).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::{enumerate_units, Container, SourceUnit};
    use std::path::PathBuf;

    #[test]
    fn empty_file_list_enumerates_to_zero_units() {
        let units = enumerate_units(&Container::Files(vec![])).unwrap();
        assert!(units.is_empty());
    }

    #[test]
    fn file_list_preserves_order() {
        let container = Container::Files(vec![PathBuf::from("b.csv"), PathBuf::from("a.csv")]);
        let units = enumerate_units(&container).unwrap();
        assert_eq!(
            units,
            vec![
                SourceUnit::File(PathBuf::from("b.csv")),
                SourceUnit::File(PathBuf::from("a.csv")),
            ]
        );
    }

    #[cfg(feature = "excel")]
    #[test]
    fn missing_workbook_is_container_not_found() {
        let err = enumerate_units(&Container::Workbook(PathBuf::from(
            "/definitely/not/here.xlsx",
        )))
        .unwrap_err();
        assert!(matches!(
            err,
            crate::error::MergeError::ContainerNotFound { .. }
        ));
    }
}
