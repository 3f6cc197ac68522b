//! Per-unit ingestion.
//!
//! A worker reads exactly one source unit, applies the projection, and materializes the
//! result into a private staging relation. Workers never retry, never write to each other's
//! relations, and never touch the destination; failures are forwarded verbatim to the
//! coordinator, which is the sole abort-vs-continue decision point.

use crate::catalog::SourceUnit;
use crate::error::{MergeError, MergeResult};
use crate::merge::CancelToken;
use crate::projection::{Expr, Projection};
use crate::source::{self, UnitData};
use crate::staging::{StagingHandle, StagingNamer};
use crate::store::RelationStore;
use crate::types::{Relation, Value};

/// Read `unit`, apply `projection`, and materialize the result as a new staging relation.
///
/// On success, ownership of the created relation (including deletion responsibility)
/// transfers to the caller with the returned handle. The cancel token is polled at I/O
/// boundaries: before the unit is opened and again before the staging relation is written.
pub fn ingest_unit(
    store: &dyn RelationStore,
    unit: &SourceUnit,
    projection: &Projection,
    namer: &StagingNamer,
    cancel: &CancelToken,
) -> MergeResult<StagingHandle> {
    if cancel.is_cancelled() {
        return Err(MergeError::Cancelled);
    }

    let data = source::read_unit(unit).map_err(|e| as_source_failure(unit, e))?;
    let (columns, rows) = project_unit(unit, data, projection)?;

    if cancel.is_cancelled() {
        return Err(MergeError::Cancelled);
    }

    let name = namer.next();
    let staged_rows = rows.len() as u64;
    store.create(Relation::new(name.clone(), columns.clone(), rows))?;

    Ok(StagingHandle {
        name,
        unit: unit.label(),
        columns,
        rows: staged_rows,
    })
}

/// Wrap low-level read errors as a per-unit `SourceRead` failure; cancellation passes
/// through unchanged.
fn as_source_failure(unit: &SourceUnit, err: MergeError) -> MergeError {
    match err {
        MergeError::Cancelled => MergeError::Cancelled,
        MergeError::SourceRead { unit, message } => MergeError::SourceRead { unit, message },
        other => MergeError::SourceRead {
            unit: unit.label(),
            message: other.to_string(),
        },
    }
}

fn project_unit(
    unit: &SourceUnit,
    data: UnitData,
    projection: &Projection,
) -> MergeResult<(Vec<String>, Vec<Vec<Value>>)> {
    if projection.is_passthrough() {
        return Ok((data.columns, data.rows));
    }

    // Resolve every referenced column up front so a bad projection fails before any rows
    // are copied.
    let mut col_idxs: Vec<usize> = Vec::with_capacity(projection.entries().len());
    for entry in projection.entries() {
        match &entry.expr {
            Expr::Column(name) => match data.columns.iter().position(|c| c == name) {
                Some(idx) => col_idxs.push(idx),
                None => {
                    return Err(MergeError::Projection {
                        unit: unit.label(),
                        message: format!(
                            "missing referenced column '{name}'. headers={:?}",
                            data.columns
                        ),
                    });
                }
            },
            other => {
                return Err(MergeError::Projection {
                    unit: unit.label(),
                    message: format!(
                        "aggregate expression '{other}' is not allowed during ingestion"
                    ),
                });
            }
        }
    }

    let columns: Vec<String> = projection
        .entries()
        .iter()
        .map(|e| e.output_name())
        .collect();

    let rows: Vec<Vec<Value>> = data
        .rows
        .into_iter()
        .map(|row| {
            col_idxs
                .iter()
                .map(|&idx| row.get(idx).cloned().unwrap_or(Value::Null))
                .collect()
        })
        .collect();

    Ok((columns, rows))
}
