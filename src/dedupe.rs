//! Key-based deduplication.
//!
//! [`dedupe_rows`] collapses a relation into one row per distinct value of the projection's
//! key (the first entry, always a plain column reference). The remaining entries are
//! combinators deciding how a group's values fold into one output value. Output rows are
//! sorted ascending by key (nulls last) so results are deterministic regardless of the
//! non-deterministic physical row order the merge produced.
//!
//! `any_value`-style combinators make dedup idempotent on already-unique data: every group
//! is a singleton and reproduces its only value. Counting/summing combinators are *not*
//! idempotence-safe (re-running `count(*)` over an already-deduplicated relation collapses
//! every count to 1).

use std::collections::HashMap;

use crate::error::{MergeError, MergeResult};
use crate::projection::{Expr, Projection};
use crate::store::RelationStore;
use crate::types::{Relation, Value};

/// Result of a store-mediated deduplication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueOutcome {
    /// Name of the newly created unique relation (`u_{input}`).
    pub relation: String,
    /// Row count of the input relation.
    pub rows_before: u64,
    /// Row count of the unique relation.
    pub rows_after: u64,
}

/// Deduplicate a stored relation into a new relation named `u_{relation}`.
///
/// Any previous relation under the output name is replaced. Fails with
/// [`MergeError::EmptyProjection`] when the projection has no entries.
pub fn unique_keys(
    store: &dyn RelationStore,
    relation: &str,
    projection: &Projection,
) -> MergeResult<UniqueOutcome> {
    if projection.is_passthrough() {
        return Err(MergeError::EmptyProjection);
    }

    let rows_before = store.relation(relation)?.row_count() as u64;
    let out_name = format!("u_{relation}");
    store.drop_relation(&out_name)?;
    let rows_after = store.group_into(relation, &out_name, projection)?;

    Ok(UniqueOutcome {
        relation: out_name,
        rows_before,
        rows_after,
    })
}

/// Group `input` by the projection key and emit one row per distinct key value.
///
/// Pure core of the deduplicator, also used by
/// [`crate::store::MemoryStore`]'s grouping primitive.
pub fn dedupe_rows(
    input: &Relation,
    projection: &Projection,
    output_name: &str,
) -> MergeResult<Relation> {
    let entries = projection.entries();
    let Some((key_entry, combinators)) = entries.split_first() else {
        return Err(MergeError::EmptyProjection);
    };

    let Expr::Column(key_column) = &key_entry.expr else {
        return Err(MergeError::Expression {
            expr: key_entry.expr.to_string(),
            message: "dedup key must be a plain column reference".to_string(),
        });
    };

    let key_idx = input.column_index(key_column).ok_or_else(|| MergeError::Projection {
        unit: input.name.clone(),
        message: format!(
            "missing key column '{key_column}'. columns={:?}",
            input.columns
        ),
    })?;

    // Group row indexes by key value. HashMap iteration order is irrelevant because the
    // output is sorted by key below.
    let mut groups: HashMap<Option<String>, Vec<usize>> = HashMap::new();
    for (row_idx, row) in input.rows.iter().enumerate() {
        let key = row
            .get(key_idx)
            .and_then(|v| v.as_text())
            .map(|s| s.to_string());
        groups.entry(key).or_default().push(row_idx);
    }

    let mut out_rows: Vec<Vec<Value>> = Vec::with_capacity(groups.len());
    for (key, member_idxs) in groups {
        let mut row: Vec<Value> = Vec::with_capacity(entries.len());
        row.push(match key {
            Some(k) => Value::Text(k),
            None => Value::Null,
        });
        for entry in combinators {
            row.push(eval_combinator(&entry.expr, input, &member_idxs)?);
        }
        out_rows.push(row);
    }

    // Deterministic output: ascending by key, nulls last.
    out_rows.sort_by(|a, b| compare_keys(&a[0], &b[0]));

    let columns: Vec<String> = entries.iter().map(|e| e.output_name()).collect();
    Ok(Relation::new(output_name, columns, out_rows))
}

fn compare_keys(a: &Value, b: &Value) -> std::cmp::Ordering {
    match (a.as_text(), b.as_text()) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    }
}

/// Evaluate one combinator over a group of rows.
///
/// A bare column reference in combinator position means "arbitrary representative" and is
/// evaluated exactly like `any_value`. Text comparisons (`min`/`max`) are lexicographic;
/// `sum` parses non-null text as numbers and fails on anything non-numeric.
fn eval_combinator(expr: &Expr, input: &Relation, members: &[usize]) -> MergeResult<Value> {
    if let Expr::CountRows = expr {
        return Ok(Value::text(members.len().to_string()));
    }

    let column = expr
        .column()
        .expect("non-count(*) combinators always reference a column");
    let col_idx = input.column_index(column).ok_or_else(|| MergeError::Projection {
        unit: input.name.clone(),
        message: format!("missing column '{column}'. columns={:?}", input.columns),
    })?;

    let values = members
        .iter()
        .filter_map(|&row_idx| input.rows[row_idx].get(col_idx))
        .filter_map(|v| v.as_text());

    match expr {
        Expr::Column(_) | Expr::AnyValue(_) => Ok(values
            .map(|s| Value::text(s))
            .next()
            .unwrap_or(Value::Null)),
        Expr::Count(_) => Ok(Value::text(values.count().to_string())),
        Expr::Min(_) => Ok(values.min().map(Value::text).unwrap_or(Value::Null)),
        Expr::Max(_) => Ok(values.max().map(Value::text).unwrap_or(Value::Null)),
        Expr::Sum(_) => {
            let mut total: Option<f64> = None;
            for text in values {
                let parsed: f64 = text.trim().parse().map_err(|_| MergeError::Expression {
                    expr: expr.to_string(),
                    message: format!("cannot interpret '{text}' as a number"),
                })?;
                total = Some(total.unwrap_or(0.0) + parsed);
            }
            Ok(match total {
                None => Value::Null,
                Some(t) => Value::text(format_number(t)),
            })
        }
        Expr::CountRows => unreachable!("handled above"),
    }
}

/// Whole sums render without a trailing ".0" so `sum` over integer-looking text stays
/// integer-looking.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        (n as i64).to_string()
    } else {
        n.to_string()
    }
}
