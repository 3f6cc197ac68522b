//! Projection model.
//!
//! A [`Projection`] is an ordered list of `(expression, optional alias)` pairs describing
//! which columns of a source unit to keep and how to rename them. The same type drives both
//! phases of the engine:
//!
//! - **Ingestion**: every expression must be a plain column reference; an empty projection
//!   means "all columns, unmodified".
//! - **Deduplication**: the first entry is the dedup key (a plain column reference); the
//!   remaining entries are combinators such as `any_value(c)`, `count(*)` or `sum(c)`.
//!
//! Expressions use a small SQL-flavored syntax: bare or double-quoted column names, and
//! aggregate calls. A machine-readable JSON form `[["expr", null | "alias"], ...]` is
//! accepted by [`Projection::parse_spec`].

use serde::Deserialize;
use std::fmt;

use crate::error::{MergeError, MergeResult};
use crate::types::Relation;

/// A parsed projection expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Bare column reference (`c` or `"c"`).
    Column(String),
    /// `any_value(c)`: an arbitrary representative of the group (first non-null seen).
    AnyValue(String),
    /// `count(*)`: number of rows in the group.
    CountRows,
    /// `count(c)`: number of non-null values in the group.
    Count(String),
    /// `sum(c)`: numeric sum over non-null values; fails on non-numeric text.
    Sum(String),
    /// `min(c)`: lexicographic minimum over non-null values.
    Min(String),
    /// `max(c)`: lexicographic maximum over non-null values.
    Max(String),
}

impl Expr {
    /// Parse an expression string.
    pub fn parse(raw: &str) -> MergeResult<Self> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(MergeError::Expression {
                expr: raw.to_string(),
                message: "expression is empty".to_string(),
            });
        }

        if let Some(open) = s.find('(') {
            if !s.ends_with(')') {
                return Err(MergeError::Expression {
                    expr: raw.to_string(),
                    message: "unbalanced parentheses".to_string(),
                });
            }
            let func = s[..open].trim().to_ascii_lowercase();
            let inner = s[open + 1..s.len() - 1].trim();

            if func == "count" && inner == "*" {
                return Ok(Self::CountRows);
            }

            let column = unquote(inner);
            if column.is_empty() {
                return Err(MergeError::Expression {
                    expr: raw.to_string(),
                    message: format!("{func}() requires a column argument"),
                });
            }

            return match func.as_str() {
                "any_value" => Ok(Self::AnyValue(column)),
                "count" => Ok(Self::Count(column)),
                "sum" => Ok(Self::Sum(column)),
                "min" => Ok(Self::Min(column)),
                "max" => Ok(Self::Max(column)),
                _ => Err(MergeError::Expression {
                    expr: raw.to_string(),
                    message: format!("unknown function '{func}'"),
                }),
            };
        }

        Ok(Self::Column(unquote(s)))
    }

    /// The column this expression reads, if any (`count(*)` reads none).
    pub fn column(&self) -> Option<&str> {
        match self {
            Self::CountRows => None,
            Self::Column(c)
            | Self::AnyValue(c)
            | Self::Count(c)
            | Self::Sum(c)
            | Self::Min(c)
            | Self::Max(c) => Some(c.as_str()),
        }
    }

    /// True for plain column references (the only form allowed during ingestion, and the
    /// only form allowed as a dedup key).
    pub fn is_column(&self) -> bool {
        matches!(self, Self::Column(_))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(c) => f.write_str(c),
            Self::AnyValue(c) => write!(f, "any_value({c})"),
            Self::CountRows => f.write_str("count(*)"),
            Self::Count(c) => write!(f, "count({c})"),
            Self::Sum(c) => write!(f, "sum({c})"),
            Self::Min(c) => write!(f, "min({c})"),
            Self::Max(c) => write!(f, "max({c})"),
        }
    }
}

/// Strip one pair of surrounding double quotes, if present.
fn unquote(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

/// One projection entry: an expression plus an optional output alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionEntry {
    /// The expression to evaluate.
    pub expr: Expr,
    /// Output column name; defaults to the expression's canonical text.
    pub alias: Option<String>,
}

impl ProjectionEntry {
    /// Create an entry from a parsed expression.
    pub fn new(expr: Expr, alias: Option<String>) -> Self {
        Self { expr, alias }
    }

    /// The output column name this entry produces.
    pub fn output_name(&self) -> String {
        match &self.alias {
            Some(a) => a.clone(),
            None => self.expr.to_string(),
        }
    }
}

/// Ordered, immutable list of projection entries.
///
/// Shared by reference across all workers of one merge call. An empty projection is the
/// passthrough projection ("all columns"); deduplication rejects it with
/// [`MergeError::EmptyProjection`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    entries: Vec<ProjectionEntry>,
}

/// Raw `["expr", alias-or-null]` pair as found in the JSON spec form.
#[derive(Debug, Deserialize)]
struct EntrySpec(String, Option<String>);

impl Projection {
    /// The passthrough projection: keep all source columns unmodified.
    pub fn all() -> Self {
        Self::default()
    }

    /// Build a projection from already-parsed entries.
    pub fn new(entries: Vec<ProjectionEntry>) -> Self {
        Self { entries }
    }

    /// Build a column-reference projection from plain names.
    pub fn columns(names: &[&str]) -> Self {
        Self {
            entries: names
                .iter()
                .map(|n| ProjectionEntry::new(Expr::Column((*n).to_string()), None))
                .collect(),
        }
    }

    /// Parse `(expression, alias)` string pairs.
    pub fn parse_pairs(pairs: &[(&str, Option<&str>)]) -> MergeResult<Self> {
        let mut entries = Vec::with_capacity(pairs.len());
        for (expr, alias) in pairs {
            entries.push(ProjectionEntry::new(
                Expr::parse(expr)?,
                alias.map(|a| a.to_string()),
            ));
        }
        Ok(Self { entries })
    }

    /// Parse the JSON spec form `[["expr", null], ["any_value(y)", "y"], ...]`.
    pub fn parse_spec(json: &str) -> MergeResult<Self> {
        let raw: Vec<EntrySpec> =
            serde_json::from_str(json).map_err(|e| MergeError::Expression {
                expr: json.to_string(),
                message: format!("not a valid projection spec: {e}"),
            })?;

        let mut entries = Vec::with_capacity(raw.len());
        for EntrySpec(expr, alias) in raw {
            // Tolerate the literal string "null" for a missing alias, like the spec format did.
            let alias = alias.filter(|a| a != "null" && !a.trim().is_empty());
            entries.push(ProjectionEntry::new(Expr::parse(&expr)?, alias));
        }
        Ok(Self { entries })
    }

    /// Default dedup configuration: the relation's first column is the key and every other
    /// column keeps an arbitrary representative (`any_value`) under its own name.
    ///
    /// Kept alongside caller-supplied explicit combinators as a second named configuration;
    /// neither is preferred by the engine.
    pub fn first_key_any_value(relation: &Relation) -> MergeResult<Self> {
        let mut cols = relation.columns.iter();
        let key = cols.next().ok_or(MergeError::EmptyProjection)?;

        let mut entries = vec![ProjectionEntry::new(Expr::Column(key.clone()), None)];
        for col in cols {
            entries.push(ProjectionEntry::new(
                Expr::AnyValue(col.clone()),
                Some(col.clone()),
            ));
        }
        Ok(Self { entries })
    }

    /// Entries in order.
    pub fn entries(&self) -> &[ProjectionEntry] {
        &self.entries
    }

    /// True for the passthrough ("all columns") projection.
    pub fn is_passthrough(&self) -> bool {
        self.entries.is_empty()
    }

    /// Output column names this projection produces, or `None` for passthrough (the output
    /// columns are then whatever the source unit has).
    pub fn output_columns(&self) -> Option<Vec<String>> {
        if self.is_passthrough() {
            return None;
        }
        Some(self.entries.iter().map(|e| e.output_name()).collect())
    }
}
