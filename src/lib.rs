//! `sheet-union` merges same-schema tabular sources (the sheets of one workbook, or a list
//! of CSV files) into a single named relation, concurrently and all-or-nothing, and then
//! collapses the merged relation into a unique-keyed relation via a grouping
//! [`projection::Projection`].
//!
//! The engine is a library-level component: it receives already-resolved source locations,
//! a projection, a destination name and a concurrency bound, and returns a materialized
//! relation (by name, plus a row count) or a typed failure. File discovery, interactive
//! prompting, output formats and downstream SQL aggregation are the calling layer's
//! business.
//!
//! ## How a merge runs
//!
//! 1. [`catalog::enumerate_units`] lists a container's source units in natural order.
//! 2. [`merge::merge_units`] spawns one ingestion worker per unit on a bounded pool; each
//!    worker stages its unit's projected rows under a collision-free name.
//! 3. The coordinator folds completed staging relations into the destination **in
//!    completion order**. One failure anywhere cancels the rest and removes every relation
//!    the call created; the store looks untouched after an error.
//! 4. [`dedupe::unique_keys`] groups the merged relation by a key column and folds each
//!    group with combinators such as `any_value(c)`, `count(*)` or `sum(c)`.
//!
//! Every cell is text: source cell types (number vs text vs blank) never cause a mismatch
//! between units, and numeric interpretation is deferred to downstream consumers.
//!
//! ## Quick example: merge CSV units, then dedup
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! use sheet_union::catalog::Container;
//! use sheet_union::dedupe::unique_keys;
//! use sheet_union::merge::{merge_container, MergeOptions};
//! use sheet_union::projection::Projection;
//! use sheet_union::store::{MemoryStore, RelationStore};
//!
//! # fn main() -> Result<(), sheet_union::MergeError> {
//! let store: Arc<dyn RelationStore> = Arc::new(MemoryStore::new());
//! let container = Container::Files(vec![
//!     PathBuf::from("week1.csv"),
//!     PathBuf::from("week2.csv"),
//! ]);
//!
//! // Keep two columns, renaming one; all sheets/files must agree on them.
//! let projection = Projection::parse_pairs(&[("id", None), ("客户名称", Some("customer"))])?;
//! let outcome = merge_container(&store, &container, &projection, "accounts", &MergeOptions::default())?;
//! println!("merged {} rows into {}", outcome.rows, outcome.relation);
//!
//! // One row per id, keeping an arbitrary representative customer name.
//! let dedup = Projection::parse_pairs(&[("id", None), ("any_value(customer)", Some("customer"))])?;
//! let unique = unique_keys(store.as_ref(), &outcome.relation, &dedup)?;
//! println!("{} rows -> {} unique", unique.rows_before, unique.rows_after);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`catalog`]: containers and source-unit enumeration
//! - [`projection`]: projection expressions, aliases and the JSON spec form
//! - [`worker`] + [`source`]: per-unit ingestion into staging relations
//! - [`merge`]: the bounded-concurrency, all-or-nothing merge coordinator
//! - [`dedupe`]: key-based deduplication
//! - [`store`]: the backing-store contract and the in-process [`store::MemoryStore`]
//! - [`staging`]: collision-free staging names and cleanup helpers
//! - [`observe`]: merge events, observers and run counters
//! - [`error`]: the shared error type

pub mod catalog;
pub mod dedupe;
pub mod error;
pub mod merge;
pub mod observe;
pub mod projection;
pub mod source;
pub mod staging;
pub mod store;
pub mod types;
pub mod worker;

pub use error::{MergeError, MergeResult};
