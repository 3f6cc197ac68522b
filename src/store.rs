//! Backing-store contract and the in-process implementation.
//!
//! The engine requires exactly four capabilities from its storage collaborator: create a
//! named relation, append one relation's rows into another with matching schema, drop a
//! relation by name, and group/aggregate a relation into a new one. [`RelationStore`] is
//! that surface (plus read-back accessors used by the engine's return path and by tests),
//! and [`MemoryStore`] is the in-process implementation.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::dedupe::dedupe_rows;
use crate::error::{MergeError, MergeResult};
use crate::projection::Projection;
use crate::types::Relation;

/// Shared relational store the engine stages, merges and deduplicates through.
///
/// Implementations must be safe to call from multiple ingestion workers at once; every
/// method is a single atomic operation on the store's namespace.
pub trait RelationStore: Send + Sync {
    /// Create `relation` under its own name.
    ///
    /// Fails with [`MergeError::DuplicateRelation`] if the name is taken.
    fn create(&self, relation: Relation) -> MergeResult<()>;

    /// Append all rows of `source` into `destination`.
    ///
    /// Returns the number of appended rows. Fails with [`MergeError::SchemaMismatch`] when
    /// the two relations' column sets differ, and [`MergeError::UnknownRelation`] when
    /// either name is missing.
    fn append(&self, destination: &str, source: &str) -> MergeResult<u64>;

    /// Drop a relation by name. Returns `false` if no such relation existed.
    fn drop_relation(&self, name: &str) -> MergeResult<bool>;

    /// Group `source` by the projection's key and materialize one row per distinct key
    /// into a new relation `destination`.
    ///
    /// Returns the number of rows in the new relation.
    fn group_into(
        &self,
        source: &str,
        destination: &str,
        projection: &Projection,
    ) -> MergeResult<u64>;

    /// Read back a relation by name.
    fn relation(&self, name: &str) -> MergeResult<Relation>;

    /// All relation names currently present, sorted.
    fn relation_names(&self) -> Vec<String>;
}

/// In-process [`RelationStore`] backed by a mutex-guarded map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    relations: Mutex<HashMap<String, Relation>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RelationStore for MemoryStore {
    fn create(&self, relation: Relation) -> MergeResult<()> {
        let mut map = self.relations.lock().expect("store mutex poisoned");
        if map.contains_key(&relation.name) {
            return Err(MergeError::DuplicateRelation {
                name: relation.name.clone(),
            });
        }
        map.insert(relation.name.clone(), relation);
        Ok(())
    }

    fn append(&self, destination: &str, source: &str) -> MergeResult<u64> {
        let mut map = self.relations.lock().expect("store mutex poisoned");

        let src = map
            .get(source)
            .ok_or_else(|| MergeError::UnknownRelation {
                name: source.to_string(),
            })?
            .clone();

        let dst = map
            .get_mut(destination)
            .ok_or_else(|| MergeError::UnknownRelation {
                name: destination.to_string(),
            })?;

        if !dst.same_columns(&src) {
            return Err(MergeError::SchemaMismatch {
                message: format!(
                    "cannot append '{source}' into '{destination}': columns {:?} do not match {:?}",
                    src.columns, dst.columns
                ),
            });
        }

        let appended = src.rows.len() as u64;
        dst.rows.extend(src.rows);
        Ok(appended)
    }

    fn drop_relation(&self, name: &str) -> MergeResult<bool> {
        let mut map = self.relations.lock().expect("store mutex poisoned");
        Ok(map.remove(name).is_some())
    }

    fn group_into(
        &self,
        source: &str,
        destination: &str,
        projection: &Projection,
    ) -> MergeResult<u64> {
        // Snapshot the input outside the lock: grouping is the expensive part and must not
        // block concurrent staging writes from other calls.
        let input = self.relation(source)?;
        let grouped = dedupe_rows(&input, projection, destination)?;
        let rows = grouped.row_count() as u64;
        self.create(grouped)?;
        Ok(rows)
    }

    fn relation(&self, name: &str) -> MergeResult<Relation> {
        let map = self.relations.lock().expect("store mutex poisoned");
        map.get(name)
            .cloned()
            .ok_or_else(|| MergeError::UnknownRelation {
                name: name.to_string(),
            })
    }

    fn relation_names(&self) -> Vec<String> {
        let map = self.relations.lock().expect("store mutex poisoned");
        let mut names: Vec<String> = map.keys().cloned().collect();
        names.sort();
        names
    }
}
