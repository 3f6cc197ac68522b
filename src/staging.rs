//! Staging-relation lifecycle.
//!
//! Every ingestion worker materializes its unit into a private staging relation whose name
//! must be collision-free across concurrent workers, concurrent merge calls sharing one
//! backing store, and retries. [`StagingNamer`] hands out such names from a process-wide
//! call counter plus a call-scoped sequence; there is no process-wide registry of live
//! staging relations; ownership travels with the [`StagingHandle`].

use std::sync::atomic::{AtomicU64, Ordering};

use crate::store::RelationStore;

static NEXT_CALL_ID: AtomicU64 = AtomicU64::new(1);

/// Call-scoped factory for collision-free staging-relation names.
#[derive(Debug)]
pub struct StagingNamer {
    call_id: u64,
    seq: AtomicU64,
}

impl StagingNamer {
    /// Create a namer for one merge call.
    pub fn new() -> Self {
        Self {
            call_id: NEXT_CALL_ID.fetch_add(1, Ordering::Relaxed),
            seq: AtomicU64::new(0),
        }
    }

    /// Next staging name, e.g. `stg_3_0`, `stg_3_1`, ...
    pub fn next(&self) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("stg_{}_{}", self.call_id, seq)
    }
}

impl Default for StagingNamer {
    fn default() -> Self {
        Self::new()
    }
}

/// Ownership handle for one materialized staging relation.
///
/// Created by the worker that wrote the relation; handed to the merge coordinator, which
/// becomes responsible for dropping the relation on every exit path.
#[derive(Debug, Clone)]
pub struct StagingHandle {
    /// Staging relation name in the backing store.
    pub name: String,
    /// Label of the source unit this staging relation came from.
    pub unit: String,
    /// Projected column names.
    pub columns: Vec<String>,
    /// Number of staged rows.
    pub rows: u64,
}

/// Best-effort drop of a batch of relations; returns how many were actually dropped.
///
/// Used by the coordinator's cleanup path, which must succeed regardless of which relations
/// were already consumed or never created.
pub fn drop_all(store: &dyn RelationStore, names: impl IntoIterator<Item = String>) -> usize {
    let mut dropped = 0;
    for name in names {
        if let Ok(true) = store.drop_relation(&name) {
            dropped += 1;
        }
    }
    dropped
}
