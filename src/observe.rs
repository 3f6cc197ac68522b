//! Observer hooks and counters for merge runs.
//!
//! Row-count accounting is an observational side effect of the merge, not part of its
//! correctness contract: the coordinator reports per-unit deltas and a running total as
//! worker results are folded in, and keeps live counters that tests can use to verify the
//! concurrency bound without timing assumptions.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Events emitted by the merge coordinator.
#[derive(Debug, Clone)]
pub enum MergeEvent {
    MergeStarted { units: usize, workers: usize },
    UnitIngested { unit: String, rows: u64, elapsed: Duration },
    UnitMerged { unit: String, rows: u64, total_rows: u64 },
    UnitFailed { unit: String, message: String },
    CleanupFinished { dropped: usize },
    MergeFinished {
        total_rows: u64,
        elapsed: Duration,
        metrics: MergeMetricsSnapshot,
    },
}

/// Observer hook for merge events.
///
/// Events are emitted from the coordinator's fold loop only, never from worker threads.
pub trait MergeObserver: Send + Sync {
    fn on_event(&self, event: &MergeEvent);
}

/// Logs merge events to stderr.
#[derive(Debug, Default)]
pub struct StdErrMergeObserver;

impl MergeObserver for StdErrMergeObserver {
    fn on_event(&self, event: &MergeEvent) {
        match event {
            MergeEvent::MergeStarted { units, workers } => {
                eprintln!("[merge] start units={units} workers={workers}");
            }
            MergeEvent::UnitIngested { unit, rows, elapsed } => {
                eprintln!("[merge] ingested {unit}: {rows} rows ({elapsed:?})");
            }
            MergeEvent::UnitMerged { unit, rows, total_rows } => {
                eprintln!("[merge] {unit}: +{rows} rows, total {total_rows}");
            }
            MergeEvent::UnitFailed { unit, message } => {
                eprintln!("[merge] FAILED {unit}: {message}");
            }
            MergeEvent::CleanupFinished { dropped } => {
                eprintln!("[merge] cleanup dropped {dropped} relations");
            }
            MergeEvent::MergeFinished { total_rows, elapsed, metrics } => {
                eprintln!("[merge] done total={total_rows} ({elapsed:?}) {metrics}");
            }
        }
    }
}

/// Live counters for one merge run.
///
/// Workers bump the active-worker gauge around their ingestion; the coordinator adds merged
/// rows as results are folded in. Callers get a [`MergeMetricsSnapshot`] in the outcome and
/// in [`MergeEvent::MergeFinished`].
#[derive(Debug, Default)]
pub struct MergeMetrics {
    units_started: AtomicU64,
    units_finished: AtomicU64,
    rows_merged: AtomicU64,
    active_workers: AtomicUsize,
    max_active_workers: AtomicUsize,
}

impl MergeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_worker_start(&self) {
        let _ = self.units_started.fetch_add(1, Ordering::SeqCst);
        let now = self.active_workers.fetch_add(1, Ordering::SeqCst) + 1;
        update_max_usize(&self.max_active_workers, now);
    }

    pub fn on_worker_end(&self) {
        let _ = self.units_finished.fetch_add(1, Ordering::SeqCst);
        let _ = self.active_workers.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn on_rows_merged(&self, rows: u64) {
        let _ = self.rows_merged.fetch_add(rows, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> MergeMetricsSnapshot {
        MergeMetricsSnapshot {
            units_started: self.units_started.load(Ordering::SeqCst),
            units_finished: self.units_finished.load(Ordering::SeqCst),
            rows_merged: self.rows_merged.load(Ordering::SeqCst),
            max_active_workers: self.max_active_workers.load(Ordering::SeqCst),
        }
    }
}

fn update_max_usize(dst: &AtomicUsize, now: usize) {
    loop {
        let cur = dst.load(Ordering::SeqCst);
        if now <= cur {
            break;
        }
        if dst
            .compare_exchange(cur, now, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            break;
        }
    }
}

/// Immutable snapshot of [`MergeMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeMetricsSnapshot {
    pub units_started: u64,
    pub units_finished: u64,
    pub rows_merged: u64,
    pub max_active_workers: usize,
}

impl fmt::Display for MergeMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "units={}/{}, rows_merged={}, max_active_workers={}",
            self.units_finished, self.units_started, self.rows_merged, self.max_active_workers
        )
    }
}
