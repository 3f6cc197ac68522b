//! Merge coordination: bounded fan-out, completion-order fold, all-or-nothing cleanup.
//!
//! [`merge_units`] spawns one ingestion worker per source unit on a bounded thread pool and
//! folds completed staging relations into the destination relation **in completion order**
//! (not submission order). The destination does not exist until the first worker succeeds
//! and is torn down, together with every staging relation, the moment any worker fails:
//! after an error the backing store looks exactly as it did before the call.
//!
//! The coordinator's fold loop is the destination's only writer, so the destination needs
//! no lock of its own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use rayon::ThreadPoolBuilder;

use crate::catalog::{self, Container, SourceUnit};
use crate::error::{MergeError, MergeResult};
use crate::observe::{MergeEvent, MergeMetrics, MergeMetricsSnapshot, MergeObserver};
use crate::projection::Projection;
use crate::staging::{self, StagingHandle, StagingNamer};
use crate::store::RelationStore;
use crate::types::Relation;
use crate::worker;

/// Cooperative cancellation token shared by the coordinator and its workers.
///
/// Cancelling is best-effort: workers poll the token at I/O boundaries, so in-flight work
/// may still complete, but its results are discarded and cleaned up by the coordinator.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// True once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Options controlling one merge call.
#[derive(Clone)]
pub struct MergeOptions {
    /// Upper bound on concurrently running ingestion workers.
    ///
    /// Clamped to the number of source units; `0` is treated as `1`.
    pub concurrency: usize,
    /// Optional observer for merge events.
    pub observer: Option<Arc<dyn MergeObserver>>,
    /// Cancellation token; clone it before the call to cancel from outside.
    pub cancel: CancelToken,
}

impl std::fmt::Debug for MergeOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeOptions")
            .field("concurrency", &self.concurrency)
            .field("observer_set", &self.observer.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl Default for MergeOptions {
    fn default() -> Self {
        let n = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            concurrency: n,
            observer: None,
            cancel: CancelToken::new(),
        }
    }
}

/// Successful merge result.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// Name of the destination relation in the backing store.
    pub relation: String,
    /// Total number of merged rows.
    pub rows: u64,
    /// Counters collected during the run.
    pub metrics: MergeMetricsSnapshot,
}

/// Enumerate `container`'s units and merge them into `destination`.
///
/// Convenience entrypoint equal to [`catalog::enumerate_units`] followed by
/// [`merge_units`]. A container with zero units merges to an empty destination relation
/// and is not an error.
pub fn merge_container(
    store: &Arc<dyn RelationStore>,
    container: &Container,
    projection: &Projection,
    destination: &str,
    options: &MergeOptions,
) -> MergeResult<MergeOutcome> {
    let units = catalog::enumerate_units(container)?;
    merge_units(store, &units, projection, destination, options)
}

/// Merge all `units` into one destination relation, all-or-nothing.
///
/// Workers run on a bounded pool of `min(options.concurrency, units.len())` threads; their
/// results are folded in completion order. On the first failure the remaining workers are
/// cancelled, every staging relation and the destination are dropped, and a single
/// [`MergeError::MergeFailed`] (or [`MergeError::Cancelled`] for caller-initiated aborts)
/// is returned.
pub fn merge_units(
    store: &Arc<dyn RelationStore>,
    units: &[SourceUnit],
    projection: &Projection,
    destination: &str,
    options: &MergeOptions,
) -> MergeResult<MergeOutcome> {
    let start = Instant::now();
    let metrics = Arc::new(MergeMetrics::new());
    let workers = effective_concurrency(options.concurrency, units.len());

    emit(
        options,
        MergeEvent::MergeStarted {
            units: units.len(),
            workers,
        },
    );

    if options.cancel.is_cancelled() {
        return Err(MergeError::Cancelled);
    }

    // A previous relation under the destination name is replaced, never merged into.
    store.drop_relation(destination)?;

    if units.is_empty() {
        let columns = projection.output_columns().unwrap_or_default();
        store.create(Relation::empty(destination, columns))?;
        let snapshot = metrics.snapshot();
        emit(
            options,
            MergeEvent::MergeFinished {
                total_rows: 0,
                elapsed: start.elapsed(),
                metrics: snapshot,
            },
        );
        return Ok(MergeOutcome {
            relation: destination.to_string(),
            rows: 0,
            metrics: snapshot,
        });
    }

    let namer = Arc::new(StagingNamer::new());
    let pool = ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .expect("failed to build merge worker pool");

    type UnitResult = (String, Duration, MergeResult<StagingHandle>);
    let (tx, rx) = mpsc::channel::<UnitResult>();

    for unit in units {
        let tx = tx.clone();
        let store = Arc::clone(store);
        let unit = unit.clone();
        let projection = projection.clone();
        let namer = Arc::clone(&namer);
        let cancel = options.cancel.clone();
        let metrics = Arc::clone(&metrics);

        pool.spawn(move || {
            metrics.on_worker_start();
            let started = Instant::now();
            let result =
                worker::ingest_unit(store.as_ref(), &unit, &projection, &namer, &cancel);
            metrics.on_worker_end();
            // The send is the worker's final store-visible action; the coordinator waits
            // for every send before it cleans up, so no staging relation can outlive it.
            let _ = tx.send((unit.label(), started.elapsed(), result));
        });
    }
    drop(tx);

    let mut staging_names: Vec<String> = Vec::new();
    let mut destination_created = false;
    let mut total_rows: u64 = 0;
    let mut failure: Option<(String, MergeError)> = None;

    for _ in 0..units.len() {
        let (unit, elapsed, result) = rx
            .recv()
            .expect("worker dropped its completion channel without sending");

        if failure.is_none() && options.cancel.is_cancelled() {
            failure = Some((unit.clone(), MergeError::Cancelled));
        }

        match result {
            Ok(handle) => {
                staging_names.push(handle.name.clone());
                if failure.is_some() {
                    // Result arrived after the abort decision; keep the name for cleanup
                    // and discard the data.
                    continue;
                }

                emit(
                    options,
                    MergeEvent::UnitIngested {
                        unit: unit.clone(),
                        rows: handle.rows,
                        elapsed,
                    },
                );

                match fold_into(store.as_ref(), destination, &handle, destination_created) {
                    Ok(appended) => {
                        destination_created = true;
                        total_rows += appended;
                        metrics.on_rows_merged(appended);
                        emit(
                            options,
                            MergeEvent::UnitMerged {
                                unit,
                                rows: appended,
                                total_rows,
                            },
                        );
                    }
                    Err(e) => {
                        emit(
                            options,
                            MergeEvent::UnitFailed {
                                unit: unit.clone(),
                                message: e.to_string(),
                            },
                        );
                        options.cancel.cancel();
                        failure = Some((unit, e));
                    }
                }
            }
            Err(MergeError::Cancelled) if failure.is_some() => {
                // Expected tail of an abort: remaining workers observed the token.
            }
            Err(e) => {
                if failure.is_none() {
                    emit(
                        options,
                        MergeEvent::UnitFailed {
                            unit: unit.clone(),
                            message: e.to_string(),
                        },
                    );
                    options.cancel.cancel();
                    failure = Some((unit, e));
                }
            }
        }
    }

    if let Some((unit, cause)) = failure {
        let mut dropped = staging::drop_all(store.as_ref(), staging_names);
        if destination_created {
            if let Ok(true) = store.drop_relation(destination) {
                dropped += 1;
            }
        }
        emit(options, MergeEvent::CleanupFinished { dropped });

        return Err(match cause {
            MergeError::Cancelled => MergeError::Cancelled,
            cause => MergeError::MergeFailed {
                unit,
                cause: Box::new(cause),
            },
        });
    }

    // Full success: staging rows now live in the destination.
    let dropped = staging::drop_all(store.as_ref(), staging_names);
    emit(options, MergeEvent::CleanupFinished { dropped });

    let snapshot = metrics.snapshot();
    emit(
        options,
        MergeEvent::MergeFinished {
            total_rows,
            elapsed: start.elapsed(),
            metrics: snapshot,
        },
    );

    Ok(MergeOutcome {
        relation: destination.to_string(),
        rows: total_rows,
        metrics: snapshot,
    })
}

/// First success creates the destination from the staging schema; later successes append.
/// Exactly one caller (the coordinator's fold loop) ever mutates the destination.
fn fold_into(
    store: &dyn RelationStore,
    destination: &str,
    handle: &StagingHandle,
    destination_created: bool,
) -> MergeResult<u64> {
    if !destination_created {
        store.create(Relation::empty(destination, handle.columns.clone()))?;
    }
    store.append(destination, &handle.name)
}

fn effective_concurrency(requested: usize, units: usize) -> usize {
    requested.max(1).min(units.max(1))
}

fn emit(options: &MergeOptions, event: MergeEvent) {
    if let Some(obs) = &options.observer {
        obs.on_event(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::effective_concurrency;

    #[test]
    fn concurrency_is_clamped_to_units_and_floored_at_one() {
        assert_eq!(effective_concurrency(0, 5), 1);
        assert_eq!(effective_concurrency(4, 2), 2);
        assert_eq!(effective_concurrency(4, 16), 4);
        assert_eq!(effective_concurrency(3, 0), 1);
    }
}
