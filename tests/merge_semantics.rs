use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use sheet_union::catalog::{Container, SourceUnit};
use sheet_union::merge::{merge_container, merge_units, MergeOptions};
use sheet_union::observe::{MergeEvent, MergeObserver};
use sheet_union::projection::Projection;
use sheet_union::store::{MemoryStore, RelationStore};
use sheet_union::types::{Relation, Value};
use sheet_union::MergeError;

fn tmp_csv(name: &str, content: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let path = std::env::temp_dir().join(format!("sheet-union-merge-{name}-{nanos}.csv"));
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(content.as_bytes()).unwrap();
    path
}

fn shared_store() -> Arc<dyn RelationStore> {
    Arc::new(MemoryStore::new())
}

#[test]
fn merges_fixture_files_and_sums_rows() {
    let store = shared_store();
    let container = Container::Files(vec![
        PathBuf::from("tests/fixtures/week_a.csv"),
        PathBuf::from("tests/fixtures/week_b.csv"),
    ]);

    let outcome = merge_container(
        &store,
        &container,
        &Projection::all(),
        "merged",
        &MergeOptions::default(),
    )
    .unwrap();

    assert_eq!(outcome.relation, "merged");
    assert_eq!(outcome.rows, 3);

    let rel = store.relation("merged").unwrap();
    assert_eq!(rel.columns, vec!["id", "name"]);
    assert_eq!(rel.row_count(), 3);

    // Staging relations are gone; only the destination remains.
    assert_eq!(store.relation_names(), vec!["merged"]);
}

#[test]
fn merge_applies_projection_and_renames() {
    let store = shared_store();
    let a = tmp_csv("proj-a", "id,name,junk\n1,Ada,x\n");
    let b = tmp_csv("proj-b", "id,name,junk\n2,Grace,y\n");
    let units = vec![SourceUnit::File(a.clone()), SourceUnit::File(b.clone())];

    let projection = Projection::parse_pairs(&[("id", None), ("name", Some("who"))]).unwrap();
    let outcome = merge_units(
        &store,
        &units,
        &projection,
        "people",
        &MergeOptions::default(),
    )
    .unwrap();

    assert_eq!(outcome.rows, 2);
    let rel = store.relation("people").unwrap();
    assert_eq!(rel.columns, vec!["id", "who"]);
    // Merge order is completion order; check contents, not positions.
    assert!(rel.rows.contains(&vec![Value::text("1"), Value::text("Ada")]));
    assert!(rel.rows.contains(&vec![Value::text("2"), Value::text("Grace")]));

    let _ = std::fs::remove_file(&a);
    let _ = std::fs::remove_file(&b);
}

#[test]
fn zero_units_merge_to_an_empty_relation() {
    let store = shared_store();
    let projection = Projection::columns(&["id", "name"]);

    let outcome = merge_units(&store, &[], &projection, "empty", &MergeOptions::default()).unwrap();

    assert_eq!(outcome.rows, 0);
    let rel = store.relation("empty").unwrap();
    assert_eq!(rel.columns, vec!["id", "name"]);
    assert_eq!(rel.row_count(), 0);
}

#[test]
fn zero_units_with_passthrough_projection_have_no_columns() {
    let store = shared_store();
    let outcome = merge_units(
        &store,
        &[],
        &Projection::all(),
        "empty",
        &MergeOptions::default(),
    )
    .unwrap();

    assert_eq!(outcome.rows, 0);
    assert!(store.relation("empty").unwrap().columns.is_empty());
}

#[test]
fn failing_unit_rolls_back_everything() {
    let store = shared_store();
    let a = tmp_csv("atomic-a", "A\n1\n");
    let b = tmp_csv("atomic-b", "A\n1\n");
    let missing = PathBuf::from("/definitely/not/here.csv");
    let units = vec![
        SourceUnit::File(a.clone()),
        SourceUnit::File(b.clone()),
        SourceUnit::File(missing.clone()),
    ];

    let err = merge_units(
        &store,
        &units,
        &Projection::all(),
        "merged",
        &MergeOptions::default(),
    )
    .unwrap_err();

    match err {
        MergeError::MergeFailed { unit, cause } => {
            assert_eq!(unit, missing.display().to_string());
            assert!(matches!(*cause, MergeError::SourceRead { .. }));
        }
        other => panic!("expected MergeFailed, got {other:?}"),
    }

    // The store looks exactly as it did before the call began.
    assert!(store.relation_names().is_empty());

    let _ = std::fs::remove_file(&a);
    let _ = std::fs::remove_file(&b);
}

#[test]
fn missing_projected_column_fails_and_rolls_back() {
    let store = shared_store();
    let a = tmp_csv("badproj-a", "id,name\n1,Ada\n");
    let b = tmp_csv("badproj-b", "id,other\n2,x\n");
    let units = vec![SourceUnit::File(a.clone()), SourceUnit::File(b.clone())];

    let err = merge_units(
        &store,
        &units,
        &Projection::columns(&["id", "name"]),
        "merged",
        &MergeOptions::default(),
    )
    .unwrap_err();

    match err {
        MergeError::MergeFailed { cause, .. } => {
            assert!(matches!(*cause, MergeError::Projection { .. }));
        }
        other => panic!("expected MergeFailed, got {other:?}"),
    }
    assert!(store.relation_names().is_empty());

    let _ = std::fs::remove_file(&a);
    let _ = std::fs::remove_file(&b);
}

#[test]
fn differing_unit_schemas_fail_with_schema_mismatch() {
    let store = shared_store();
    let a = tmp_csv("schema-a", "A,B\n1,2\n");
    let b = tmp_csv("schema-b", "A,C\n1,2\n");
    let units = vec![SourceUnit::File(a.clone()), SourceUnit::File(b.clone())];

    // One worker makes completion order deterministic: the second unit's append must hit
    // the mismatch, never a silent superset/subset merge.
    let options = MergeOptions {
        concurrency: 1,
        ..Default::default()
    };
    let err = merge_units(&store, &units, &Projection::all(), "merged", &options).unwrap_err();

    match err {
        MergeError::MergeFailed { unit, cause } => {
            // Whichever unit folds second is the one that hits the mismatch.
            assert!(unit == a.display().to_string() || unit == b.display().to_string());
            assert!(matches!(*cause, MergeError::SchemaMismatch { .. }));
        }
        other => panic!("expected MergeFailed, got {other:?}"),
    }
    assert!(store.relation_names().is_empty());

    let _ = std::fs::remove_file(&a);
    let _ = std::fs::remove_file(&b);
}

#[test]
fn concurrency_bound_is_respected() {
    let store = shared_store();
    let mut paths = Vec::new();
    let mut units = Vec::new();
    for i in 0..8 {
        let path = tmp_csv(&format!("bound-{i}"), "A\n1\n2\n");
        units.push(SourceUnit::File(path.clone()));
        paths.push(path);
    }

    let options = MergeOptions {
        concurrency: 2,
        ..Default::default()
    };
    let outcome = merge_units(&store, &units, &Projection::all(), "merged", &options).unwrap();

    assert_eq!(outcome.rows, 16);
    assert_eq!(outcome.metrics.units_finished, 8);
    assert!(
        outcome.metrics.max_active_workers <= 2,
        "max_active_workers={} exceeds bound",
        outcome.metrics.max_active_workers
    );

    for p in paths {
        let _ = std::fs::remove_file(&p);
    }
}

#[test]
fn destination_is_replaced_not_merged_into() {
    let store = shared_store();
    store
        .create(Relation::new(
            "merged",
            vec!["stale".into()],
            vec![vec![Value::text("old")]],
        ))
        .unwrap();

    let a = tmp_csv("replace-a", "A\n1\n");
    let units = vec![SourceUnit::File(a.clone())];
    let outcome = merge_units(
        &store,
        &units,
        &Projection::all(),
        "merged",
        &MergeOptions::default(),
    )
    .unwrap();

    assert_eq!(outcome.rows, 1);
    let rel = store.relation("merged").unwrap();
    assert_eq!(rel.columns, vec!["A"]);
    assert_eq!(rel.rows, vec![vec![Value::text("1")]]);

    let _ = std::fs::remove_file(&a);
}

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<MergeEvent>>,
}

impl MergeObserver for RecordingObserver {
    fn on_event(&self, event: &MergeEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[test]
fn observer_sees_per_unit_deltas_and_running_total() {
    let store = shared_store();
    let a = tmp_csv("obs-a", "A\n1\n2\n");
    let b = tmp_csv("obs-b", "A\n3\n");
    let units = vec![SourceUnit::File(a.clone()), SourceUnit::File(b.clone())];

    let observer = Arc::new(RecordingObserver::default());
    let options = MergeOptions {
        observer: Some(observer.clone()),
        ..Default::default()
    };
    let outcome = merge_units(&store, &units, &Projection::all(), "merged", &options).unwrap();
    assert_eq!(outcome.rows, 3);

    let events = observer.events.lock().unwrap();
    assert!(matches!(events.first(), Some(MergeEvent::MergeStarted { units: 2, .. })));

    let merged: Vec<(u64, u64)> = events
        .iter()
        .filter_map(|e| match e {
            MergeEvent::UnitMerged { rows, total_rows, .. } => Some((*rows, *total_rows)),
            _ => None,
        })
        .collect();
    assert_eq!(merged.len(), 2);
    // Per-unit deltas accumulate into the final total regardless of completion order.
    assert_eq!(merged.iter().map(|(rows, _)| rows).sum::<u64>(), 3);
    assert_eq!(merged.last().unwrap().1, 3);

    assert!(matches!(
        events.last(),
        Some(MergeEvent::MergeFinished { total_rows: 3, .. })
    ));

    let _ = std::fs::remove_file(&a);
    let _ = std::fs::remove_file(&b);
}
