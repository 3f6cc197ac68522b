use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use sheet_union::catalog::SourceUnit;
use sheet_union::dedupe::{dedupe_rows, unique_keys};
use sheet_union::merge::{merge_units, MergeOptions};
use sheet_union::projection::Projection;
use sheet_union::store::{MemoryStore, RelationStore};
use sheet_union::types::Value;
use sheet_union::MergeError;

fn tmp_csv(name: &str, content: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let path = std::env::temp_dir().join(format!("sheet-union-dedupe-{name}-{nanos}.csv"));
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(content.as_bytes()).unwrap();
    path
}

/// Three units with rows {A:1}, {A:1}, {A:2}: merging yields 3 rows, and deduplicating on
/// key `A` with a `count(*)` combinator yields {A:1, count:2} and {A:2, count:1}.
#[test]
fn merge_then_count_dedupe_end_to_end() {
    let store: Arc<dyn RelationStore> = Arc::new(MemoryStore::new());
    let mut paths = Vec::new();
    let mut units = Vec::new();
    for (i, row) in ["1", "1", "2"].iter().enumerate() {
        let path = tmp_csv(&format!("e2e-{i}"), &format!("A\n{row}\n"));
        units.push(SourceUnit::File(path.clone()));
        paths.push(path);
    }

    let outcome = merge_units(
        &store,
        &units,
        &Projection::columns(&["A"]),
        "merged",
        &MergeOptions::default(),
    )
    .unwrap();
    assert_eq!(outcome.rows, 3);

    let projection =
        Projection::parse_pairs(&[("A", None), ("count(*)", Some("count"))]).unwrap();
    let unique = unique_keys(store.as_ref(), "merged", &projection).unwrap();

    assert_eq!(unique.relation, "u_merged");
    assert_eq!(unique.rows_before, 3);
    assert_eq!(unique.rows_after, 2);

    let rel = store.relation("u_merged").unwrap();
    assert_eq!(rel.columns, vec!["A", "count"]);
    assert_eq!(
        rel.rows,
        vec![
            vec![Value::text("1"), Value::text("2")],
            vec![Value::text("2"), Value::text("1")],
        ]
    );

    for p in paths {
        let _ = std::fs::remove_file(&p);
    }
}

#[test]
fn dedupe_with_any_value_is_idempotent_on_unique_data() {
    let store = MemoryStore::new();
    store
        .create(sheet_union::types::Relation::new(
            "merged",
            vec!["id".into(), "n1".into()],
            vec![
                vec![Value::text("1"), Value::text("x")],
                vec![Value::text("2"), Value::Null],
                vec![Value::text("3"), Value::text("z")],
            ],
        ))
        .unwrap();

    let projection =
        Projection::parse_pairs(&[("id", None), ("any_value(n1)", Some("n1"))]).unwrap();

    let first = unique_keys(&store, "merged", &projection).unwrap();
    assert_eq!(first.rows_before, 3);
    assert_eq!(first.rows_after, 3);

    let second = unique_keys(&store, "u_merged", &projection).unwrap();
    assert_eq!(second.relation, "u_u_merged");
    assert_eq!(second.rows_after, 3);

    let once = store.relation("u_merged").unwrap();
    let twice = store.relation("u_u_merged").unwrap();
    assert_eq!(once.columns, twice.columns);
    assert_eq!(once.rows, twice.rows);
}

#[test]
fn default_configuration_keys_on_first_column() {
    let store = MemoryStore::new();
    store
        .create(sheet_union::types::Relation::new(
            "merged",
            vec!["id".into(), "n1".into(), "n2".into()],
            vec![
                vec![Value::text("1"), Value::text("a"), Value::Null],
                vec![Value::text("1"), Value::Null, Value::text("b")],
            ],
        ))
        .unwrap();

    let merged = store.relation("merged").unwrap();
    let projection = Projection::first_key_any_value(&merged).unwrap();
    let unique = unique_keys(&store, "merged", &projection).unwrap();
    assert_eq!(unique.rows_after, 1);

    let rel = store.relation("u_merged").unwrap();
    assert_eq!(rel.columns, vec!["id", "n1", "n2"]);
    // any_value keeps the first non-null of each group member column.
    assert_eq!(
        rel.rows,
        vec![vec![Value::text("1"), Value::text("a"), Value::text("b")]]
    );
}

#[test]
fn explicit_combinators_mix_sum_and_representatives() {
    let store = MemoryStore::new();
    store
        .create(sheet_union::types::Relation::new(
            "spend",
            vec!["account".into(), "owner".into(), "cost".into()],
            vec![
                vec![Value::text("a1"), Value::text("Ada"), Value::text("10")],
                vec![Value::text("a1"), Value::text("Ada"), Value::text("2.5")],
                vec![Value::text("a2"), Value::text("Grace"), Value::text("7")],
            ],
        ))
        .unwrap();

    let projection = Projection::parse_spec(
        r#"[["account", null], ["any_value(owner)", "owner"], ["sum(cost)", "cost"]]"#,
    )
    .unwrap();
    let unique = unique_keys(&store, "spend", &projection).unwrap();
    assert_eq!(unique.rows_after, 2);

    let rel = store.relation("u_spend").unwrap();
    assert_eq!(
        rel.rows,
        vec![
            vec![Value::text("a1"), Value::text("Ada"), Value::text("12.5")],
            vec![Value::text("a2"), Value::text("Grace"), Value::text("7")],
        ]
    );
}

#[test]
fn unique_keys_rejects_empty_projection() {
    let store = MemoryStore::new();
    store
        .create(sheet_union::types::Relation::empty("merged", vec!["id".into()]))
        .unwrap();

    assert!(matches!(
        unique_keys(&store, "merged", &Projection::all()).unwrap_err(),
        MergeError::EmptyProjection
    ));
    // The failed call must not leave a half-written output relation behind.
    assert_eq!(store.relation_names(), vec!["merged"]);
}

#[test]
fn unique_keys_requires_the_input_relation() {
    let store = MemoryStore::new();
    let projection = Projection::columns(&["id"]);
    assert!(matches!(
        unique_keys(&store, "missing", &projection).unwrap_err(),
        MergeError::UnknownRelation { .. }
    ));
}

#[test]
fn dedupe_rows_is_pure_and_leaves_input_unchanged() {
    let input = sheet_union::types::Relation::new(
        "t",
        vec!["k".into()],
        vec![vec![Value::text("b")], vec![Value::text("a")], vec![Value::text("b")]],
    );
    let projection = Projection::columns(&["k"]);

    let out = dedupe_rows(&input, &projection, "u_t").unwrap();
    assert_eq!(out.name, "u_t");
    assert_eq!(
        out.rows,
        vec![vec![Value::text("a")], vec![Value::text("b")]]
    );
    assert_eq!(input.row_count(), 3);
}
