//! End-to-end path queries over in-memory stores.
//!
//! Run with: cargo test -p trellis-engine --test path_tests

use std::collections::BTreeSet;
use std::sync::Arc;

use trellis_engine::{
    CompareOp, EngineConfig, Path, QueryError, Session, Value, ValueKind, TOP_RESULT_TAG,
};
use trellis_store::fixtures::social_graph;
use trellis_store::MemStore;

fn social() -> Session {
    Session::new(Arc::new(social_graph()))
}

/// Display forms, so sets compare independently of value ordering.
fn iris(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| Value::iri(*n).to_string()).collect()
}

fn value_set(session: &Session, path: &Path) -> BTreeSet<String> {
    session
        .values(path, None)
        .unwrap()
        .iter()
        .map(Value::to_string)
        .collect()
}

// ============================================================================
// Core scenarios
// ============================================================================

#[test]
fn test_out_step_yields_both_targets_without_tags() {
    let mut store = MemStore::new();
    store.add_triple("<A>", "<knows>", "<B>");
    store.add_triple("<A>", "<knows>", "<C>");
    store.add_triple("<B>", "<knows>", "<D>");
    let session = Session::new(Arc::new(store));

    let rows = session
        .collect(&Path::vertex(["<A>"]).out("<knows>"), None)
        .unwrap();
    let ids: BTreeSet<String> = rows
        .iter()
        .map(|r| session.store().resolve(r.id).unwrap().to_string())
        .collect();
    assert_eq!(ids, iris(&["B", "C"]));
    for row in &rows {
        assert_eq!(row.tags.len(), 1);
        assert_eq!(row.get(TOP_RESULT_TAG), Some(row.id));
    }
}

#[test]
fn test_intersection_keeps_only_shared_target() {
    let mut store = MemStore::new();
    store.add_triple("<A>", "<knows>", "<E>");
    store.add_triple("<B>", "<knows>", "<F>");
    store.add_triple("<C>", "<knows>", "<G>");
    store.add_triple("<D>", "<knows>", "<E>");
    store.add_triple("<D>", "<knows>", "<H>");
    let session = Session::new(Arc::new(store));

    let left = Path::vertex(["<A>", "<B>", "<C>"]).out("<knows>");
    let right = Path::vertex(["<D>"]).out("<knows>");
    assert_eq!(value_set(&session, &left.and(&right)), iris(&["E"]));
}

#[test]
fn test_mapper_drops_values_missing_from_store() {
    let mut store = MemStore::new();
    store.add_value(5i64);
    store.add_value(3i64);
    store.add_value(6i64);
    let session = Session::new(Arc::new(store));

    let doubled = Path::vertex([5i64, 3i64]).map(|v| match v {
        Value::Int(i) => Ok(Value::Int(i * 2)),
        other => anyhow::bail!("not an integer: {other}"),
    });
    assert_eq!(session.values(&doubled, None).unwrap(), vec![Value::Int(6)]);
}

#[test]
fn test_cancellation_mid_scan() {
    let session = social();
    let shape = session.prepare(&Path::all()).unwrap();
    let cancel = session.cancel_token().clone();

    let mut it = shape.iterate();
    assert!(it.next(&cancel));
    cancel.cancel();
    assert!(!it.next(&cancel));
    assert!(it.err().is_some_and(QueryError::is_cancellation));
    it.close().unwrap();
}

// ============================================================================
// Traversal
// ============================================================================

#[test]
fn test_out_in_both() {
    let s = social();
    assert_eq!(
        value_set(&s, &Path::vertex(["<charlie>"]).out("<follows>")),
        iris(&["bob", "dani"])
    );
    assert_eq!(
        value_set(&s, &Path::vertex(["<bob>"]).in_("<follows>")),
        iris(&["alice", "charlie", "dani"])
    );
    assert_eq!(
        value_set(&s, &Path::vertex(["<fred>"]).both("<follows>")),
        iris(&["bob", "emily", "greg"])
    );
}

#[test]
fn test_unknown_seed_is_empty_not_error() {
    let s = social();
    assert!(s.values(&Path::vertex(["<nobody>"]).out("<follows>"), None).unwrap().is_empty());
    assert!(s.values(&Path::vertex(["<alice>"]).out("<unknown>"), None).unwrap().is_empty());
}

#[test]
fn test_via_path_restricts_predicates() {
    let s = social();
    let preds = Path::vertex(["<predicates>"]).out("<are>");
    let all_out = Path::vertex(["<dani>"]).out(&preds);
    let mut expected = iris(&["bob", "greg"]);
    expected.insert(Value::str("cool_person").to_string());
    assert_eq!(value_set(&s, &all_out), expected);
}

#[test]
fn test_has_and_has_reverse() {
    let s = social();
    let cool = Path::all().has("<status>", ["cool_person"]);
    assert_eq!(value_set(&s, &cool), iris(&["bob", "dani", "greg"]));

    let followed_by_dani = Path::all().has_reverse("<follows>", ["<dani>"]);
    assert_eq!(value_set(&s, &followed_by_dani), iris(&["bob", "greg"]));

    let anyone_followed = Path::vertex(["<alice>", "<emily>", "<fred>"])
        .has_reverse("<follows>", Vec::<Value>::new());
    assert_eq!(value_set(&s, &anyone_followed), iris(&["fred"]));
}

#[test]
fn test_set_algebra() {
    let s = social();
    let people = Path::vertex(["<alice>", "<bob>", "<charlie>"]);
    assert_eq!(
        value_set(&s, &people.except(&Path::vertex(["<bob>"]))),
        iris(&["alice", "charlie"])
    );
    assert_eq!(
        value_set(&s, &Path::vertex(["<alice>"]).or(&Path::vertex(["<greg>"]))),
        iris(&["alice", "greg"])
    );
    assert_eq!(
        value_set(&s, &people.is(["<bob>", "<greg>"])),
        iris(&["bob"])
    );
}

#[test]
fn test_follow_and_follow_reverse() {
    let s = social();
    let two_hops = Path::morphism().out("<follows>").out("<follows>");
    assert_eq!(
        value_set(&s, &Path::vertex(["<alice>"]).follow(&two_hops)),
        iris(&["fred"])
    );
    assert_eq!(
        value_set(&s, &Path::vertex(["<greg>"]).follow_reverse(&two_hops)),
        iris(&["bob", "charlie", "emily"])
    );
}

#[test]
fn test_follow_recursive_depth() {
    let s = social();
    let step = Path::morphism().out("<follows>");
    let start = Path::vertex(["<alice>"]);
    assert_eq!(
        value_set(&s, &start.follow_recursive(&step, 0, Vec::<String>::new())),
        iris(&["bob", "fred", "greg"])
    );
    assert_eq!(
        value_set(&s, &start.follow_recursive(&step, 2, Vec::<String>::new())),
        iris(&["bob", "fred"])
    );
}

#[test]
fn test_label_context_scopes_steps() {
    let s = social();
    let smart = Path::all()
        .label_context("<smart_graph>")
        .in_("<status>")
        .unique();
    assert_eq!(value_set(&s, &smart), iris(&["emily", "greg"]));

    let reset = Path::all()
        .label_context("<smart_graph>")
        .label_context(trellis_engine::Via::All)
        .in_("<status>")
        .unique();
    assert_eq!(value_set(&s, &reset), iris(&["bob", "dani", "emily", "greg"]));
}

#[test]
fn test_predicates_and_labels() {
    let s = social();
    assert_eq!(
        value_set(&s, &Path::vertex(["<dani>"]).out_predicates()),
        iris(&["follows", "status"])
    );
    assert_eq!(
        value_set(&s, &Path::vertex(["<bob>"]).in_predicates()),
        iris(&["follows"])
    );
    assert_eq!(
        value_set(&s, &Path::vertex(["<emily>"]).labels()),
        iris(&["smart_graph"])
    );
}

// ============================================================================
// Tags and paths
// ============================================================================

#[test]
fn test_tags_survive_steps() {
    let s = social();
    let path = Path::vertex(["<charlie>"])
        .tag(["source"])
        .out_tagged("<follows>", ["pred"]);
    let rows = s.collect(&path, None).unwrap();
    assert_eq!(rows.len(), 2);
    for row in rows {
        let resolved = row.resolve(s.store().as_ref()).unwrap();
        assert_eq!(resolved["source"], Value::iri("charlie"));
        assert_eq!(resolved["pred"], Value::iri("follows"));
    }
}

#[test]
fn test_alternate_paths_are_rows() {
    let s = social();
    // bob is followed by three people; each binding is its own row.
    let path = Path::vertex(["<alice>", "<charlie>", "<dani>"])
        .tag(["who"])
        .out("<follows>")
        .is(["<bob>"]);
    assert_eq!(s.count(&path).unwrap(), 3);

    let who: BTreeSet<String> = s
        .collect(&path, None)
        .unwrap()
        .iter()
        .map(|r| s.store().resolve(r.get("who").unwrap()).unwrap().to_string())
        .collect();
    assert_eq!(who, iris(&["alice", "charlie", "dani"]));
}

#[test]
fn test_unique_under_intersection_keeps_first_binding() {
    // c is reached twice, first from a and then from b.
    let mut store = MemStore::new();
    store.add_triple("<a>", "<knows>", "<c>");
    store.add_triple("<b>", "<knows>", "<c>");
    let store = Arc::new(store);
    let raw = Session::new(store.clone())
        .with_config(EngineConfig {
            optimize: false,
            ..EngineConfig::default()
        })
        .unwrap();
    let optimized = Session::new(store);

    let path = Path::vertex(["<a>", "<b>"])
        .tag(["s"])
        .out("<knows>")
        .unique()
        .and(&Path::vertex(["<c>"]));
    // The smaller operand drives the optimized plan, so the unique side is looked up.
    let deduped = Path::vertex(["<a>", "<b>"]).tag(["s"]).out("<knows>").unique();
    let flipped = Path::vertex(["<c>"]).and(&deduped);

    for session in [&raw, &optimized] {
        for path in [&path, &flipped] {
            let rows = session.collect(path, None).unwrap();
            assert_eq!(rows.len(), 1);
            let resolved = rows[0].resolve(session.store().as_ref()).unwrap();
            assert_eq!(resolved["s"], Value::iri("a"));
            assert_eq!(resolved[TOP_RESULT_TAG], Value::iri("c"));
        }
    }
}

// ============================================================================
// Shaping and value filters
// ============================================================================

#[test]
fn test_order_skip_limit() {
    let s = social();
    let followers = Path::vertex(["<bob>"]).in_("<follows>").order();
    assert_eq!(
        s.values(&followers, None).unwrap(),
        vec![Value::iri("alice"), Value::iri("charlie"), Value::iri("dani")]
    );
    assert_eq!(
        s.values(&followers.skip(1).limit(1), None).unwrap(),
        vec![Value::iri("charlie")]
    );
}

#[test]
fn test_value_constraints() {
    let mut store = MemStore::new();
    for (who, age) in [("ann", 31i64), ("ben", 17), ("cat", 45)] {
        store.add_triple(format!("<{who}>").as_str(), "<age>", age);
    }
    store.add_triple("<ann>", "<name>", "Ann Smith");
    let s = Session::new(Arc::new(store));

    let adults = Path::all()
        .out("<age>")
        .compare(CompareOp::Gte, 18i64)
        .in_("<age>");
    assert_eq!(value_set(&s, &adults), iris(&["ann", "cat"]));

    let smiths = Path::all().regex("Smith$", false).unwrap();
    assert_eq!(s.values(&smiths, None).unwrap(), vec![Value::str("Ann Smith")]);

    // IRIs are skipped unless references are requested.
    let a_iris = Path::all().regex("^a", false).unwrap();
    assert!(s.values(&a_iris, None).unwrap().is_empty());
    let a_refs = Path::all().regex("^a", true).unwrap();
    assert_eq!(value_set(&s, &a_refs), iris(&["age", "ann"]));

    let ages = Path::all().kinds([ValueKind::Int]);
    assert_eq!(s.count(&ages).unwrap(), 3);

    let named = Path::all().like("%Smith").unwrap().literal();
    assert_eq!(s.count(&named).unwrap(), 1);
}

#[test]
fn test_filter_callback_error_ends_query() {
    let s = social();
    let path = Path::all().filter(|_| anyhow::bail!("boom"));
    let err = s.collect(&path, None).unwrap_err();
    assert!(matches!(err, QueryError::Callback(_)));
}
