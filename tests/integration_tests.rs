//! Integration tests for the complete Trellis pipeline
//!
//! These tests verify end-to-end functionality across crates:
//! - Store → Path → Plan → Optimizer → Session
//! - Configuration file → Session behaviour
//! - Results and plans → JSON
//!
//! Run with: cargo test --test integration_tests

use std::collections::BTreeSet;
use std::io::Write;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use trellis_engine::{
    CancelToken, EngineConfig, Path, QueryError, RecursiveBindings, Session, Value,
};
use trellis_store::fixtures::social_graph;
use trellis_store::{MemStore, QuadStore};

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn names(session: &Session, path: &Path) -> BTreeSet<String> {
    session
        .values(path, None)
        .unwrap()
        .iter()
        .filter_map(|v| v.text().map(str::to_string))
        .collect()
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_config_file_drives_session() {
    init_logging();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"default_limit": 2, "recursive_bindings": "all", "max_optimize_passes": 8}}"#
    )
    .unwrap();

    let config = EngineConfig::load(file.path()).unwrap();
    assert_eq!(config.recursive_bindings, RecursiveBindings::All);
    let session = Session::new(Arc::new(social_graph()))
        .with_config(config)
        .unwrap();

    assert_eq!(session.values(&Path::all(), None).unwrap().len(), 2);
    assert_eq!(session.values(&Path::all(), Some(5)).unwrap().len(), 5);
}

#[test]
fn test_recursive_bindings_modes() {
    init_logging();
    // Two routes to d: a -> b -> d and a -> c -> d.
    let mut store = MemStore::new();
    for (s, o) in [("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")] {
        store.add_triple(Value::iri(s), Value::iri("next"), Value::iri(o));
    }
    let store: Arc<dyn QuadStore> = Arc::new(store);

    let step = Path::morphism().out("<next>").tag(["via"]);
    let path = Path::vertex(["<a>"]).follow_recursive(&step, 0, Vec::<String>::new());

    let first = Session::new(Arc::clone(&store));
    assert_eq!(first.count(&path).unwrap(), 3);

    let all = Session::new(Arc::clone(&store))
        .with_config(EngineConfig {
            recursive_bindings: RecursiveBindings::All,
            ..EngineConfig::default()
        })
        .unwrap();
    assert!(all.count(&path).unwrap() >= 3);
    assert_eq!(names(&all, &path), set(&["b", "c", "d"]));
}

// ============================================================================
// Queries end to end
// ============================================================================

#[test]
fn test_friends_of_cool_people() {
    init_logging();
    let session = Session::new(Arc::new(social_graph()));

    let cool = Path::all().has("<status>", ["cool_person"]);
    let followers_of_cool = cool.in_("<follows>").unique();
    assert_eq!(
        names(&session, &followers_of_cool),
        set(&["alice", "charlie", "dani", "fred"])
    );

    let not_cool = followers_of_cool.except(&cool);
    assert_eq!(names(&session, &not_cool), set(&["alice", "charlie", "fred"]));
}

#[test]
fn test_results_serialize_to_json() {
    init_logging();
    let session = Session::new(Arc::new(social_graph()));
    let path = Path::vertex(["<emily>"]).tag(["who"]).out("<follows>");

    let rows = session.collect(&path, None).unwrap();
    assert_eq!(rows.len(), 1);
    let resolved = rows[0].resolve(session.store().as_ref()).unwrap();
    let json = serde_json::to_value(&resolved).unwrap();
    assert_eq!(json["who"]["kind"], "iri");
    assert_eq!(json["who"]["value"], "emily");
    assert_eq!(json["id"]["value"], "fred");

    let plan = serde_json::to_value(session.explain(&path).unwrap()).unwrap();
    assert_eq!(plan["name"], "step");
}

#[test]
fn test_streaming_stops_early() {
    init_logging();
    let session = Session::new(Arc::new(social_graph()));
    let mut seen = Vec::new();
    let delivered = session
        .for_each(&Path::all(), None, |row| {
            seen.push(row.id);
            if seen.len() == 4 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();
    assert_eq!(delivered, 4);
    assert_eq!(seen.len(), 4);
}

#[test]
fn test_deadline_reports_timeout() {
    init_logging();
    let cancel = CancelToken::with_timeout(Duration::ZERO);
    std::thread::sleep(Duration::from_millis(5));
    let session = Session::new(Arc::new(social_graph())).with_cancel(cancel);
    let err = session.collect(&Path::all(), None).unwrap_err();
    assert!(matches!(err, QueryError::DeadlineExceeded));
    assert!(err.is_cancellation());
}

#[test]
fn test_mapper_and_filter_compose() {
    init_logging();
    let mut store = MemStore::new();
    for i in 1..=10i64 {
        store.add_triple(Value::iri(format!("item{i}")), Value::iri("score"), i);
    }
    let session = Session::new(Arc::new(store));

    let doubled_even = Path::all()
        .out("<score>")
        .filter(|v| Ok(matches!(v, Value::Int(i) if i % 2 == 0)))
        .map(|v| match v {
            Value::Int(i) => Ok(Value::Int(i * 2)),
            other => anyhow::bail!("unexpected {other}"),
        })
        .in_("<score>");
    // 2, 4 -> 4, 8; 6, 8, 10 double past the stored range.
    assert_eq!(names(&session, &doubled_even), set(&["item4", "item8"]));
}
