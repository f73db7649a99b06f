//! Shared fixture graphs for tests.
//!
//! Compiled only for this crate's own tests and behind the `testing` feature.

use crate::{MemStore, Value};

/// A small social graph.
///
/// ```text
/// alice -> bob -> fred -> greg
/// charlie -> bob, charlie -> dani
/// dani -> bob, dani -> greg
/// emily -> fred
/// ```
///
/// Every arrow is a `<follows>` edge. `bob`, `dani` and `greg` carry a
/// `<status> "cool_person"` edge; `emily` and `greg` carry a
/// `<status> "smart_person"` edge scoped to the `<smart_graph>` label.
/// `<predicates> <are>` lists both predicates.
pub fn social_graph() -> MemStore {
    let mut store = MemStore::new();
    let follows = [
        ("alice", "bob"),
        ("bob", "fred"),
        ("charlie", "bob"),
        ("charlie", "dani"),
        ("dani", "bob"),
        ("dani", "greg"),
        ("emily", "fred"),
        ("fred", "greg"),
    ];
    for (from, to) in follows {
        store.add_triple(Value::iri(from), Value::iri("follows"), Value::iri(to));
    }
    for who in ["bob", "dani", "greg"] {
        store.add_triple(Value::iri(who), Value::iri("status"), Value::str("cool_person"));
    }
    store.add_triple(Value::iri("predicates"), Value::iri("are"), Value::iri("follows"));
    store.add_triple(Value::iri("predicates"), Value::iri("are"), Value::iri("status"));
    for who in ["emily", "greg"] {
        store.add_quad(
            Value::iri(who),
            Value::iri("status"),
            Value::str("smart_person"),
            Some(Value::iri("smart_graph")),
        );
    }
    store
}
