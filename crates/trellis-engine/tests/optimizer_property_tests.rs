//! Optimization must never change what a plan produces.
//!
//! Random graphs and random path chains are run with and without the
//! optimizer; the results must agree, and an optimized plan must already be
//! a fixpoint. Chains mix set algebra, morphisms, deduplication, ordering,
//! native constraints and deterministic filter and map callbacks. Paging is
//! applied last, over deduplicated and ordered values, so that it is compared
//! as an exact sequence.

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;
use trellis_engine::shape::OptimizeContext;
use trellis_engine::{
    CancelToken, CompareOp, EngineConfig, Handle, Optimizer, Path, Session, Tags, Value,
    ValueKind,
};
use trellis_store::{MemStore, QuadStore};

const PREDICATES: [&str; 2] = ["<p0>", "<p1>"];

fn node(i: u8) -> String {
    format!("<n{i}>")
}

fn build_store(edges: &[(u8, u8, u8)]) -> Arc<dyn QuadStore> {
    let mut store = MemStore::new();
    for &(s, p, o) in edges {
        store.add_triple(
            node(s).as_str(),
            PREDICATES[p as usize % PREDICATES.len()],
            node(o).as_str(),
        );
    }
    Arc::new(store)
}

#[derive(Debug, Clone)]
enum Op {
    Out(u8),
    In(u8),
    Both,
    Tag(u8),
    And(Vec<u8>),
    Or(Vec<u8>),
    Except(Vec<u8>),
    Is(Vec<u8>),
    Has(u8, u8),
    Unique,
    Order,
    Follow(u8),
    FollowReverse(u8),
    FollowRecursive(u8, usize),
    /// Regex over node IRIs: `n0` through `n<k>`.
    Matches(u8),
    /// IRIs sorting before `n<k>`.
    Below(u8),
    Refs,
    EvenOnly,
    Shift,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let ids = || prop::collection::vec(0u8..8, 0..4);
    let algebra = prop_oneof![
        (0u8..2).prop_map(Op::Out),
        (0u8..2).prop_map(Op::In),
        Just(Op::Both),
        (0u8..3).prop_map(Op::Tag),
        ids().prop_map(Op::And),
        ids().prop_map(Op::Or),
        ids().prop_map(Op::Except),
        ids().prop_map(Op::Is),
        (0u8..2, 0u8..8).prop_map(|(p, o)| Op::Has(p, o)),
    ];
    let shaping = prop_oneof![
        Just(Op::Unique),
        Just(Op::Order),
        (0u8..2).prop_map(Op::Follow),
        (0u8..2).prop_map(Op::FollowReverse),
        (0u8..2, 0usize..3).prop_map(|(p, d)| Op::FollowRecursive(p, d)),
        (0u8..8).prop_map(Op::Matches),
        (0u8..8).prop_map(Op::Below),
        Just(Op::Refs),
        Just(Op::EvenOnly),
        Just(Op::Shift),
    ];
    prop_oneof![algebra, shaping]
}

fn vertices(ids: &[u8]) -> Path {
    Path::vertex(ids.iter().map(|&i| node(i)))
}

/// Index of a generated node value, `None` for predicates.
fn node_index(value: &Value) -> Option<u8> {
    value.text()?.strip_prefix('n')?.parse().ok()
}

fn build_path(seeds: &[u8], ops: &[Op]) -> Path {
    let mut path = if seeds.is_empty() {
        Path::all()
    } else {
        vertices(seeds)
    };
    for op in ops {
        path = match op {
            Op::Out(p) => path.out(PREDICATES[*p as usize]),
            Op::In(p) => path.in_(PREDICATES[*p as usize]),
            Op::Both => path.both(trellis_engine::Via::All),
            Op::Tag(t) => path.tag([format!("t{t}")]),
            Op::And(ids) => path.and(&vertices(ids)),
            Op::Or(ids) => path.or(&vertices(ids)),
            Op::Except(ids) => path.except(&vertices(ids)),
            Op::Is(ids) => path.is(ids.iter().map(|&i| node(i))),
            Op::Has(p, o) => path.has(PREDICATES[*p as usize], [node(*o)]),
            Op::Unique => path.unique(),
            Op::Order => path.order(),
            Op::Follow(p) => {
                path.follow(&Path::morphism().out(PREDICATES[*p as usize]).tag(["hop"]))
            }
            Op::FollowReverse(p) => {
                path.follow_reverse(&Path::morphism().out(PREDICATES[*p as usize]))
            }
            Op::FollowRecursive(p, depth) => path.follow_recursive(
                &Path::morphism().out(PREDICATES[*p as usize]),
                *depth,
                Vec::<String>::new(),
            ),
            Op::Matches(k) => path.regex(&format!("^n[0-{k}]$"), true).unwrap(),
            Op::Below(k) => path.compare(CompareOp::Lt, Value::iri(format!("n{k}"))),
            Op::Refs => path.kinds([ValueKind::Iri]),
            Op::EvenOnly => path.filter(|v| Ok(node_index(v).is_some_and(|i| i % 2 == 0))),
            Op::Shift => path.map(|v| {
                Ok(match node_index(v) {
                    Some(i) => Value::iri(format!("n{}", (i + 1) % 8)),
                    None => v.clone(),
                })
            }),
        };
    }
    path
}

fn rows(session: &Session, path: &Path) -> BTreeSet<(Handle, Tags)> {
    session
        .collect(path, None)
        .unwrap()
        .into_iter()
        .map(|r| (r.id, r.tags))
        .collect()
}

fn sessions(store: &Arc<dyn QuadStore>) -> (Session, Session) {
    let raw = Session::new(Arc::clone(store))
        .with_config(EngineConfig {
            optimize: false,
            ..EngineConfig::default()
        })
        .unwrap();
    (raw, Session::new(Arc::clone(store)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_optimizer_preserves_rows(
        edges in prop::collection::vec((0u8..8, 0u8..2, 0u8..8), 0..24),
        seeds in prop::collection::vec(0u8..8, 0..4),
        ops in prop::collection::vec(op_strategy(), 0..5),
    ) {
        let store = build_store(&edges);
        let path = build_path(&seeds, &ops);
        let (raw, optimized) = sessions(&store);
        prop_assert_eq!(rows(&raw, &path), rows(&optimized, &path));
    }

    #[test]
    fn prop_optimizer_preserves_paged_values(
        edges in prop::collection::vec((0u8..8, 0u8..2, 0u8..8), 0..24),
        seeds in prop::collection::vec(0u8..8, 0..4),
        ops in prop::collection::vec(op_strategy(), 0..4),
        skip in 0usize..4,
        limit in 0usize..4,
    ) {
        let store = build_store(&edges);
        let sorted = build_path(&seeds, &ops).unique().order();
        let paged = sorted.skip(skip).limit(limit);
        let (raw, optimized) = sessions(&store);

        let got = optimized.values(&paged, None).unwrap();
        prop_assert_eq!(&got, &raw.values(&paged, None).unwrap());

        let all = raw.values(&sorted, None).unwrap();
        let take = if limit == 0 { usize::MAX } else { limit };
        let expected: Vec<Value> = all.into_iter().skip(skip).take(take).collect();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn prop_optimized_plan_is_fixpoint(
        edges in prop::collection::vec((0u8..8, 0u8..2, 0u8..8), 0..24),
        seeds in prop::collection::vec(0u8..8, 0..4),
        ops in prop::collection::vec(op_strategy(), 0..5),
    ) {
        let store = build_store(&edges);
        let shape = build_path(&seeds, &ops).compile_on(Arc::clone(&store));
        let cancel = CancelToken::new();
        let optimized = Optimizer::default().run(shape, &cancel).unwrap();
        let (_, changed) = optimized.optimize(OptimizeContext::new(&cancel));
        prop_assert!(!changed);
    }

    #[test]
    fn prop_recursive_closure_matches_reachability(
        edges in prop::collection::vec((0u8..8, 0u8..1, 0u8..8), 0..20),
        start in 0u8..8,
        max_depth in 0usize..4,
    ) {
        let store = build_store(&edges);
        let step = Path::morphism().out(PREDICATES[0]);
        let path = vertices(&[start]).follow_recursive(&step, max_depth, Vec::<String>::new());
        let (raw, optimized) = sessions(&store);

        let ids = |s: &Session| -> BTreeSet<Handle> {
            s.collect(&path, None).unwrap().into_iter().map(|r| r.id).collect()
        };
        let got = ids(&optimized);
        prop_assert_eq!(&got, &ids(&raw));

        // Breadth-first reachability over the same edges.
        let mut expected = BTreeSet::new();
        let mut frontier = vec![start];
        let mut depth = 0;
        let mut seen_nodes = BTreeSet::new();
        while !frontier.is_empty() && (max_depth == 0 || depth < max_depth) {
            depth += 1;
            let mut next = Vec::new();
            for &from in &frontier {
                for &(_, _, o) in edges.iter().filter(|e| e.0 == from) {
                    if seen_nodes.insert(o) {
                        next.push(o);
                    }
                }
            }
            frontier = next;
        }
        for n in seen_nodes {
            if let Some(h) = store.intern(&node(n).as_str().into()) {
                expected.insert(h);
            }
        }
        prop_assert_eq!(got, expected);
    }
}
