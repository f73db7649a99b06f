//! The persistent traversal builder.
//!
//! A [`Path`] is an immutable chain of operations. Every combinator takes
//! `&self` and returns a new path whose tail is shared with the receiver, so
//! one prefix can be extended in several directions:
//!
//! ```
//! use trellis_engine::Path;
//!
//! let people = Path::vertex(["<alice>", "<bob>"]);
//! let friends = people.out("<follows>");
//! let statuses = people.out("<status>");
//! assert_eq!(friends.len(), 2);
//! assert_eq!(statuses.len(), 2);
//! assert_eq!(people.len(), 1);
//! ```
//!
//! Nothing touches a store until [`Path::compile_on`] turns the chain into a
//! plan tree.

use crate::config::EngineConfig;
use crate::constraint::{CompareOp, Constraint};
use crate::error::QueryError;
use crate::shape::ShapeRef;
use crate::transform::{FilterFn, MapFn};
use std::fmt;
use std::sync::Arc;
use trellis_store::{QuadStore, Value, ValueKind};

/// Restriction applied to the predicate (or label) of a step.
#[derive(Debug, Clone, Default)]
pub enum Via {
    /// No restriction.
    #[default]
    All,
    Values(Vec<Value>),
    /// Whatever the sub-path yields, evaluated from all nodes.
    Path(Path),
}

impl From<&str> for Via {
    fn from(value: &str) -> Self {
        Via::Values(vec![Value::from(value)])
    }
}

impl From<Value> for Via {
    fn from(value: Value) -> Self {
        Via::Values(vec![value])
    }
}

impl From<Vec<Value>> for Via {
    fn from(values: Vec<Value>) -> Self {
        Via::Values(values)
    }
}

impl From<Vec<&str>> for Via {
    fn from(values: Vec<&str>) -> Self {
        Via::Values(values.into_iter().map(Value::from).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Via {
    fn from(values: [&str; N]) -> Self {
        Via::Values(values.into_iter().map(Value::from).collect())
    }
}

impl From<Path> for Via {
    fn from(path: Path) -> Self {
        Via::Path(path)
    }
}

impl From<&Path> for Via {
    fn from(path: &Path) -> Self {
        Via::Path(path.clone())
    }
}

// ============================================================================
// Path representation
// ============================================================================

#[derive(Debug, Clone)]
pub(crate) enum Root {
    Values(Vec<Value>),
    All,
    /// Unrooted; the input is supplied by whoever applies the path.
    Morphism,
}

#[derive(Clone)]
pub(crate) enum Op {
    Is(Vec<Value>),
    Out { via: Via, tags: Vec<String> },
    In { via: Via, tags: Vec<String> },
    Both { via: Via, tags: Vec<String> },
    And(Path),
    Or(Path),
    Except(Path),
    Has { via: Via, values: Vec<Value>, reverse: bool },
    Follow { morphism: Path, reverse: bool },
    FollowRecursive { morphism: Path, max_depth: usize, depth_tags: Vec<String> },
    Unique,
    Limit(usize),
    Skip(usize),
    Order,
    Tag(Vec<String>),
    LabelContext { via: Via, tags: Vec<String> },
    Constrain(Constraint),
    Filter(FilterFn),
    Map(MapFn),
    InPredicates,
    OutPredicates,
    Labels,
}

impl Op {
    fn name(&self) -> &'static str {
        match self {
            Op::Is(_) => "is",
            Op::Out { .. } => "out",
            Op::In { .. } => "in",
            Op::Both { .. } => "both",
            Op::And(_) => "and",
            Op::Or(_) => "or",
            Op::Except(_) => "except",
            Op::Has { reverse: false, .. } => "has",
            Op::Has { reverse: true, .. } => "has_reverse",
            Op::Follow { reverse: false, .. } => "follow",
            Op::Follow { reverse: true, .. } => "follow_reverse",
            Op::FollowRecursive { .. } => "follow_recursive",
            Op::Unique => "unique",
            Op::Limit(_) => "limit",
            Op::Skip(_) => "skip",
            Op::Order => "order",
            Op::Tag(_) => "tag",
            Op::LabelContext { .. } => "label_context",
            Op::Constrain(_) => "constrain",
            Op::Filter(_) => "filter",
            Op::Map(_) => "map",
            Op::InPredicates => "in_predicates",
            Op::OutPredicates => "out_predicates",
            Op::Labels => "labels",
        }
    }

    /// Whether the op walks edges (and so is subject to the label context).
    fn is_step(&self) -> bool {
        matches!(
            self,
            Op::Out { .. } | Op::In { .. } | Op::Both { .. } | Op::Has { .. }
        )
    }

    /// The op that undoes the direction of this one.
    fn reversed(&self) -> Op {
        match self.clone() {
            Op::Out { via, tags } => Op::In { via, tags },
            Op::In { via, tags } => Op::Out { via, tags },
            Op::Has {
                via,
                values,
                reverse,
            } => Op::Has {
                via,
                values,
                reverse: !reverse,
            },
            Op::Follow { morphism, reverse } => Op::Follow {
                morphism,
                reverse: !reverse,
            },
            other => other,
        }
    }
}

enum Stage {
    Root(Root),
    Apply { prev: Path, op: Op },
}

/// An immutable traversal expression.
#[derive(Clone)]
pub struct Path {
    stage: Arc<Stage>,
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (root, ops) = self.unwind();
        let root = match root {
            Root::Values(values) => format!("vertex({})", values.len()),
            Root::All => "all".to_string(),
            Root::Morphism => "morphism".to_string(),
        };
        let mut list = f.debug_list();
        list.entry(&format_args!("{root}"));
        for op in &ops {
            list.entry(&format_args!("{}", op.name()));
        }
        list.finish()
    }
}

fn names<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    tags.into_iter().map(Into::into).collect()
}

fn values<I, V>(values: I) -> Vec<Value>
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    values.into_iter().map(Into::into).collect()
}

impl Path {
    fn root(root: Root) -> Self {
        Self {
            stage: Arc::new(Stage::Root(root)),
        }
    }

    fn apply(&self, op: Op) -> Self {
        Self {
            stage: Arc::new(Stage::Apply {
                prev: self.clone(),
                op,
            }),
        }
    }

    /// Root and operations in application order.
    pub(crate) fn unwind(&self) -> (Root, Vec<Op>) {
        let mut ops = Vec::new();
        let mut cur = self;
        loop {
            match cur.stage.as_ref() {
                Stage::Root(root) => {
                    ops.reverse();
                    return (root.clone(), ops);
                }
                Stage::Apply { prev, op } => {
                    ops.push(op.clone());
                    cur = prev;
                }
            }
        }
    }

    /// Number of stages, the root included.
    pub fn len(&self) -> usize {
        let mut n = 1;
        let mut cur = self;
        while let Stage::Apply { prev, .. } = cur.stage.as_ref() {
            n += 1;
            cur = prev;
        }
        n
    }

    /// Always false: a path has at least its root.
    pub fn is_empty(&self) -> bool {
        false
    }

    // ------------------------------------------------------------------------
    // Roots
    // ------------------------------------------------------------------------

    /// Start from the given values. Values the store does not hold are ignored.
    pub fn vertex<I, V>(seeds: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::root(Root::Values(values(seeds)))
    }

    /// Start from every node in the store.
    pub fn all() -> Self {
        Self::root(Root::All)
    }

    /// An unrooted path, applied later with [`Path::follow`] and friends.
    pub fn morphism() -> Self {
        Self::root(Root::Morphism)
    }

    // ------------------------------------------------------------------------
    // Steps
    // ------------------------------------------------------------------------

    /// Keep only the given values.
    pub fn is<I, V>(&self, keep: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.apply(Op::Is(values(keep)))
    }

    /// Objects of quads whose subject is the current node.
    pub fn out(&self, via: impl Into<Via>) -> Self {
        self.out_tagged(via, Vec::<String>::new())
    }

    /// Like [`Path::out`], binding `tags` to the predicate followed.
    pub fn out_tagged<I, S>(&self, via: impl Into<Via>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.apply(Op::Out {
            via: via.into(),
            tags: names(tags),
        })
    }

    /// Subjects of quads whose object is the current node.
    pub fn in_(&self, via: impl Into<Via>) -> Self {
        self.in_tagged(via, Vec::<String>::new())
    }

    pub fn in_tagged<I, S>(&self, via: impl Into<Via>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.apply(Op::In {
            via: via.into(),
            tags: names(tags),
        })
    }

    /// Union of [`Path::out`] and [`Path::in_`].
    pub fn both(&self, via: impl Into<Via>) -> Self {
        self.both_tagged(via, Vec::<String>::new())
    }

    pub fn both_tagged<I, S>(&self, via: impl Into<Via>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.apply(Op::Both {
            via: via.into(),
            tags: names(tags),
        })
    }

    /// Predicates of quads pointing at the current node.
    pub fn in_predicates(&self) -> Self {
        self.apply(Op::InPredicates)
    }

    /// Predicates of quads leaving the current node.
    pub fn out_predicates(&self) -> Self {
        self.apply(Op::OutPredicates)
    }

    /// Labels of quads touching the current node.
    pub fn labels(&self) -> Self {
        self.apply(Op::Labels)
    }

    /// Restrict the following steps to quads with one of these labels.
    /// `Via::All` lifts the restriction.
    pub fn label_context(&self, via: impl Into<Via>) -> Self {
        self.label_context_tagged(via, Vec::<String>::new())
    }

    pub fn label_context_tagged<I, S>(&self, via: impl Into<Via>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.apply(Op::LabelContext {
            via: via.into(),
            tags: names(tags),
        })
    }

    // ------------------------------------------------------------------------
    // Set algebra
    // ------------------------------------------------------------------------

    pub fn and(&self, other: &Path) -> Self {
        self.apply(Op::And(other.clone()))
    }

    pub fn or(&self, other: &Path) -> Self {
        self.apply(Op::Or(other.clone()))
    }

    /// Current nodes that `other` does not produce.
    pub fn except(&self, other: &Path) -> Self {
        self.apply(Op::Except(other.clone()))
    }

    /// Keep nodes with a `via` edge to one of `targets` (any target when empty).
    pub fn has<I, V>(&self, via: impl Into<Via>, targets: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.apply(Op::Has {
            via: via.into(),
            values: values(targets),
            reverse: false,
        })
    }

    /// Keep nodes with a `via` edge from one of `sources`.
    pub fn has_reverse<I, V>(&self, via: impl Into<Via>, sources: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.apply(Op::Has {
            via: via.into(),
            values: values(sources),
            reverse: true,
        })
    }

    // ------------------------------------------------------------------------
    // Morphisms
    // ------------------------------------------------------------------------

    /// Continue with `morphism`, using the current nodes as its input.
    pub fn follow(&self, morphism: &Path) -> Self {
        self.apply(Op::Follow {
            morphism: morphism.clone(),
            reverse: false,
        })
    }

    /// Continue with the reverse of `morphism`.
    pub fn follow_reverse(&self, morphism: &Path) -> Self {
        self.apply(Op::Follow {
            morphism: morphism.clone(),
            reverse: true,
        })
    }

    /// Apply `morphism` repeatedly, yielding every node reached.
    ///
    /// `max_depth == 0` means no bound. `depth_tags` bind the depth at which
    /// a node was reached, when the store holds that integer.
    pub fn follow_recursive<I, S>(&self, morphism: &Path, max_depth: usize, depth_tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.apply(Op::FollowRecursive {
            morphism: morphism.clone(),
            max_depth,
            depth_tags: names(depth_tags),
        })
    }

    /// The same traversal walked backwards: step order is reversed and every
    /// directional step flips. Label contexts travel with the steps they governed.
    pub fn reverse(&self) -> Self {
        let (root, ops) = self.unwind();
        let mut scoped: Vec<(Op, Option<(Via, Vec<String>)>)> = Vec::with_capacity(ops.len() + 1);
        let mut labels: Option<(Via, Vec<String>)> = None;
        if let Root::Values(seeds) = root {
            scoped.push((Op::Is(seeds), None));
        }
        for op in ops {
            match op {
                Op::LabelContext { via, tags } => {
                    labels = match via {
                        Via::All => None,
                        via => Some((via, tags)),
                    }
                }
                op if op.is_step() => scoped.push((op, labels.clone())),
                op => scoped.push((op, None)),
            }
        }

        let mut out = Path::morphism();
        let mut active = false;
        for (op, labels) in scoped.into_iter().rev() {
            match labels {
                Some((via, tags)) => {
                    out = out.apply(Op::LabelContext { via, tags });
                    active = true;
                }
                None if active && op.is_step() => {
                    out = out.label_context(Via::All);
                    active = false;
                }
                None => {}
            }
            out = out.apply(op.reversed());
        }
        out
    }

    // ------------------------------------------------------------------------
    // Shaping
    // ------------------------------------------------------------------------

    pub fn unique(&self) -> Self {
        self.apply(Op::Unique)
    }

    /// At most `n` results, alternate paths included. Zero means no limit.
    pub fn limit(&self, n: usize) -> Self {
        self.apply(Op::Limit(n))
    }

    pub fn skip(&self, n: usize) -> Self {
        self.apply(Op::Skip(n))
    }

    /// Ascending order of the resolved values.
    pub fn order(&self) -> Self {
        self.apply(Op::Order)
    }

    /// Bind the current node to each of `tags`.
    pub fn tag<I, S>(&self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.apply(Op::Tag(names(tags)))
    }

    // ------------------------------------------------------------------------
    // Filters
    // ------------------------------------------------------------------------

    pub fn compare(&self, op: CompareOp, value: impl Into<Value>) -> Self {
        self.apply(Op::Constrain(Constraint::compare(op, value)))
    }

    pub fn regex(&self, pattern: &str, refs: bool) -> Result<Self, QueryError> {
        Ok(self.apply(Op::Constrain(Constraint::regex(pattern, refs)?)))
    }

    /// Wildcard match: `%` is any run of characters, `?` a single one.
    pub fn like(&self, pattern: &str) -> Result<Self, QueryError> {
        Ok(self.apply(Op::Constrain(Constraint::wildcard(pattern)?)))
    }

    pub fn kinds(&self, kinds: impl IntoIterator<Item = ValueKind>) -> Self {
        self.apply(Op::Constrain(Constraint::kinds(kinds)))
    }

    /// Keep literal values, dropping IRIs and blank nodes.
    pub fn literal(&self) -> Self {
        self.apply(Op::Constrain(Constraint::literal()))
    }

    pub fn constrain(&self, constraint: Constraint) -> Self {
        self.apply(Op::Constrain(constraint))
    }

    /// Keep nodes whose value `f` accepts. An error from `f` ends the query.
    pub fn filter<F>(&self, f: F) -> Self
    where
        F: Fn(&Value) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.apply(Op::Filter(Arc::new(f)))
    }

    /// Replace each node by the node holding `f(value)`, dropping outputs
    /// the store does not hold.
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(&Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.apply(Op::Map(Arc::new(f)))
    }

    // ------------------------------------------------------------------------
    // Compilation
    // ------------------------------------------------------------------------

    /// Build the (unoptimized) plan tree against `store`.
    pub fn compile_on(&self, store: Arc<dyn QuadStore>) -> ShapeRef {
        self.compile_with(store, &EngineConfig::default())
    }

    pub fn compile_with(&self, store: Arc<dyn QuadStore>, config: &EngineConfig) -> ShapeRef {
        crate::compile::compile(self, store, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op_names(path: &Path) -> Vec<&'static str> {
        path.unwind().1.iter().map(Op::name).collect()
    }

    #[test]
    fn test_builder_is_persistent() {
        let base = Path::vertex(["<a>"]).out("<knows>");
        let left = base.tag(["x"]);
        let right = base.unique();
        assert_eq!(op_names(&base), vec!["out"]);
        assert_eq!(op_names(&left), vec!["out", "tag"]);
        assert_eq!(op_names(&right), vec!["out", "unique"]);
        assert_eq!(left.len(), 3);
    }

    #[test]
    fn test_reverse_flips_steps() {
        let m = Path::morphism().out("<a>").has("<b>", ["<c>"]).in_("<d>");
        assert_eq!(op_names(&m.reverse()), vec!["out", "has_reverse", "in"]);
    }

    #[test]
    fn test_reverse_of_rooted_path_ends_with_is() {
        let p = Path::vertex(["<x>"]).out("<knows>");
        assert_eq!(op_names(&p.reverse()), vec!["in", "is"]);
    }

    #[test]
    fn test_reverse_keeps_label_scope() {
        let m = Path::morphism()
            .out("<a>")
            .label_context("<g>")
            .out("<b>");
        assert_eq!(
            op_names(&m.reverse()),
            vec!["label_context", "in", "label_context", "in"]
        );
    }

    #[test]
    fn test_invalid_regex_is_reported() {
        let err = Path::all().regex("[", false).unwrap_err();
        assert!(matches!(err, QueryError::InvalidPattern { .. }));
    }

    #[test]
    fn test_debug_lists_stages() {
        let p = Path::vertex(["<a>"]).out("<knows>").limit(3);
        assert_eq!(format!("{p:?}"), "[vertex(1), out, limit]");
    }
}
