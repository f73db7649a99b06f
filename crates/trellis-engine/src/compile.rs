//! Lowering of [`Path`] chains into plan trees.

use crate::config::{EngineConfig, RecursiveBindings};
use crate::constraint::ValueConstraint;
use crate::nodes::{
    AllNodes, And, Fixed, Limit, Morphism, Not, Or, Recursive, Save, Skip, Sort, Step, Unique,
};
use crate::path::{Op, Path, Root, Via};
use crate::shape::ShapeRef;
use crate::transform::{ValueFilter, ValueMapper};
use std::sync::Arc;
use trellis_store::{Direction, QuadStore, Value};

pub(crate) fn compile(path: &Path, store: Arc<dyn QuadStore>, config: &EngineConfig) -> ShapeRef {
    let ctx = BuildContext {
        store,
        bindings: config.recursive_bindings,
        labels: None,
        label_tags: Vec::new(),
    };
    let shape = ctx.clone().build(path, None);
    tracing::debug!(path = ?path, root = shape.name(), "compiled path");
    shape
}

/// State threaded through one lowering. The label context changes as ops are
/// applied; morphisms start from a copy of the caller's state and their
/// changes stay local.
#[derive(Clone)]
struct BuildContext {
    store: Arc<dyn QuadStore>,
    bindings: RecursiveBindings,
    labels: Option<ShapeRef>,
    label_tags: Vec<String>,
}

impl BuildContext {
    fn build(mut self, path: &Path, input: Option<ShapeRef>) -> ShapeRef {
        let (root, ops) = path.unwind();
        let mut cur = match (root, input) {
            (Root::Values(values), None) => self.fixed(&values),
            (Root::Values(values), Some(input)) => {
                Arc::new(And::new(vec![input, self.fixed(&values)]))
            }
            (Root::All | Root::Morphism, None) => self.all(),
            (Root::All | Root::Morphism, Some(input)) => input,
        };
        for op in ops {
            cur = self.lower(cur, op);
        }
        cur
    }

    fn lower(&mut self, cur: ShapeRef, op: Op) -> ShapeRef {
        match op {
            Op::Is(values) => Arc::new(And::new(vec![cur, self.fixed(&values)])),
            Op::Out { via, tags } => self.step(cur, Direction::Subject, Direction::Object, via, tags),
            Op::In { via, tags } => self.step(cur, Direction::Object, Direction::Subject, via, tags),
            Op::Both { via, tags } => {
                let out = self.step(
                    cur.clone(),
                    Direction::Subject,
                    Direction::Object,
                    via.clone(),
                    tags.clone(),
                );
                let inbound = self.step(cur, Direction::Object, Direction::Subject, via, tags);
                Arc::new(Or::new(vec![out, inbound]))
            }
            Op::And(other) => {
                let other = self.clone().build(&other, None);
                Arc::new(And::new(vec![cur, other]))
            }
            Op::Or(other) => {
                let other = self.clone().build(&other, None);
                Arc::new(Or::new(vec![cur, other]))
            }
            Op::Except(other) => {
                let other = self.clone().build(&other, None);
                let keep = Arc::new(Not::new(other, self.all()));
                Arc::new(And::new(vec![cur, keep]))
            }
            Op::Has {
                via,
                values,
                reverse,
            } => {
                let ends = if values.is_empty() {
                    self.all()
                } else {
                    self.fixed(&values)
                };
                let (from_dir, to_dir) = if reverse {
                    (Direction::Subject, Direction::Object)
                } else {
                    (Direction::Object, Direction::Subject)
                };
                let found = self.step(ends, from_dir, to_dir, via, Vec::new());
                Arc::new(And::new(vec![cur, found]))
            }
            Op::Follow { morphism, reverse } => {
                let morphism = if reverse { morphism.reverse() } else { morphism };
                self.clone().build(&morphism, Some(cur))
            }
            Op::FollowRecursive {
                morphism,
                max_depth,
                depth_tags,
            } => {
                let ctx = self.clone();
                let apply: Morphism =
                    Arc::new(move |input: ShapeRef| ctx.clone().build(&morphism, Some(input)));
                Arc::new(
                    Recursive::new(cur, apply, max_depth, self.store.clone())
                        .depth_tags(depth_tags)
                        .bindings(self.bindings),
                )
            }
            Op::Unique => Arc::new(Unique::new(cur)),
            Op::Limit(n) => Arc::new(Limit::new(cur, n)),
            Op::Skip(n) => Arc::new(Skip::new(cur, n)),
            Op::Order => Arc::new(Sort::new(cur, self.store.clone())),
            Op::Tag(tags) => Arc::new(Save::new(cur, tags)),
            Op::LabelContext { via, tags } => {
                self.labels = self.via(via);
                self.label_tags = if self.labels.is_some() { tags } else { Vec::new() };
                cur
            }
            Op::Constrain(constraint) => Arc::new(ValueConstraint::new(
                cur,
                self.store.clone(),
                vec![constraint],
            )),
            Op::Filter(filter) => Arc::new(ValueFilter::new(cur, self.store.clone(), filter)),
            Op::Map(mapper) => Arc::new(ValueMapper::new(cur, self.store.clone(), mapper)),
            Op::InPredicates => self.predicates(cur, Direction::Object),
            Op::OutPredicates => self.predicates(cur, Direction::Subject),
            Op::Labels => {
                let store = &self.store;
                let from_subject = Step::new(store.clone(), cur.clone(), Direction::Subject, Direction::Label);
                let from_object = Step::new(store.clone(), cur, Direction::Object, Direction::Label);
                Arc::new(Unique::new(Arc::new(Or::new(vec![
                    Arc::new(from_subject),
                    Arc::new(from_object),
                ]))))
            }
        }
    }

    fn step(
        &self,
        from: ShapeRef,
        from_dir: Direction,
        to_dir: Direction,
        via: Via,
        tags: Vec<String>,
    ) -> ShapeRef {
        let via = self.via(via);
        Arc::new(
            Step::new(self.store.clone(), from, from_dir, to_dir)
                .via(via, tags)
                .labels(self.label_shape()),
        )
    }

    fn predicates(&self, cur: ShapeRef, from_dir: Direction) -> ShapeRef {
        let step = Step::new(self.store.clone(), cur, from_dir, Direction::Predicate)
            .labels(self.label_shape());
        Arc::new(Unique::new(Arc::new(step)))
    }

    fn label_shape(&self) -> Option<ShapeRef> {
        let labels = self.labels.clone()?;
        if self.label_tags.is_empty() {
            Some(labels)
        } else {
            Some(Arc::new(Save::new(labels, self.label_tags.clone())))
        }
    }

    fn via(&self, via: Via) -> Option<ShapeRef> {
        match via {
            Via::All => None,
            Via::Values(values) => Some(self.fixed(&values)),
            Via::Path(path) => Some(self.clone().build(&path, None)),
        }
    }

    fn all(&self) -> ShapeRef {
        Arc::new(AllNodes::new(self.store.clone()))
    }

    /// Values the store does not hold are dropped.
    fn fixed(&self, values: &[Value]) -> ShapeRef {
        let handles: Vec<_> = values
            .iter()
            .filter_map(|value| {
                let handle = self.store.intern(value);
                if handle.is_none() {
                    tracing::debug!(value = %value, "value not in store; dropped");
                }
                handle
            })
            .collect();
        Arc::new(Fixed::new(handles))
    }
}
