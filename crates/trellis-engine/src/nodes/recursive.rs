//! Transitive closure of a morphism.
//!
//! The closure is evaluated breadth first. Level 1 applies the morphism to the
//! seeds, level `n + 1` applies it to the handles first reached at level `n`.
//! Every input is wrapped in a [`Save`] under [`BASE_TAG`] so each output can be
//! traced back to the frontier node it came from, and through it to the seed
//! whose bindings it inherits.

use super::{is_null, Fixed, Materialized, Save, Status};
use crate::cancel::CancelToken;
use crate::config::RecursiveBindings;
use crate::error::QueryError;
use crate::shape::{
    collect_paths, Base, Costs, Index, OptimizeContext, Scanner, Shape, ShapeRef, Size, Tags,
};
use ahash::{AHashMap, AHashSet};
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use trellis_store::{Handle, QuadStore, Value};

/// Tag carrying the frontier node a morphism output was derived from.
pub const BASE_TAG: &str = "__base_recursive";

/// A traversal applied to an input shape.
pub type Morphism = Arc<dyn Fn(ShapeRef) -> ShapeRef + Send + Sync>;

#[derive(Clone)]
pub struct Recursive {
    sub: ShapeRef,
    morphism: Morphism,
    max_depth: usize,
    depth_tags: Vec<String>,
    bindings: RecursiveBindings,
    store: Arc<dyn QuadStore>,
}

impl fmt::Debug for Recursive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recursive")
            .field("sub", &self.sub)
            .field("max_depth", &self.max_depth)
            .field("depth_tags", &self.depth_tags)
            .field("bindings", &self.bindings)
            .finish_non_exhaustive()
    }
}

impl Recursive {
    /// `max_depth == 0` means unbounded.
    pub fn new(sub: ShapeRef, morphism: Morphism, max_depth: usize, store: Arc<dyn QuadStore>) -> Self {
        Self {
            sub,
            morphism,
            max_depth,
            depth_tags: Vec::new(),
            bindings: RecursiveBindings::First,
            store,
        }
    }

    pub fn depth_tags(mut self, tags: Vec<String>) -> Self {
        self.depth_tags = tags;
        self
    }

    pub fn bindings(mut self, bindings: RecursiveBindings) -> Self {
        self.bindings = bindings;
        self
    }
}

impl Shape for Recursive {
    fn name(&self) -> &'static str {
        "recursive"
    }

    fn iterate(&self) -> Box<dyn Scanner> {
        Box::new(RecursiveScanner {
            node: self.clone(),
            seeds: Some(self.sub.iterate()),
            depth: 0,
            frontier: AHashMap::new(),
            seen: AHashMap::new(),
            queue: VecDeque::new(),
            current: None,
            done: false,
            status: Status::default(),
        })
    }

    fn lookup(&self) -> Box<dyn Index> {
        Box::new(Materialized::new(self.iterate()))
    }

    fn children(&self) -> Vec<ShapeRef> {
        vec![Arc::clone(&self.sub)]
    }

    fn stats(&self, cancel: &CancelToken) -> Result<Costs, QueryError> {
        let sub = self.sub.stats(cancel)?;
        let nodes = self.store.stats().nodes as i64;
        Ok(Costs {
            contains_cost: sub.next_cost * nodes.max(1),
            next_cost: sub.next_cost * 2,
            size: Size::estimate(nodes.min(sub.size.value.saturating_mul(nodes.max(1)))),
        })
    }

    fn optimize(self: Arc<Self>, ctx: OptimizeContext<'_>) -> (ShapeRef, bool) {
        let (sub, changed) = Arc::clone(&self.sub).optimize(ctx.ordered());
        if is_null(&sub) {
            return (sub, true);
        }
        if !changed {
            return (self, false);
        }
        let mut node = (*self).clone();
        node.sub = sub;
        (Arc::new(node), true)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct Row {
    handle: Handle,
    tags: Tags,
    depth: usize,
}

struct RecursiveScanner {
    node: Recursive,
    /// Seed scanner, drained when the first level is expanded.
    seeds: Option<Box<dyn Scanner>>,
    depth: usize,
    /// Frontier handle -> binding sets inherited from its seed(s).
    frontier: AHashMap<Handle, Vec<Tags>>,
    /// Every emitted handle with the binding sets it was emitted under.
    seen: AHashMap<Handle, Vec<Tags>>,
    queue: VecDeque<Row>,
    current: Option<Row>,
    done: bool,
    status: Status,
}

impl RecursiveScanner {
    fn load_seeds(&mut self, cancel: &CancelToken) -> Result<(), QueryError> {
        let Some(mut seeds) = self.seeds.take() else {
            return Ok(());
        };
        let result = loop {
            if !seeds.next(cancel) {
                break seeds.err().map_or(Ok(()), |err| Err(err.clone()));
            }
            let Some(h) = seeds.result() else {
                continue;
            };
            match collect_paths(seeds.as_mut(), cancel) {
                Ok(paths) => {
                    let entry = self.frontier.entry(h).or_default();
                    for tags in paths {
                        if !entry.contains(&tags) {
                            entry.push(tags);
                        }
                    }
                }
                Err(err) => break Err(err),
            }
        };
        let closed = seeds.close();
        result?;
        closed
    }

    /// Expand one level. Returns false once the closure is complete.
    fn expand(&mut self, cancel: &CancelToken) -> Result<bool, QueryError> {
        if self.depth == 0 {
            self.load_seeds(cancel)?;
        }
        if self.frontier.is_empty() {
            return Ok(false);
        }
        if self.node.max_depth > 0 && self.depth >= self.node.max_depth {
            return Ok(false);
        }
        self.depth += 1;

        let mut inputs: Vec<Handle> = self.frontier.keys().copied().collect();
        inputs.sort_unstable();
        let input: ShapeRef = Arc::new(Save::new(
            Arc::new(Fixed::new(inputs)),
            vec![BASE_TAG.to_string()],
        ));
        let shape = (self.node.morphism)(input);

        let mut next: AHashMap<Handle, Vec<Tags>> = AHashMap::new();
        let mut fresh: AHashSet<Handle> = AHashSet::new();
        let mut it = shape.iterate();
        let outcome = self.drain_level(cancel, it.as_mut(), &mut next, &mut fresh);
        let closed = it.close();
        outcome?;
        closed?;

        tracing::trace!(depth = self.depth, reached = fresh.len(), "recursive level expanded");
        self.frontier = next;
        Ok(true)
    }

    fn drain_level(
        &mut self,
        cancel: &CancelToken,
        it: &mut dyn Scanner,
        next: &mut AHashMap<Handle, Vec<Tags>>,
        fresh: &mut AHashSet<Handle>,
    ) -> Result<(), QueryError> {
        let all = self.node.bindings == RecursiveBindings::All;
        while it.next(cancel) {
            let Some(h) = it.result() else {
                continue;
            };
            for path in collect_paths(&mut *it, cancel)? {
                let Some(base) = path.get(BASE_TAG) else {
                    continue;
                };
                let Some(inherited) = self.frontier.get(base) else {
                    continue;
                };
                for tags in inherited {
                    let known = self.seen.get(&h);
                    let first_visit = known.is_none() || fresh.contains(&h);
                    let new_binding = known.map_or(true, |sets| !sets.contains(tags));
                    if known.is_some() && !(all && new_binding) {
                        continue;
                    }
                    if first_visit {
                        fresh.insert(h);
                        next.entry(h).or_default().push(tags.clone());
                    }
                    self.seen.entry(h).or_default().push(tags.clone());
                    self.queue.push_back(Row {
                        handle: h,
                        tags: tags.clone(),
                        depth: self.depth,
                    });
                }
            }
        }
        it.err().map_or(Ok(()), |err| Err(err.clone()))
    }
}

impl Base for RecursiveScanner {
    fn result(&self) -> Option<Handle> {
        self.current.as_ref().map(|r| r.handle)
    }

    fn tag_results(&self, dst: &mut Tags) {
        let Some(row) = &self.current else {
            return;
        };
        dst.extend(row.tags.iter().map(|(k, v)| (k.clone(), *v)));
        if self.node.depth_tags.is_empty() {
            return;
        }
        if let Some(depth) = self.node.store.intern(&Value::Int(row.depth as i64)) {
            for tag in &self.node.depth_tags {
                dst.insert(tag.clone(), depth);
            }
        }
    }

    fn next_path(&mut self, _cancel: &CancelToken) -> bool {
        false
    }

    fn err(&self) -> Option<&QueryError> {
        self.status.err()
    }

    fn close(&mut self) -> Result<(), QueryError> {
        self.status.close();
        self.current = None;
        self.queue.clear();
        self.seen.clear();
        self.frontier.clear();
        match self.seeds.take() {
            Some(mut seeds) => seeds.close(),
            None => Ok(()),
        }
    }
}

impl Scanner for RecursiveScanner {
    fn next(&mut self, cancel: &CancelToken) -> bool {
        self.current = None;
        loop {
            if !self.status.ready(cancel) {
                return false;
            }
            if let Some(row) = self.queue.pop_front() {
                self.current = Some(row);
                return true;
            }
            if self.done {
                return false;
            }
            match self.expand(cancel) {
                Ok(true) => {}
                Ok(false) => self.done = true,
                Err(err) => return self.status.fail(err),
            }
        }
    }
}
