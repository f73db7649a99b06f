//! Walking quads from one end to another.

use super::{is_null, null, Status};
use crate::cancel::CancelToken;
use crate::error::QueryError;
use crate::shape::{
    collect_paths, Base, Closer, Combinations, Costs, Index, OptimizeContext, Scanner, Shape,
    ShapeRef, Size, Tags,
};
use std::any::Any;
use std::sync::Arc;
use trellis_store::{Direction, Handle, Quad, QuadId, QuadStore};

/// For every handle of `from`, the `to_dir` end of each quad whose `from_dir`
/// end is that handle.
///
/// `via` restricts the predicate and `labels` the label of the quads walked;
/// `via_tags` bind the predicate of the quad that was followed. Each quad is
/// a separate result, so a target reached twice is reported twice.
#[derive(Debug, Clone)]
pub struct Step {
    store: Arc<dyn QuadStore>,
    from: ShapeRef,
    from_dir: Direction,
    to_dir: Direction,
    via: Option<ShapeRef>,
    labels: Option<ShapeRef>,
    via_tags: Vec<String>,
}

impl Step {
    pub fn new(
        store: Arc<dyn QuadStore>,
        from: ShapeRef,
        from_dir: Direction,
        to_dir: Direction,
    ) -> Self {
        Self {
            store,
            from,
            from_dir,
            to_dir,
            via: None,
            labels: None,
            via_tags: Vec::new(),
        }
    }

    pub fn via(mut self, via: Option<ShapeRef>, tags: Vec<String>) -> Self {
        self.via = via;
        self.via_tags = tags;
        self
    }

    pub fn labels(mut self, labels: Option<ShapeRef>) -> Self {
        self.labels = labels;
        self
    }

    pub fn directions(&self) -> (Direction, Direction) {
        (self.from_dir, self.to_dir)
    }

    fn filters(&self) -> Filters {
        Filters {
            via: self.via.as_ref().map(|v| v.lookup()),
            labels: self.labels.as_ref().map(|l| l.lookup()),
            via_tags: self.via_tags.clone(),
        }
    }

    /// Average quads per node, rounded up.
    fn fanout(&self) -> i64 {
        let stats = self.store.stats();
        if stats.nodes == 0 {
            return 0;
        }
        stats.quads.div_ceil(stats.nodes) as i64
    }
}

impl Shape for Step {
    fn name(&self) -> &'static str {
        "step"
    }

    fn iterate(&self) -> Box<dyn Scanner> {
        Box::new(StepScanner {
            store: Arc::clone(&self.store),
            from: self.from.iterate(),
            from_dir: self.from_dir,
            to_dir: self.to_dir,
            filters: self.filters(),
            from_paths: Vec::new(),
            pending: Vec::new(),
            pos: 0,
            combos: Combinations::default(),
            current: None,
            status: Status::default(),
        })
    }

    fn lookup(&self) -> Box<dyn Index> {
        Box::new(StepIndex {
            store: Arc::clone(&self.store),
            from: self.from.lookup(),
            from_dir: self.from_dir,
            to_dir: self.to_dir,
            filters: self.filters(),
            paths: Vec::new(),
            path: 0,
            current: None,
            status: Status::default(),
        })
    }

    fn children(&self) -> Vec<ShapeRef> {
        let mut out = vec![Arc::clone(&self.from)];
        out.extend(self.via.iter().cloned());
        out.extend(self.labels.iter().cloned());
        out
    }

    fn stats(&self, cancel: &CancelToken) -> Result<Costs, QueryError> {
        let from = self.from.stats(cancel)?;
        let fanout = self.fanout();
        Ok(Costs {
            contains_cost: fanout.max(1) * (from.contains_cost + 1),
            next_cost: from.next_cost + fanout,
            size: Size::estimate(from.size.value * fanout),
        })
    }

    fn optimize(self: Arc<Self>, ctx: OptimizeContext<'_>) -> (ShapeRef, bool) {
        let (from, mut changed) = Arc::clone(&self.from).optimize(ctx);
        let mut restrict = |shape: &Option<ShapeRef>| {
            shape.as_ref().map(|s| {
                let (opt, c) = Arc::clone(s).optimize(ctx.unordered());
                changed |= c;
                opt
            })
        };
        let via = restrict(&self.via);
        let labels = restrict(&self.labels);

        if is_null(&from) || via.as_ref().is_some_and(is_null) || labels.as_ref().is_some_and(is_null) {
            return (null(), true);
        }
        if !changed {
            return (self, false);
        }
        let step = Step {
            store: Arc::clone(&self.store),
            from,
            from_dir: self.from_dir,
            to_dir: self.to_dir,
            via,
            labels,
            via_tags: self.via_tags.clone(),
        };
        (Arc::new(step), true)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Predicate and label checks applied to each candidate quad.
struct Filters {
    via: Option<Box<dyn Index>>,
    labels: Option<Box<dyn Index>>,
    via_tags: Vec<String>,
}

impl Filters {
    /// Binding sets contributed by the checks, or `None` if the quad is rejected.
    fn check(
        &mut self,
        cancel: &CancelToken,
        quad: &Quad,
    ) -> Result<Option<Vec<Vec<Tags>>>, QueryError> {
        let mut sets = Vec::new();
        if let Some(via) = &mut self.via {
            if !via.contains(cancel, quad.predicate) {
                return via.err().map_or(Ok(None), |err| Err(err.clone()));
            }
            sets.push(collect_paths(via.as_mut(), cancel)?);
        }
        if !self.via_tags.is_empty() {
            let bound = self
                .via_tags
                .iter()
                .map(|t| (t.clone(), quad.predicate))
                .collect();
            sets.push(vec![bound]);
        }
        if let Some(labels) = &mut self.labels {
            let Some(label) = quad.label else {
                return Ok(None);
            };
            if !labels.contains(cancel, label) {
                return labels.err().map_or(Ok(None), |err| Err(err.clone()));
            }
            sets.push(collect_paths(labels.as_mut(), cancel)?);
        }
        Ok(Some(sets))
    }

    fn close(&mut self, closer: &mut Closer) {
        if let Some(via) = &mut self.via {
            closer.close(via.as_mut());
        }
        if let Some(labels) = &mut self.labels {
            closer.close(labels.as_mut());
        }
    }
}

struct StepScanner {
    store: Arc<dyn QuadStore>,
    from: Box<dyn Scanner>,
    from_dir: Direction,
    to_dir: Direction,
    filters: Filters,
    from_paths: Vec<Tags>,
    pending: Vec<QuadId>,
    pos: usize,
    combos: Combinations,
    current: Option<Handle>,
    status: Status,
}

impl Base for StepScanner {
    fn result(&self) -> Option<Handle> {
        self.current
    }

    fn tag_results(&self, dst: &mut Tags) {
        self.combos.tag_results(dst);
    }

    fn next_path(&mut self, cancel: &CancelToken) -> bool {
        self.current.is_some() && self.status.ready(cancel) && self.combos.advance()
    }

    fn err(&self) -> Option<&QueryError> {
        self.status.err()
    }

    fn close(&mut self) -> Result<(), QueryError> {
        self.status.close();
        self.current = None;
        let mut closer = Closer::default();
        closer.close(self.from.as_mut());
        self.filters.close(&mut closer);
        closer.finish()
    }
}

impl Scanner for StepScanner {
    fn next(&mut self, cancel: &CancelToken) -> bool {
        self.current = None;
        loop {
            if !self.status.ready(cancel) {
                return false;
            }
            if let Some(&id) = self.pending.get(self.pos) {
                self.pos += 1;
                let Some(quad) = self.store.quad(id) else {
                    continue;
                };
                let Some(target) = quad.get(self.to_dir) else {
                    continue;
                };
                match self.filters.check(cancel, &quad) {
                    Ok(Some(mut sets)) => {
                        sets.insert(0, self.from_paths.clone());
                        self.combos = Combinations::new(sets);
                        self.current = Some(target);
                        return true;
                    }
                    Ok(None) => continue,
                    Err(err) => return self.status.fail(err),
                }
            }

            if !self.from.next(cancel) {
                return self.status.adopt(self.from.as_ref());
            }
            let Some(source) = self.from.result() else {
                continue;
            };
            match collect_paths(self.from.as_mut(), cancel) {
                Ok(paths) => self.from_paths = paths,
                Err(err) => return self.status.fail(err),
            }
            self.pending = self.store.quads_with(self.from_dir, source);
            self.pos = 0;
        }
    }
}

struct StepIndex {
    store: Arc<dyn QuadStore>,
    from: Box<dyn Index>,
    from_dir: Direction,
    to_dir: Direction,
    filters: Filters,
    paths: Vec<Tags>,
    path: usize,
    current: Option<Handle>,
    status: Status,
}

impl StepIndex {
    /// Every binding set under which `value` is reached.
    fn gather(&mut self, cancel: &CancelToken, value: Handle) -> Result<Vec<Tags>, QueryError> {
        let mut out = Vec::new();
        for id in self.store.quads_with(self.to_dir, value) {
            cancel.check()?;
            let Some(quad) = self.store.quad(id) else {
                continue;
            };
            let Some(source) = quad.get(self.from_dir) else {
                continue;
            };
            let Some(mut sets) = self.filters.check(cancel, &quad)? else {
                continue;
            };
            if !self.from.contains(cancel, source) {
                if let Some(err) = self.from.err() {
                    return Err(err.clone());
                }
                continue;
            }
            sets.insert(0, collect_paths(self.from.as_mut(), cancel)?);
            let mut combos = Combinations::new(sets);
            loop {
                let mut tags = Tags::new();
                combos.tag_results(&mut tags);
                out.push(tags);
                if !combos.advance() {
                    break;
                }
            }
        }
        Ok(out)
    }
}

impl Base for StepIndex {
    fn result(&self) -> Option<Handle> {
        self.current
    }

    fn tag_results(&self, dst: &mut Tags) {
        if self.current.is_some() {
            if let Some(tags) = self.paths.get(self.path) {
                dst.extend(tags.iter().map(|(k, v)| (k.clone(), *v)));
            }
        }
    }

    fn next_path(&mut self, cancel: &CancelToken) -> bool {
        if self.current.is_none() || !self.status.ready(cancel) {
            return false;
        }
        if self.path + 1 < self.paths.len() {
            self.path += 1;
            true
        } else {
            false
        }
    }

    fn err(&self) -> Option<&QueryError> {
        self.status.err()
    }

    fn close(&mut self) -> Result<(), QueryError> {
        self.status.close();
        self.current = None;
        let mut closer = Closer::default();
        closer.close(self.from.as_mut());
        self.filters.close(&mut closer);
        closer.finish()
    }
}

impl Index for StepIndex {
    fn contains(&mut self, cancel: &CancelToken, value: Handle) -> bool {
        self.current = None;
        self.path = 0;
        if !self.status.ready(cancel) {
            return false;
        }
        match self.gather(cancel, value) {
            Ok(paths) if paths.is_empty() => false,
            Ok(paths) => {
                self.paths = paths;
                self.current = Some(value);
                true
            }
            Err(err) => self.status.fail(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::super::{Fixed, Save};
    use super::*;
    use trellis_store::{MemStore, Value};

    struct Graph {
        store: Arc<dyn QuadStore>,
    }

    impl Graph {
        fn new() -> Self {
            let mut store = MemStore::new();
            store.add_triple("<a>", "<knows>", "<b>");
            store.add_triple("<a>", "<knows>", "<c>");
            store.add_triple("<a>", "<likes>", "<d>");
            store.add_quad("<b>", "<knows>", "<c>", Some(Value::iri("work")));
            Self {
                store: Arc::new(store),
            }
        }

        fn h(&self, iri: &str) -> Handle {
            self.store.intern(&Value::iri(iri)).unwrap()
        }

        fn set(&self, iris: &[&str]) -> ShapeRef {
            Arc::new(Fixed::new(iris.iter().map(|i| self.h(i)).collect()))
        }

        fn out(&self, from: &[&str]) -> Step {
            Step::new(
                Arc::clone(&self.store),
                self.set(from),
                Direction::Subject,
                Direction::Object,
            )
        }
    }

    #[test]
    fn test_out_step_with_predicate() {
        let g = Graph::new();
        let step = g.out(&["a"]).via(Some(g.set(&["knows"])), vec!["pred".into()]);
        let rows = scan(&step);
        let got: Vec<Handle> = rows.iter().map(|(h, _)| *h).collect();
        assert_eq!(got, vec![g.h("b"), g.h("c")]);
        assert_eq!(rows[0].1["pred"], g.h("knows"));
    }

    #[test]
    fn test_in_step_and_index() {
        let g = Graph::new();
        let step = Step::new(
            Arc::clone(&g.store),
            Arc::new(Save::new(g.set(&["c"]), vec!["target".into()])),
            Direction::Object,
            Direction::Subject,
        );
        assert_eq!(handles(&step), vec![g.h("a"), g.h("b")]);

        let paths = probe(&step, g.h("b")).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0]["target"], g.h("c"));
        assert!(probe(&step, g.h("d")).is_none());
    }

    #[test]
    fn test_label_restriction() {
        let g = Graph::new();
        let step = g.out(&["a", "b"]).labels(Some(g.set(&["work"])));
        assert_eq!(handles(&step), vec![g.h("c")]);
        assert!(probe(&step, g.h("b")).is_none());
    }

    #[test]
    fn test_null_operand_optimizes_away() {
        let g = Graph::new();
        let cancel = CancelToken::new();
        let step: ShapeRef = Arc::new(g.out(&["a"]).via(Some(fixed(&[])), vec![]));
        let (shape, changed) = step.optimize(OptimizeContext::new(&cancel));
        assert!(changed);
        assert_eq!(shape.name(), "null");
    }
}
