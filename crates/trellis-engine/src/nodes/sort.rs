//! Ordering by resolved value.

use super::{is_null, Status};
use crate::cancel::CancelToken;
use crate::error::QueryError;
use crate::shape::{
    collect_paths, Base, Costs, Index, OptimizeContext, Scanner, Shape, ShapeRef, Tags,
};
use std::any::Any;
use std::sync::Arc;
use trellis_store::{Handle, QuadStore, Value};

/// Materializes the child and yields its results in ascending value order
/// (stable, so equal values keep their child order).
#[derive(Debug, Clone)]
pub struct Sort {
    sub: ShapeRef,
    store: Arc<dyn QuadStore>,
}

impl Sort {
    pub fn new(sub: ShapeRef, store: Arc<dyn QuadStore>) -> Self {
        Self { sub, store }
    }
}

impl Shape for Sort {
    fn name(&self) -> &'static str {
        "sort"
    }

    fn iterate(&self) -> Box<dyn Scanner> {
        Box::new(SortScanner {
            sub: Some(self.sub.iterate()),
            store: Arc::clone(&self.store),
            rows: Vec::new(),
            pos: None,
            path: 0,
            status: Status::default(),
        })
    }

    fn lookup(&self) -> Box<dyn Index> {
        self.sub.lookup()
    }

    fn children(&self) -> Vec<ShapeRef> {
        vec![Arc::clone(&self.sub)]
    }

    fn stats(&self, cancel: &CancelToken) -> Result<Costs, QueryError> {
        let mut costs = self.sub.stats(cancel)?;
        costs.next_cost += costs.size.value.max(1).ilog2() as i64 + 1;
        Ok(costs)
    }

    fn optimize(self: Arc<Self>, ctx: OptimizeContext<'_>) -> (ShapeRef, bool) {
        // Ties keep child order, so the child inherits the caller's ordering needs.
        let (sub, changed) = Arc::clone(&self.sub).optimize(ctx);
        if is_null(&sub) || sub.as_any().is::<Sort>() {
            return (sub, true);
        }
        if changed {
            return (Arc::new(Sort::new(sub, Arc::clone(&self.store))), true);
        }
        (self, false)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct SortScanner {
    sub: Option<Box<dyn Scanner>>,
    store: Arc<dyn QuadStore>,
    rows: Vec<(Handle, Vec<Tags>)>,
    pos: Option<usize>,
    path: usize,
    status: Status,
}

impl SortScanner {
    fn load(&mut self, cancel: &CancelToken) -> bool {
        let Some(mut sub) = self.sub.take() else {
            return true;
        };
        let mut rows: Vec<(Value, Handle, Vec<Tags>)> = Vec::new();
        let mut ok = true;
        while ok && sub.next(cancel) {
            let Some(h) = sub.result() else {
                continue;
            };
            let Some(value) = self.store.resolve(h) else {
                ok = self.status.fail(QueryError::UnknownHandle(h));
                break;
            };
            match collect_paths(sub.as_mut(), cancel) {
                Ok(paths) => rows.push((value, h, paths)),
                Err(err) => ok = self.status.fail(err),
            }
        }
        if ok {
            self.status.adopt(sub.as_ref());
            ok = !self.status.failed();
        }
        if let Err(err) = sub.close() {
            ok = self.status.fail(err);
        }
        rows.sort_by(|a, b| a.0.total_cmp(&b.0));
        self.rows = rows.into_iter().map(|(_, h, paths)| (h, paths)).collect();
        ok
    }
}

impl Base for SortScanner {
    fn result(&self) -> Option<Handle> {
        self.pos.and_then(|i| self.rows.get(i)).map(|(h, _)| *h)
    }

    fn tag_results(&self, dst: &mut Tags) {
        let row = self.pos.and_then(|i| self.rows.get(i));
        if let Some(tags) = row.and_then(|(_, paths)| paths.get(self.path)) {
            dst.extend(tags.iter().map(|(k, v)| (k.clone(), *v)));
        }
    }

    fn next_path(&mut self, cancel: &CancelToken) -> bool {
        if !self.status.ready(cancel) {
            return false;
        }
        let len = self
            .pos
            .and_then(|i| self.rows.get(i))
            .map_or(0, |(_, paths)| paths.len());
        if self.path + 1 < len {
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
        self.rows.clear();
        match self.sub.take() {
            Some(mut sub) => sub.close(),
            None => Ok(()),
        }
    }
}

impl Scanner for SortScanner {
    fn next(&mut self, cancel: &CancelToken) -> bool {
        if !self.status.ready(cancel) || !self.load(cancel) {
            self.pos = None;
            return false;
        }
        let next = self.pos.map_or(0, |i| i + 1);
        self.path = 0;
        if next < self.rows.len() {
            self.pos = Some(next);
            true
        } else {
            self.pos = Some(self.rows.len());
            false
        }
    }
}
