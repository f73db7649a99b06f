//! Deduplication by handle.

use super::{is_null, Materialized, Status};
use crate::cancel::CancelToken;
use crate::error::QueryError;
use crate::shape::{Base, Costs, Index, OptimizeContext, Scanner, Shape, ShapeRef, Tags};
use roaring::RoaringBitmap;
use std::any::Any;
use std::sync::Arc;
use trellis_store::Handle;

/// Yields each handle once, at its first occurrence. The alternate bindings
/// of that occurrence stay reachable through `next_path`.
#[derive(Debug, Clone)]
pub struct Unique {
    sub: ShapeRef,
}

impl Unique {
    pub fn new(sub: ShapeRef) -> Self {
        Self { sub }
    }
}

impl Shape for Unique {
    fn name(&self) -> &'static str {
        "unique"
    }

    fn iterate(&self) -> Box<dyn Scanner> {
        Box::new(UniqueScanner {
            sub: self.sub.iterate(),
            seen: RoaringBitmap::new(),
            status: Status::default(),
        })
    }

    fn lookup(&self) -> Box<dyn Index> {
        // Only the first occurrence's bindings may be reported.
        Box::new(Materialized::new(self.iterate()))
    }

    fn children(&self) -> Vec<ShapeRef> {
        vec![Arc::clone(&self.sub)]
    }

    fn stats(&self, cancel: &CancelToken) -> Result<Costs, QueryError> {
        let mut costs = self.sub.stats(cancel)?;
        costs.size.exact = false;
        Ok(costs)
    }

    fn optimize(self: Arc<Self>, ctx: OptimizeContext<'_>) -> (ShapeRef, bool) {
        let (sub, changed) = Arc::clone(&self.sub).optimize(ctx.ordered());
        if is_null(&sub) || sub.as_any().is::<Unique>() {
            return (sub, true);
        }
        if changed {
            return (Arc::new(Unique::new(sub)), true);
        }
        (self, false)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct UniqueScanner {
    sub: Box<dyn Scanner>,
    seen: RoaringBitmap,
    status: Status,
}

impl Base for UniqueScanner {
    fn result(&self) -> Option<Handle> {
        self.sub.result()
    }

    fn tag_results(&self, dst: &mut Tags) {
        self.sub.tag_results(dst);
    }

    fn next_path(&mut self, cancel: &CancelToken) -> bool {
        if !self.status.ready(cancel) {
            return false;
        }
        self.sub.next_path(cancel) || self.status.adopt(self.sub.as_ref())
    }

    fn err(&self) -> Option<&QueryError> {
        self.status.err()
    }

    fn close(&mut self) -> Result<(), QueryError> {
        self.status.close();
        self.seen.clear();
        self.sub.close()
    }
}

impl Scanner for UniqueScanner {
    fn next(&mut self, cancel: &CancelToken) -> bool {
        while self.status.ready(cancel) {
            if !self.sub.next(cancel) {
                return self.status.adopt(self.sub.as_ref());
            }
            if let Some(h) = self.sub.result() {
                if self.seen.insert(h.raw()) {
                    return true;
                }
            }
        }
        false
    }
}
