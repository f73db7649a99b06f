//! Result paging: `Limit` and `Skip`.
//!
//! Both depend on enumeration order, so they ask their child to keep it, and
//! their index role is the membership of what the scanner would yield.

use super::{is_null, Materialized, Status};
use crate::cancel::CancelToken;
use crate::error::QueryError;
use crate::shape::{downcast, Base, Costs, Index, OptimizeContext, Scanner, Shape, ShapeRef, Tags};
use std::any::Any;
use std::sync::Arc;
use trellis_store::Handle;

// ============================================================================
// Limit
// ============================================================================

/// At most `limit` rows, counting alternate paths as rows. Zero is unbounded.
#[derive(Debug, Clone)]
pub struct Limit {
    sub: ShapeRef,
    limit: usize,
}

impl Limit {
    pub fn new(sub: ShapeRef, limit: usize) -> Self {
        Self { sub, limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Shape for Limit {
    fn name(&self) -> &'static str {
        "limit"
    }

    fn iterate(&self) -> Box<dyn Scanner> {
        Box::new(LimitScanner {
            sub: self.sub.iterate(),
            limit: self.limit,
            count: 0,
            status: Status::default(),
        })
    }

    fn lookup(&self) -> Box<dyn Index> {
        if self.limit == 0 {
            return self.sub.lookup();
        }
        Box::new(Materialized::new(self.iterate()))
    }

    fn children(&self) -> Vec<ShapeRef> {
        vec![Arc::clone(&self.sub)]
    }

    fn stats(&self, cancel: &CancelToken) -> Result<Costs, QueryError> {
        let mut costs = self.sub.stats(cancel)?;
        if self.limit > 0 {
            costs.size.value = costs.size.value.min(self.limit as i64);
        }
        Ok(costs)
    }

    fn optimize(self: Arc<Self>, ctx: OptimizeContext<'_>) -> (ShapeRef, bool) {
        let (sub, changed) = Arc::clone(&self.sub).optimize(ctx.ordered());
        if self.limit == 0 || is_null(&sub) {
            return (sub, true);
        }
        if let Some(inner) = downcast::<Limit>(&sub) {
            let limit = match inner.limit {
                0 => self.limit,
                n => n.min(self.limit),
            };
            return (Arc::new(Limit::new(Arc::clone(&inner.sub), limit)), true);
        }
        if changed {
            return (Arc::new(Limit::new(sub, self.limit)), true);
        }
        (self, false)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct LimitScanner {
    sub: Box<dyn Scanner>,
    limit: usize,
    count: usize,
    status: Status,
}

impl LimitScanner {
    fn exhausted(&self) -> bool {
        self.limit > 0 && self.count >= self.limit
    }
}

impl Base for LimitScanner {
    fn result(&self) -> Option<Handle> {
        self.sub.result()
    }

    fn tag_results(&self, dst: &mut Tags) {
        self.sub.tag_results(dst);
    }

    fn next_path(&mut self, cancel: &CancelToken) -> bool {
        if self.exhausted() || !self.status.ready(cancel) {
            return false;
        }
        if self.sub.next_path(cancel) {
            self.count += 1;
            return true;
        }
        self.status.adopt(self.sub.as_ref())
    }

    fn err(&self) -> Option<&QueryError> {
        self.status.err()
    }

    fn close(&mut self) -> Result<(), QueryError> {
        self.status.close();
        self.sub.close()
    }
}

impl Scanner for LimitScanner {
    fn next(&mut self, cancel: &CancelToken) -> bool {
        if self.exhausted() || !self.status.ready(cancel) {
            return false;
        }
        if self.sub.next(cancel) {
            self.count += 1;
            return true;
        }
        self.status.adopt(self.sub.as_ref())
    }
}

// ============================================================================
// Skip
// ============================================================================

/// Drops the first `skip` results (alternate paths of a skipped result go with it).
#[derive(Debug, Clone)]
pub struct Skip {
    sub: ShapeRef,
    skip: usize,
}

impl Skip {
    pub fn new(sub: ShapeRef, skip: usize) -> Self {
        Self { sub, skip }
    }

    pub fn skip(&self) -> usize {
        self.skip
    }
}

impl Shape for Skip {
    fn name(&self) -> &'static str {
        "skip"
    }

    fn iterate(&self) -> Box<dyn Scanner> {
        Box::new(SkipScanner {
            sub: self.sub.iterate(),
            remaining: self.skip,
            status: Status::default(),
        })
    }

    fn lookup(&self) -> Box<dyn Index> {
        if self.skip == 0 {
            return self.sub.lookup();
        }
        Box::new(Materialized::new(self.iterate()))
    }

    fn children(&self) -> Vec<ShapeRef> {
        vec![Arc::clone(&self.sub)]
    }

    fn stats(&self, cancel: &CancelToken) -> Result<Costs, QueryError> {
        let mut costs = self.sub.stats(cancel)?;
        costs.size.value = (costs.size.value - self.skip as i64).max(0);
        Ok(costs)
    }

    fn optimize(self: Arc<Self>, ctx: OptimizeContext<'_>) -> (ShapeRef, bool) {
        let (sub, changed) = Arc::clone(&self.sub).optimize(ctx.ordered());
        if self.skip == 0 || is_null(&sub) {
            return (sub, true);
        }
        if let Some(inner) = downcast::<Skip>(&sub) {
            let skip = inner.skip + self.skip;
            return (Arc::new(Skip::new(Arc::clone(&inner.sub), skip)), true);
        }
        if changed {
            return (Arc::new(Skip::new(sub, self.skip)), true);
        }
        (self, false)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct SkipScanner {
    sub: Box<dyn Scanner>,
    remaining: usize,
    status: Status,
}

impl Base for SkipScanner {
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
        self.sub.close()
    }
}

impl Scanner for SkipScanner {
    fn next(&mut self, cancel: &CancelToken) -> bool {
        while self.remaining > 0 {
            if !self.status.ready(cancel) {
                return false;
            }
            if !self.sub.next(cancel) {
                return self.status.adopt(self.sub.as_ref());
            }
            self.remaining -= 1;
        }
        if !self.status.ready(cancel) {
            return false;
        }
        self.sub.next(cancel) || self.status.adopt(self.sub.as_ref())
    }
}
