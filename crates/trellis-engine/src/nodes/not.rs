//! Complement within a universe.

use super::{is_null, Status};
use crate::cancel::CancelToken;
use crate::error::QueryError;
use crate::shape::{Base, Closer, Costs, Index, OptimizeContext, Scanner, Shape, ShapeRef, Size, Tags};
use std::any::Any;
use std::sync::Arc;
use trellis_store::Handle;

/// Members of `all` that `forbidden` does not contain. Only the bindings of
/// `all` are reported.
#[derive(Debug, Clone)]
pub struct Not {
    forbidden: ShapeRef,
    all: ShapeRef,
}

impl Not {
    pub fn new(forbidden: ShapeRef, all: ShapeRef) -> Self {
        Self { forbidden, all }
    }
}

impl Shape for Not {
    fn name(&self) -> &'static str {
        "not"
    }

    fn iterate(&self) -> Box<dyn Scanner> {
        Box::new(NotScanner {
            all: self.all.iterate(),
            forbidden: self.forbidden.lookup(),
            status: Status::default(),
        })
    }

    fn lookup(&self) -> Box<dyn Index> {
        Box::new(NotIndex {
            all: self.all.lookup(),
            forbidden: self.forbidden.lookup(),
            status: Status::default(),
        })
    }

    fn children(&self) -> Vec<ShapeRef> {
        vec![Arc::clone(&self.forbidden), Arc::clone(&self.all)]
    }

    fn stats(&self, cancel: &CancelToken) -> Result<Costs, QueryError> {
        let all = self.all.stats(cancel)?;
        let forbidden = self.forbidden.stats(cancel)?;
        Ok(Costs {
            contains_cost: all.contains_cost + forbidden.contains_cost,
            next_cost: all.next_cost + forbidden.contains_cost,
            size: Size::estimate((all.size.value - forbidden.size.value).max(0)),
        })
    }

    fn optimize(self: Arc<Self>, ctx: OptimizeContext<'_>) -> (ShapeRef, bool) {
        let (forbidden, fc) = Arc::clone(&self.forbidden).optimize(ctx.unordered());
        let (all, ac) = Arc::clone(&self.all).optimize(ctx);
        if is_null(&forbidden) || is_null(&all) {
            return (all, true);
        }
        if fc || ac {
            return (Arc::new(Not::new(forbidden, all)), true);
        }
        (self, false)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct NotScanner {
    all: Box<dyn Scanner>,
    forbidden: Box<dyn Index>,
    status: Status,
}

impl Base for NotScanner {
    fn result(&self) -> Option<Handle> {
        self.all.result()
    }

    fn tag_results(&self, dst: &mut Tags) {
        self.all.tag_results(dst);
    }

    fn next_path(&mut self, cancel: &CancelToken) -> bool {
        if !self.status.ready(cancel) {
            return false;
        }
        self.all.next_path(cancel) || self.status.adopt(self.all.as_ref())
    }

    fn err(&self) -> Option<&QueryError> {
        self.status.err()
    }

    fn close(&mut self) -> Result<(), QueryError> {
        self.status.close();
        let mut closer = Closer::default();
        closer.close(self.all.as_mut());
        closer.close(self.forbidden.as_mut());
        closer.finish()
    }
}

impl Scanner for NotScanner {
    fn next(&mut self, cancel: &CancelToken) -> bool {
        while self.status.ready(cancel) {
            if !self.all.next(cancel) {
                return self.status.adopt(self.all.as_ref());
            }
            let Some(value) = self.all.result() else {
                continue;
            };
            if !self.forbidden.contains(cancel, value) {
                if self.forbidden.err().is_some() {
                    return self.status.adopt(self.forbidden.as_ref());
                }
                return true;
            }
        }
        false
    }
}

struct NotIndex {
    all: Box<dyn Index>,
    forbidden: Box<dyn Index>,
    status: Status,
}

impl Base for NotIndex {
    fn result(&self) -> Option<Handle> {
        self.all.result()
    }

    fn tag_results(&self, dst: &mut Tags) {
        self.all.tag_results(dst);
    }

    fn next_path(&mut self, cancel: &CancelToken) -> bool {
        if !self.status.ready(cancel) {
            return false;
        }
        self.all.next_path(cancel) || self.status.adopt(self.all.as_ref())
    }

    fn err(&self) -> Option<&QueryError> {
        self.status.err()
    }

    fn close(&mut self) -> Result<(), QueryError> {
        self.status.close();
        let mut closer = Closer::default();
        closer.close(self.all.as_mut());
        closer.close(self.forbidden.as_mut());
        closer.finish()
    }
}

impl Index for NotIndex {
    fn contains(&mut self, cancel: &CancelToken, value: Handle) -> bool {
        if !self.status.ready(cancel) {
            return false;
        }
        if self.forbidden.contains(cancel, value) {
            return false;
        }
        if self.forbidden.err().is_some() {
            return self.status.adopt(self.forbidden.as_ref());
        }
        self.all.contains(cancel, value) || self.status.adopt(self.all.as_ref())
    }
}
