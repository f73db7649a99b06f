//! Tag binding.

use super::{is_null, Status};
use crate::cancel::CancelToken;
use crate::error::QueryError;
use crate::shape::{downcast, Base, Costs, Index, OptimizeContext, Scanner, Shape, ShapeRef, Tags};
use std::any::Any;
use std::sync::Arc;
use trellis_store::Handle;

/// Binds every tag name to the current result of the child.
#[derive(Debug, Clone)]
pub struct Save {
    sub: ShapeRef,
    tags: Vec<String>,
}

impl Save {
    pub fn new(sub: ShapeRef, tags: Vec<String>) -> Self {
        Self { sub, tags }
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl Shape for Save {
    fn name(&self) -> &'static str {
        "save"
    }

    fn iterate(&self) -> Box<dyn Scanner> {
        Box::new(SaveCursor {
            sub: self.sub.iterate(),
            tags: self.tags.clone(),
            status: Status::default(),
        })
    }

    fn lookup(&self) -> Box<dyn Index> {
        Box::new(SaveCursor {
            sub: self.sub.lookup(),
            tags: self.tags.clone(),
            status: Status::default(),
        })
    }

    fn children(&self) -> Vec<ShapeRef> {
        vec![Arc::clone(&self.sub)]
    }

    fn stats(&self, cancel: &CancelToken) -> Result<Costs, QueryError> {
        self.sub.stats(cancel)
    }

    fn optimize(self: Arc<Self>, ctx: OptimizeContext<'_>) -> (ShapeRef, bool) {
        let (sub, changed) = Arc::clone(&self.sub).optimize(ctx);
        if self.tags.is_empty() || is_null(&sub) {
            return (sub, true);
        }
        if let Some(inner) = downcast::<Save>(&sub) {
            let mut tags = inner.tags.clone();
            for tag in &self.tags {
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
            }
            return (Arc::new(Save::new(Arc::clone(&inner.sub), tags)), true);
        }
        if changed {
            return (Arc::new(Save::new(sub, self.tags.clone())), true);
        }
        (self, false)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Works over either cursor role of the child.
struct SaveCursor<C: ?Sized> {
    sub: Box<C>,
    tags: Vec<String>,
    status: Status,
}

impl<C: Base + ?Sized> Base for SaveCursor<C> {
    fn result(&self) -> Option<Handle> {
        self.sub.result()
    }

    fn tag_results(&self, dst: &mut Tags) {
        self.sub.tag_results(dst);
        if let Some(h) = self.sub.result() {
            for tag in &self.tags {
                dst.insert(tag.clone(), h);
            }
        }
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

impl Scanner for SaveCursor<dyn Scanner> {
    fn next(&mut self, cancel: &CancelToken) -> bool {
        if !self.status.ready(cancel) {
            return false;
        }
        self.sub.next(cancel) || self.status.adopt(self.sub.as_ref())
    }
}

impl Index for SaveCursor<dyn Index> {
    fn contains(&mut self, cancel: &CancelToken, value: Handle) -> bool {
        if !self.status.ready(cancel) {
            return false;
        }
        self.sub.contains(cancel, value) || self.status.adopt(self.sub.as_ref())
    }
}
