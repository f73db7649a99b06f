//! Value-transforming plan nodes.
//!
//! [`ValueFilter`] and [`ValueMapper`] wrap one child shape and an opaque,
//! fallible user function over resolved domain values. The optimizer can
//! rewrite their child but never looks inside the function.

use crate::cancel::CancelToken;
use crate::error::QueryError;
use crate::nodes::{Materialized, Status};
use crate::shape::{Base, Costs, Index, OptimizeContext, Scanner, Shape, ShapeRef, Size, Tags};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use trellis_store::{Handle, QuadStore, Value};

/// Estimated fraction of child results a transform keeps is `1 / FILTER_SIZE_DIVISOR`.
pub const FILTER_SIZE_DIVISOR: i64 = 2;

pub type FilterFn = Arc<dyn Fn(&Value) -> anyhow::Result<bool> + Send + Sync>;
pub type MapFn = Arc<dyn Fn(&Value) -> anyhow::Result<Value> + Send + Sync>;

/// Size estimate shared by every filtering node: `child / divisor + 1`, inexact.
pub(crate) fn filtered_size(child: Size) -> Size {
    Size::estimate(child.value / FILTER_SIZE_DIVISOR + 1)
}

fn callback_failed(node: &'static str, err: anyhow::Error) -> QueryError {
    tracing::warn!(node, error = %err, "transform callback failed");
    QueryError::callback(err)
}

// ============================================================================
// ValueFilter
// ============================================================================

/// Child results whose resolved value the predicate accepts, in child order.
#[derive(Clone)]
pub struct ValueFilter {
    sub: ShapeRef,
    store: Arc<dyn QuadStore>,
    filter: FilterFn,
}

impl fmt::Debug for ValueFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueFilter")
            .field("sub", &self.sub)
            .finish_non_exhaustive()
    }
}

impl ValueFilter {
    pub fn new(sub: ShapeRef, store: Arc<dyn QuadStore>, filter: FilterFn) -> Self {
        Self { sub, store, filter }
    }
}

impl Shape for ValueFilter {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn iterate(&self) -> Box<dyn Scanner> {
        Box::new(FilterScanner {
            sub: self.sub.iterate(),
            store: Arc::clone(&self.store),
            filter: Arc::clone(&self.filter),
            status: Status::default(),
        })
    }

    fn lookup(&self) -> Box<dyn Index> {
        Box::new(FilterIndex {
            sub: self.sub.lookup(),
            store: Arc::clone(&self.store),
            filter: Arc::clone(&self.filter),
            status: Status::default(),
        })
    }

    fn children(&self) -> Vec<ShapeRef> {
        vec![Arc::clone(&self.sub)]
    }

    fn stats(&self, cancel: &CancelToken) -> Result<Costs, QueryError> {
        let sub = self.sub.stats(cancel)?;
        Ok(Costs {
            contains_cost: sub.contains_cost + 1,
            next_cost: sub.next_cost + 1,
            size: filtered_size(sub.size),
        })
    }

    fn optimize(self: Arc<Self>, ctx: OptimizeContext<'_>) -> (ShapeRef, bool) {
        let (sub, changed) = Arc::clone(&self.sub).optimize(ctx);
        if !changed {
            return (self, false);
        }
        let node = ValueFilter::new(sub, Arc::clone(&self.store), Arc::clone(&self.filter));
        (Arc::new(node), true)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct FilterScanner {
    sub: Box<dyn Scanner>,
    store: Arc<dyn QuadStore>,
    filter: FilterFn,
    status: Status,
}

impl Base for FilterScanner {
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

impl Scanner for FilterScanner {
    fn next(&mut self, cancel: &CancelToken) -> bool {
        while self.status.ready(cancel) {
            if !self.sub.next(cancel) {
                return self.status.adopt(self.sub.as_ref());
            }
            let Some(h) = self.sub.result() else {
                continue;
            };
            let Some(value) = self.store.resolve(h) else {
                return self.status.fail(QueryError::UnknownHandle(h));
            };
            match (self.filter)(&value) {
                Ok(true) => return true,
                Ok(false) => continue,
                Err(err) => return self.status.fail(callback_failed("filter", err)),
            }
        }
        false
    }
}

struct FilterIndex {
    sub: Box<dyn Index>,
    store: Arc<dyn QuadStore>,
    filter: FilterFn,
    status: Status,
}

impl Base for FilterIndex {
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

impl Index for FilterIndex {
    fn contains(&mut self, cancel: &CancelToken, value: Handle) -> bool {
        if !self.status.ready(cancel) {
            return false;
        }
        // A candidate the store cannot resolve cannot be a child result.
        let Some(resolved) = self.store.resolve(value) else {
            return false;
        };
        match (self.filter)(&resolved) {
            Ok(true) => self.sub.contains(cancel, value) || self.status.adopt(self.sub.as_ref()),
            Ok(false) => false,
            Err(err) => self.status.fail(callback_failed("filter", err)),
        }
    }
}

// ============================================================================
// ValueMapper
// ============================================================================

/// The image of the child under a value function. Outputs the store does not
/// hold are dropped silently.
#[derive(Clone)]
pub struct ValueMapper {
    sub: ShapeRef,
    store: Arc<dyn QuadStore>,
    mapper: MapFn,
}

impl fmt::Debug for ValueMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueMapper")
            .field("sub", &self.sub)
            .finish_non_exhaustive()
    }
}

impl ValueMapper {
    pub fn new(sub: ShapeRef, store: Arc<dyn QuadStore>, mapper: MapFn) -> Self {
        Self { sub, store, mapper }
    }
}

impl Shape for ValueMapper {
    fn name(&self) -> &'static str {
        "map"
    }

    fn iterate(&self) -> Box<dyn Scanner> {
        Box::new(MapScanner {
            sub: self.sub.iterate(),
            store: Arc::clone(&self.store),
            mapper: Arc::clone(&self.mapper),
            current: None,
            status: Status::default(),
        })
    }

    /// `contains(x)` holds iff some child result `y` maps to `x`. The function
    /// cannot be inverted, so the child's image is built on the first probe.
    fn lookup(&self) -> Box<dyn Index> {
        Box::new(Materialized::new(self.iterate()))
    }

    fn children(&self) -> Vec<ShapeRef> {
        vec![Arc::clone(&self.sub)]
    }

    fn stats(&self, cancel: &CancelToken) -> Result<Costs, QueryError> {
        let sub = self.sub.stats(cancel)?;
        Ok(Costs {
            contains_cost: sub.next_cost * sub.size.value.max(1),
            next_cost: sub.next_cost + 1,
            size: filtered_size(sub.size),
        })
    }

    fn optimize(self: Arc<Self>, ctx: OptimizeContext<'_>) -> (ShapeRef, bool) {
        let (sub, changed) = Arc::clone(&self.sub).optimize(ctx);
        if !changed {
            return (self, false);
        }
        let node = ValueMapper::new(sub, Arc::clone(&self.store), Arc::clone(&self.mapper));
        (Arc::new(node), true)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct MapScanner {
    sub: Box<dyn Scanner>,
    store: Arc<dyn QuadStore>,
    mapper: MapFn,
    current: Option<Handle>,
    status: Status,
}

impl Base for MapScanner {
    fn result(&self) -> Option<Handle> {
        self.current
    }

    fn tag_results(&self, dst: &mut Tags) {
        self.sub.tag_results(dst);
    }

    fn next_path(&mut self, cancel: &CancelToken) -> bool {
        if self.current.is_none() || !self.status.ready(cancel) {
            return false;
        }
        self.sub.next_path(cancel) || self.status.adopt(self.sub.as_ref())
    }

    fn err(&self) -> Option<&QueryError> {
        self.status.err()
    }

    fn close(&mut self) -> Result<(), QueryError> {
        self.status.close();
        self.current = None;
        self.sub.close()
    }
}

impl Scanner for MapScanner {
    fn next(&mut self, cancel: &CancelToken) -> bool {
        self.current = None;
        while self.status.ready(cancel) {
            if !self.sub.next(cancel) {
                return self.status.adopt(self.sub.as_ref());
            }
            let Some(h) = self.sub.result() else {
                continue;
            };
            let Some(value) = self.store.resolve(h) else {
                return self.status.fail(QueryError::UnknownHandle(h));
            };
            let mapped = match (self.mapper)(&value) {
                Ok(mapped) => mapped,
                Err(err) => return self.status.fail(callback_failed("map", err)),
            };
            if let Some(out) = self.store.intern(&mapped) {
                self.current = Some(out);
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::testing::{handles, probe};
    use crate::nodes::{Fixed, Save};
    use trellis_store::MemStore;

    struct Numbers {
        store: Arc<dyn QuadStore>,
    }

    impl Numbers {
        fn new(values: &[i64]) -> Self {
            let mut store = MemStore::new();
            for v in values {
                store.add_value(*v);
            }
            Self {
                store: Arc::new(store),
            }
        }

        fn h(&self, v: i64) -> Handle {
            self.store.intern(&Value::Int(v)).unwrap()
        }

        fn set(&self, values: &[i64]) -> ShapeRef {
            Arc::new(Fixed::new(values.iter().map(|v| self.h(*v)).collect()))
        }
    }

    fn doubling() -> MapFn {
        Arc::new(|v: &Value| match v {
            Value::Int(n) => Ok(Value::Int(n * 2)),
            other => anyhow::bail!("not a number: {other}"),
        })
    }

    fn even() -> FilterFn {
        Arc::new(|v: &Value| Ok::<_, anyhow::Error>(matches!(v, Value::Int(n) if n % 2 == 0)))
    }

    #[test]
    fn test_filter_preserves_order_and_tags() {
        let n = Numbers::new(&[1, 2, 3, 4]);
        let sub: ShapeRef = Arc::new(Save::new(n.set(&[4, 1, 2, 3]), vec!["x".into()]));
        let filter = ValueFilter::new(sub, Arc::clone(&n.store), even());
        assert_eq!(handles(&filter), vec![n.h(4), n.h(2)]);
        let paths = probe(&filter, n.h(2)).unwrap();
        assert_eq!(paths[0]["x"], n.h(2));
        assert!(probe(&filter, n.h(3)).is_none());
    }

    #[test]
    fn test_mapper_drops_unknown_outputs() {
        // 5 * 2 = 10 is not stored, so 5 contributes nothing.
        let n = Numbers::new(&[1, 2, 4, 5]);
        let mapper = ValueMapper::new(n.set(&[1, 2, 5]), Arc::clone(&n.store), doubling());
        assert_eq!(handles(&mapper), vec![n.h(2), n.h(4)]);
    }

    #[test]
    fn test_mapper_index_is_existential() {
        let n = Numbers::new(&[1, 2, 3, 4, 6]);
        let sub: ShapeRef = Arc::new(Save::new(n.set(&[1, 2, 3]), vec!["src".into()]));
        let mapper = ValueMapper::new(sub, Arc::clone(&n.store), doubling());
        let paths = probe(&mapper, n.h(6)).unwrap();
        assert_eq!(paths[0]["src"], n.h(3));
        assert!(probe(&mapper, n.h(3)).is_none());
        assert!(probe(&mapper, n.h(1)).is_none());
    }

    #[test]
    fn test_callback_failure_stops_scan() {
        let mut store = MemStore::new();
        let one = store.add_value(1i64);
        let text = store.add_value("two");
        let two = store.add_value(2i64);
        let store: Arc<dyn QuadStore> = Arc::new(store);
        let sub: ShapeRef = Arc::new(Fixed::new(vec![one, text, two]));
        let mapper = ValueMapper::new(sub, store, doubling());

        let cancel = CancelToken::new();
        let mut it = mapper.iterate();
        assert!(it.next(&cancel));
        assert_eq!(it.result(), Some(two));
        assert!(!it.next(&cancel));
        assert!(matches!(it.err(), Some(QueryError::Callback(_))));
        assert!(!it.next(&cancel));
        it.close().unwrap();
    }

    #[test]
    fn test_optimize_reports_child_change_only() {
        let n = Numbers::new(&[1]);
        let cancel = CancelToken::new();
        let stable: ShapeRef = Arc::new(ValueFilter::new(n.set(&[1]), Arc::clone(&n.store), even()));
        let (_, changed) = stable.optimize(OptimizeContext::new(&cancel));
        assert!(!changed);

        let empty: ShapeRef = Arc::new(Fixed::new(vec![]));
        let rewritable: ShapeRef = Arc::new(ValueFilter::new(empty, Arc::clone(&n.store), even()));
        let (shape, changed) = rewritable.optimize(OptimizeContext::new(&cancel));
        assert!(changed);
        assert_eq!(shape.name(), "filter");
        assert_eq!(shape.children()[0].name(), "null");
    }

    #[test]
    fn test_size_estimate() {
        let n = Numbers::new(&[1, 2, 3, 4]);
        let cancel = CancelToken::new();
        let filter = ValueFilter::new(n.set(&[1, 2, 3, 4]), Arc::clone(&n.store), even());
        let costs = filter.stats(&cancel).unwrap();
        assert_eq!(costs.size, Size::estimate(3));
    }
}
