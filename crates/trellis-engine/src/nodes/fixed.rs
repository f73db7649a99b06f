//! Leaf nodes: literal handle sets, the empty set and "every value".

use super::{null, Status};
use crate::cancel::CancelToken;
use crate::error::QueryError;
use crate::shape::{Base, Costs, Index, OptimizeContext, Scanner, Shape, ShapeRef, Size, Tags};
use ahash::AHashSet;
use std::any::Any;
use std::sync::Arc;
use trellis_store::{Handle, QuadStore};

// ============================================================================
// Fixed
// ============================================================================

/// A literal, ordered set of handles.
#[derive(Debug, Clone)]
pub struct Fixed {
    values: Arc<[Handle]>,
}

impl Fixed {
    /// Duplicates are dropped; first occurrence keeps its position.
    pub fn new(values: Vec<Handle>) -> Self {
        let mut seen = AHashSet::with_capacity(values.len());
        let values: Vec<Handle> = values.into_iter().filter(|h| seen.insert(*h)).collect();
        Self {
            values: values.into(),
        }
    }

    pub fn values(&self) -> &[Handle] {
        &self.values
    }
}

impl Shape for Fixed {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn iterate(&self) -> Box<dyn Scanner> {
        Box::new(FixedScanner {
            values: Arc::clone(&self.values),
            pos: 0,
            current: None,
            status: Status::default(),
        })
    }

    fn lookup(&self) -> Box<dyn Index> {
        Box::new(FixedIndex {
            values: self.values.iter().copied().collect(),
            current: None,
            status: Status::default(),
        })
    }

    fn children(&self) -> Vec<ShapeRef> {
        Vec::new()
    }

    fn stats(&self, _cancel: &CancelToken) -> Result<Costs, QueryError> {
        Ok(Costs {
            contains_cost: 1,
            next_cost: 1,
            size: Size::exact(self.values.len() as i64),
        })
    }

    fn optimize(self: Arc<Self>, _ctx: OptimizeContext<'_>) -> (ShapeRef, bool) {
        if self.values.is_empty() {
            return (null(), true);
        }
        (self, false)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct FixedScanner {
    values: Arc<[Handle]>,
    pos: usize,
    current: Option<Handle>,
    status: Status,
}

impl Base for FixedScanner {
    fn result(&self) -> Option<Handle> {
        self.current
    }

    fn tag_results(&self, _dst: &mut Tags) {}

    fn next_path(&mut self, _cancel: &CancelToken) -> bool {
        false
    }

    fn err(&self) -> Option<&QueryError> {
        self.status.err()
    }

    fn close(&mut self) -> Result<(), QueryError> {
        self.status.close();
        Ok(())
    }
}

impl Scanner for FixedScanner {
    fn next(&mut self, cancel: &CancelToken) -> bool {
        self.current = None;
        if !self.status.ready(cancel) {
            return false;
        }
        let Some(h) = self.values.get(self.pos) else {
            return false;
        };
        self.pos += 1;
        self.current = Some(*h);
        true
    }
}

struct FixedIndex {
    values: AHashSet<Handle>,
    current: Option<Handle>,
    status: Status,
}

impl Base for FixedIndex {
    fn result(&self) -> Option<Handle> {
        self.current
    }

    fn tag_results(&self, _dst: &mut Tags) {}

    fn next_path(&mut self, _cancel: &CancelToken) -> bool {
        false
    }

    fn err(&self) -> Option<&QueryError> {
        self.status.err()
    }

    fn close(&mut self) -> Result<(), QueryError> {
        self.status.close();
        Ok(())
    }
}

impl Index for FixedIndex {
    fn contains(&mut self, cancel: &CancelToken, value: Handle) -> bool {
        self.current = None;
        if !self.status.ready(cancel) || !self.values.contains(&value) {
            return false;
        }
        self.current = Some(value);
        true
    }
}

// ============================================================================
// Null
// ============================================================================

/// The empty set.
#[derive(Debug, Clone, Copy, Default)]
pub struct Null;

impl Shape for Null {
    fn name(&self) -> &'static str {
        "null"
    }

    fn iterate(&self) -> Box<dyn Scanner> {
        Box::new(Empty::default())
    }

    fn lookup(&self) -> Box<dyn Index> {
        Box::new(Empty::default())
    }

    fn children(&self) -> Vec<ShapeRef> {
        Vec::new()
    }

    fn stats(&self, _cancel: &CancelToken) -> Result<Costs, QueryError> {
        Ok(Costs::default())
    }

    fn optimize(self: Arc<Self>, _ctx: OptimizeContext<'_>) -> (ShapeRef, bool) {
        (self, false)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Default)]
struct Empty {
    status: Status,
}

impl Base for Empty {
    fn result(&self) -> Option<Handle> {
        None
    }

    fn tag_results(&self, _dst: &mut Tags) {}

    fn next_path(&mut self, _cancel: &CancelToken) -> bool {
        false
    }

    fn err(&self) -> Option<&QueryError> {
        self.status.err()
    }

    fn close(&mut self) -> Result<(), QueryError> {
        self.status.close();
        Ok(())
    }
}

impl Scanner for Empty {
    fn next(&mut self, cancel: &CancelToken) -> bool {
        self.status.ready(cancel);
        false
    }
}

impl Index for Empty {
    fn contains(&mut self, cancel: &CancelToken, _value: Handle) -> bool {
        self.status.ready(cancel);
        false
    }
}

// ============================================================================
// AllNodes
// ============================================================================

/// Every value the store knows, in ascending handle order.
#[derive(Debug, Clone)]
pub struct AllNodes {
    store: Arc<dyn QuadStore>,
}

impl AllNodes {
    pub fn new(store: Arc<dyn QuadStore>) -> Self {
        Self { store }
    }
}

impl Shape for AllNodes {
    fn name(&self) -> &'static str {
        "all"
    }

    fn iterate(&self) -> Box<dyn Scanner> {
        Box::new(AllScanner {
            store: Arc::clone(&self.store),
            values: None,
            pos: 0,
            current: None,
            status: Status::default(),
        })
    }

    fn lookup(&self) -> Box<dyn Index> {
        Box::new(AllIndex {
            store: Arc::clone(&self.store),
            current: None,
            status: Status::default(),
        })
    }

    fn children(&self) -> Vec<ShapeRef> {
        Vec::new()
    }

    fn stats(&self, _cancel: &CancelToken) -> Result<Costs, QueryError> {
        Ok(Costs {
            contains_cost: 1,
            next_cost: 1,
            size: Size::exact(self.store.stats().nodes as i64),
        })
    }

    fn optimize(self: Arc<Self>, _ctx: OptimizeContext<'_>) -> (ShapeRef, bool) {
        (self, false)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct AllScanner {
    store: Arc<dyn QuadStore>,
    values: Option<Vec<Handle>>,
    pos: usize,
    current: Option<Handle>,
    status: Status,
}

impl Base for AllScanner {
    fn result(&self) -> Option<Handle> {
        self.current
    }

    fn tag_results(&self, _dst: &mut Tags) {}

    fn next_path(&mut self, _cancel: &CancelToken) -> bool {
        false
    }

    fn err(&self) -> Option<&QueryError> {
        self.status.err()
    }

    fn close(&mut self) -> Result<(), QueryError> {
        self.status.close();
        self.values = None;
        Ok(())
    }
}

impl Scanner for AllScanner {
    fn next(&mut self, cancel: &CancelToken) -> bool {
        self.current = None;
        if !self.status.ready(cancel) {
            return false;
        }
        let store = &self.store;
        let values = self.values.get_or_insert_with(|| store.nodes());
        let Some(h) = values.get(self.pos) else {
            return false;
        };
        self.pos += 1;
        self.current = Some(*h);
        true
    }
}

struct AllIndex {
    store: Arc<dyn QuadStore>,
    current: Option<Handle>,
    status: Status,
}

impl Base for AllIndex {
    fn result(&self) -> Option<Handle> {
        self.current
    }

    fn tag_results(&self, _dst: &mut Tags) {}

    fn next_path(&mut self, _cancel: &CancelToken) -> bool {
        false
    }

    fn err(&self) -> Option<&QueryError> {
        self.status.err()
    }

    fn close(&mut self) -> Result<(), QueryError> {
        self.status.close();
        Ok(())
    }
}

impl Index for AllIndex {
    fn contains(&mut self, cancel: &CancelToken, value: Handle) -> bool {
        self.current = None;
        if !self.status.ready(cancel) || !self.store.contains_node(value) {
            return false;
        }
        self.current = Some(value);
        true
    }
}
