//! In-memory quad store: interned values plus per-direction bitmap indexes.

use crate::{Direction, Handle, Quad, QuadId, QuadStore, StoreStats, Value};
use ahash::AHashMap;
use roaring::RoaringBitmap;

/// Value interner + quad list + `(direction, handle) -> quad ids` index.
///
/// Handles are dense (`0..node_count`), assigned in first-seen order.
#[derive(Debug, Default)]
pub struct MemStore {
    /// Handle -> value (reverse lookup)
    values: Vec<Value>,
    /// Value -> handle
    ids: AHashMap<Value, Handle>,
    /// All quads, indexed by `QuadId`
    quads: Vec<Quad>,
    /// Dedup guard: identical quads are stored once
    quad_ids: AHashMap<Quad, QuadId>,
    /// Direction index: (direction, handle) -> quad ids
    index: AHashMap<(Direction, Handle), RoaringBitmap>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of quads stored.
    pub fn len(&self) -> usize {
        self.quads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quads.is_empty()
    }

    /// Number of distinct values stored.
    pub fn node_count(&self) -> usize {
        self.values.len()
    }

    fn intern_or_insert(&mut self, value: Value) -> Handle {
        if let Some(id) = self.ids.get(&value) {
            return *id;
        }
        let id = Handle::new(self.values.len() as u32);
        self.ids.insert(value.clone(), id);
        self.values.push(value);
        id
    }

    /// Intern a standalone value (one that need not appear in any quad).
    pub fn add_value(&mut self, value: impl Into<Value>) -> Handle {
        self.intern_or_insert(value.into())
    }

    /// Add a quad, interning its values. Duplicates return the existing id.
    pub fn add_quad(
        &mut self,
        subject: impl Into<Value>,
        predicate: impl Into<Value>,
        object: impl Into<Value>,
        label: Option<Value>,
    ) -> QuadId {
        let quad = Quad {
            subject: self.intern_or_insert(subject.into()),
            predicate: self.intern_or_insert(predicate.into()),
            object: self.intern_or_insert(object.into()),
            label: label.map(|l| self.intern_or_insert(l)),
        };

        if let Some(id) = self.quad_ids.get(&quad) {
            tracing::trace!(quad = ?quad, "duplicate quad ignored");
            return *id;
        }

        let id = QuadId::new(self.quads.len() as u32);
        for dir in Direction::ALL {
            if let Some(h) = quad.get(dir) {
                self.index
                    .entry((dir, h))
                    .or_insert_with(RoaringBitmap::new)
                    .insert(id.raw());
            }
        }
        self.quad_ids.insert(quad, id);
        self.quads.push(quad);
        id
    }

    /// Add an unlabelled quad.
    pub fn add_triple(
        &mut self,
        subject: impl Into<Value>,
        predicate: impl Into<Value>,
        object: impl Into<Value>,
    ) -> QuadId {
        self.add_quad(subject, predicate, object, None)
    }
}

impl QuadStore for MemStore {
    fn resolve(&self, handle: Handle) -> Option<Value> {
        self.values.get(handle.raw() as usize).cloned()
    }

    fn intern(&self, value: &Value) -> Option<Handle> {
        self.ids.get(value).copied()
    }

    fn quad(&self, id: QuadId) -> Option<Quad> {
        self.quads.get(id.raw() as usize).copied()
    }

    fn quads_with(&self, dir: Direction, handle: Handle) -> Vec<QuadId> {
        self.index
            .get(&(dir, handle))
            .map(|ids| ids.iter().map(QuadId::new).collect())
            .unwrap_or_default()
    }

    fn nodes(&self) -> Vec<Handle> {
        (0..self.values.len() as u32).map(Handle::new).collect()
    }

    fn contains_node(&self, handle: Handle) -> bool {
        (handle.raw() as usize) < self.values.len()
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            nodes: self.values.len() as u64,
            quads: self.quads.len() as u64,
        }
    }
}
