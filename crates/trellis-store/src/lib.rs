//! Trellis store adapter
//!
//! The query engine never touches storage directly. It talks to a [`QuadStore`]:
//!
//! - `resolve` turns an opaque [`Handle`] back into a typed [`Value`],
//! - `intern` finds the handle of a value (a miss is a normal outcome),
//! - `quads_with` / `quad` walk the edge lists the traversal steps need.
//!
//! [`MemStore`] is the in-memory reference implementation used by tests and
//! embedders that do not bring their own backend.

#[cfg(any(test, feature = "testing"))]
pub mod fixtures;
mod memstore;
pub mod value;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use memstore::MemStore;
pub use value::{UnknownKind, Value, ValueKind, LITERAL_KINDS};

// ============================================================================
// Handles and quads
// ============================================================================

/// Opaque identifier for a stored value. Carries no meaning on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Handle(u32);

impl Handle {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a stored quad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct QuadId(u32);

impl QuadId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// One end (or the label) of a quad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Subject,
    Predicate,
    Object,
    Label,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Subject,
        Direction::Predicate,
        Direction::Object,
        Direction::Label,
    ];
}

/// A labelled edge `subject -[predicate]-> object`, optionally scoped to a label (subgraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quad {
    pub subject: Handle,
    pub predicate: Handle,
    pub object: Handle,
    pub label: Option<Handle>,
}

impl Quad {
    pub fn get(&self, dir: Direction) -> Option<Handle> {
        match dir {
            Direction::Subject => Some(self.subject),
            Direction::Predicate => Some(self.predicate),
            Direction::Object => Some(self.object),
            Direction::Label => self.label,
        }
    }
}

/// Cardinalities used by cost estimation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub nodes: u64,
    pub quads: u64,
}

// ============================================================================
// Store adapter contract
// ============================================================================

/// Read-only view of a quad store, as consumed by the query engine.
///
/// Implementations must be safe for concurrent read-only use: independent
/// cursor trees may run on separate threads against the same store.
pub trait QuadStore: fmt::Debug + Send + Sync {
    /// Value denoted by `handle`, or `None` if the store never issued it.
    fn resolve(&self, handle: Handle) -> Option<Value>;

    /// Handle of `value`, or `None` if the value is not present.
    fn intern(&self, value: &Value) -> Option<Handle>;

    fn quad(&self, id: QuadId) -> Option<Quad>;

    /// Quads whose `dir` position is `handle`, in a stable order.
    fn quads_with(&self, dir: Direction, handle: Handle) -> Vec<QuadId>;

    /// Every value known to the store, in ascending handle order.
    fn nodes(&self) -> Vec<Handle>;

    fn contains_node(&self, handle: Handle) -> bool {
        self.resolve(handle).is_some()
    }

    fn stats(&self) -> StoreStats;
}
