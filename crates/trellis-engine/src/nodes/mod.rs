//! Primitive plan nodes.
//!
//! Each node is a flat struct implementing [`Shape`](crate::shape::Shape) plus
//! one scanner and one index cursor type. Composite nodes own their child
//! cursors and close them when they are closed.

mod and;
mod fixed;
mod not;
mod or;
mod paging;
mod recursive;
mod save;
mod sort;
mod step;
mod unique;

pub use and::And;
pub use fixed::{AllNodes, Fixed, Null};
pub use not::Not;
pub use or::Or;
pub use paging::{Limit, Skip};
pub use recursive::{Morphism, Recursive, BASE_TAG};
pub use save::Save;
pub use sort::Sort;
pub use step::Step;
pub use unique::Unique;

use crate::cancel::CancelToken;
use crate::error::QueryError;
use crate::shape::{collect_paths, Base, Index, Scanner, ShapeRef, Tags};
use ahash::AHashMap;
use std::sync::Arc;
use trellis_store::Handle;

pub(crate) fn null() -> ShapeRef {
    Arc::new(Null)
}

pub(crate) fn is_null(shape: &ShapeRef) -> bool {
    shape.as_any().is::<Null>()
}

// ============================================================================
// Cursor bookkeeping
// ============================================================================

/// Error / closed state shared by every cursor implementation.
#[derive(Debug, Default)]
pub(crate) struct Status {
    err: Option<QueryError>,
    closed: bool,
}

impl Status {
    /// Gate for an advancing call: false once closed, failed or cancelled.
    pub fn ready(&mut self, cancel: &CancelToken) -> bool {
        if self.closed {
            self.err.get_or_insert(QueryError::Closed);
            return false;
        }
        if self.err.is_some() {
            return false;
        }
        if let Err(err) = cancel.check() {
            self.err = Some(err);
            return false;
        }
        true
    }

    /// Record `err` (the first failure sticks). Always returns false.
    pub fn fail(&mut self, err: QueryError) -> bool {
        self.err.get_or_insert(err);
        false
    }

    /// Take over the error of a child that just reported no result.
    pub fn adopt<C: Base + ?Sized>(&mut self, child: &C) -> bool {
        if let Some(err) = child.err() {
            self.fail(err.clone());
        }
        false
    }

    pub fn failed(&self) -> bool {
        self.err.is_some()
    }

    pub fn err(&self) -> Option<&QueryError> {
        self.err.as_ref()
    }

    pub fn close(&mut self) {
        self.closed = true;
    }
}

// ============================================================================
// Materialized index
// ============================================================================

/// Membership over the full output of a scanner, loaded on the first probe.
///
/// Used where membership depends on enumeration (paging, closures): the
/// scanner is run to exhaustion once and every binding set it reports is
/// kept per handle.
pub(crate) struct Materialized {
    source: Option<Box<dyn Scanner>>,
    rows: AHashMap<Handle, Vec<Tags>>,
    current: Option<(Handle, usize)>,
    status: Status,
}

impl Materialized {
    pub fn new(source: Box<dyn Scanner>) -> Self {
        Self {
            source: Some(source),
            rows: AHashMap::new(),
            current: None,
            status: Status::default(),
        }
    }

    fn load(&mut self, cancel: &CancelToken) -> bool {
        let Some(mut source) = self.source.take() else {
            return true;
        };
        let mut ok = true;
        while source.next(cancel) {
            let Some(handle) = source.result() else {
                continue;
            };
            match collect_paths(source.as_mut(), cancel) {
                Ok(paths) => self.rows.entry(handle).or_default().extend(paths),
                Err(err) => {
                    ok = self.status.fail(err);
                    break;
                }
            }
        }
        if ok {
            if let Some(err) = source.err() {
                ok = self.status.fail(err.clone());
            }
        }
        if let Err(err) = source.close() {
            ok = self.status.fail(err);
        }
        ok
    }
}

impl Base for Materialized {
    fn result(&self) -> Option<Handle> {
        self.current.map(|(h, _)| h)
    }

    fn tag_results(&self, dst: &mut Tags) {
        if let Some((h, i)) = self.current {
            if let Some(tags) = self.rows.get(&h).and_then(|paths| paths.get(i)) {
                dst.extend(tags.iter().map(|(k, v)| (k.clone(), *v)));
            }
        }
    }

    fn next_path(&mut self, cancel: &CancelToken) -> bool {
        if !self.status.ready(cancel) {
            return false;
        }
        let Some((h, i)) = self.current else {
            return false;
        };
        let len = self.rows.get(&h).map_or(0, Vec::len);
        if i + 1 < len {
            self.current = Some((h, i + 1));
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
        match self.source.take() {
            Some(mut source) => source.close(),
            None => Ok(()),
        }
    }
}

impl Index for Materialized {
    fn contains(&mut self, cancel: &CancelToken, value: Handle) -> bool {
        self.current = None;
        if !self.status.ready(cancel) || !self.load(cancel) {
            return false;
        }
        if self.rows.contains_key(&value) {
            self.current = Some((value, 0));
            true
        } else {
            false
        }
    }
}

// ============================================================================
// Test helpers
// ============================================================================
