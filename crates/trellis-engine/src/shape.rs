//! The plan-node protocol.
//!
//! A [`Shape`] is an immutable description of a query subtree. It produces two
//! kinds of single-use cursors:
//!
//! - a [`Scanner`] enumerates `(handle, bindings)` results sequentially,
//! - an [`Index`] answers "is this handle in the result set?".
//!
//! Joins pick one branch to drive enumeration and probe the others, so every
//! node supports both roles.
//!
//! Cursor lifecycle: `Ready -> (Advancing -> Ready)* -> Exhausted | Failed`,
//! with `Closed` reachable from any state. A negative `next`/`contains` is
//! ambiguous until `err()` is checked.

use crate::cancel::CancelToken;
use crate::error::QueryError;
use serde::Serialize;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use trellis_store::Handle;

/// Binding set: tag name -> handle that satisfied the tagged stage.
pub type Tags = BTreeMap<String, Handle>;

pub type ShapeRef = Arc<dyn Shape>;

// ============================================================================
// Cost estimates
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Size {
    pub value: i64,
    pub exact: bool,
}

impl Size {
    pub fn exact(value: i64) -> Self {
        Self { value, exact: true }
    }

    pub fn estimate(value: i64) -> Self {
        Self {
            value,
            exact: false,
        }
    }
}

/// Relative cost hints. Only the optimizer reads these; they never affect results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Costs {
    pub contains_cost: i64,
    pub next_cost: i64,
    pub size: Size,
}

// ============================================================================
// Shapes and cursors
// ============================================================================

/// Context threaded through one optimization pass.
#[derive(Debug, Clone, Copy)]
pub struct OptimizeContext<'a> {
    pub cancel: &'a CancelToken,
    /// The parent depends on this subtree's enumeration order.
    pub ordered: bool,
}

impl<'a> OptimizeContext<'a> {
    pub fn new(cancel: &'a CancelToken) -> Self {
        Self {
            cancel,
            ordered: false,
        }
    }

    pub fn ordered(self) -> Self {
        Self {
            ordered: true,
            ..self
        }
    }

    pub fn unordered(self) -> Self {
        Self {
            ordered: false,
            ..self
        }
    }
}

pub trait Shape: fmt::Debug + Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn iterate(&self) -> Box<dyn Scanner>;

    fn lookup(&self) -> Box<dyn Index>;

    fn children(&self) -> Vec<ShapeRef>;

    fn stats(&self, cancel: &CancelToken) -> Result<Costs, QueryError>;

    /// One post-order rewrite pass. Returns the (possibly new) subtree and
    /// whether anything changed.
    fn optimize(self: Arc<Self>, ctx: OptimizeContext<'_>) -> (ShapeRef, bool);

    fn as_any(&self) -> &dyn Any;
}

/// State shared by both cursor roles.
pub trait Base: Send {
    /// Current result; only meaningful after a positive `next`/`contains`.
    fn result(&self) -> Option<Handle>;

    /// Copy the bindings of the current result into `dst`.
    fn tag_results(&self, dst: &mut Tags);

    /// Move to an alternate binding set for the same current result.
    fn next_path(&mut self, cancel: &CancelToken) -> bool;

    fn err(&self) -> Option<&QueryError>;

    /// Release this cursor and every child cursor it opened.
    fn close(&mut self) -> Result<(), QueryError>;
}

pub trait Scanner: Base {
    fn next(&mut self, cancel: &CancelToken) -> bool;
}

pub trait Index: Base {
    fn contains(&mut self, cancel: &CancelToken, value: Handle) -> bool;
}

pub fn downcast<T: Shape>(shape: &ShapeRef) -> Option<&T> {
    shape.as_any().downcast_ref::<T>()
}

// ============================================================================
// Cursor helpers
// ============================================================================

/// Every binding set the cursor exposes for its current result, starting with
/// the current one. Leaves the cursor on its last alternate.
pub(crate) fn collect_paths<C: Base + ?Sized>(
    cursor: &mut C,
    cancel: &CancelToken,
) -> Result<Vec<Tags>, QueryError> {
    let mut out = Vec::new();
    let mut tags = Tags::new();
    cursor.tag_results(&mut tags);
    out.push(tags);
    while cursor.next_path(cancel) {
        let mut tags = Tags::new();
        cursor.tag_results(&mut tags);
        out.push(tags);
    }
    match cursor.err() {
        Some(err) => Err(err.clone()),
        None => Ok(out),
    }
}

/// Closes child cursors and remembers the first failure.
#[derive(Debug, Default)]
pub(crate) struct Closer(Option<QueryError>);

impl Closer {
    pub fn close<C: Base + ?Sized>(&mut self, cursor: &mut C) {
        if let Err(err) = cursor.close() {
            self.0.get_or_insert(err);
        }
    }

    pub fn finish(self) -> Result<(), QueryError> {
        match self.0 {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Cartesian enumeration of binding sets contributed by several cursors that
/// sit on the same result.
#[derive(Debug, Default)]
pub(crate) struct Combinations {
    sets: Vec<Vec<Tags>>,
    pos: Vec<usize>,
}

impl Combinations {
    pub fn new(sets: Vec<Vec<Tags>>) -> Self {
        let pos = vec![0; sets.len()];
        Self { sets, pos }
    }

    /// Merge the current combination into `dst`; later sets win on a name clash.
    pub fn tag_results(&self, dst: &mut Tags) {
        for (set, &i) in self.sets.iter().zip(&self.pos) {
            if let Some(tags) = set.get(i) {
                dst.extend(tags.iter().map(|(k, v)| (k.clone(), *v)));
            }
        }
    }

    pub fn advance(&mut self) -> bool {
        for k in (0..self.sets.len()).rev() {
            if self.pos[k] + 1 < self.sets[k].len() {
                self.pos[k] += 1;
                for p in &mut self.pos[k + 1..] {
                    *p = 0;
                }
                return true;
            }
        }
        false
    }
}

// ============================================================================
// Plan description
// ============================================================================

/// Serializable view of a plan tree, for debugging and `explain` output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Description {
    pub name: &'static str,
    pub size: i64,
    pub exact: bool,
    pub children: Vec<Description>,
}

pub fn describe(shape: &ShapeRef, cancel: &CancelToken) -> Description {
    let (size, exact) = match shape.stats(cancel) {
        Ok(costs) => (costs.size.value, costs.size.exact),
        Err(_) => (0, false),
    };
    Description {
        name: shape.name(),
        size,
        exact,
        children: shape
            .children()
            .iter()
            .map(|c| describe(c, cancel))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, u32)]) -> Tags {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Handle::new(*v)))
            .collect()
    }

    #[test]
    fn test_combinations_enumerate_product() {
        let mut combos = Combinations::new(vec![
            vec![tags(&[("a", 1)]), tags(&[("a", 2)])],
            vec![tags(&[("b", 3)]), tags(&[("b", 4)]), tags(&[("b", 5)])],
        ]);
        let mut seen = Vec::new();
        loop {
            let mut dst = Tags::new();
            combos.tag_results(&mut dst);
            seen.push((dst["a"].raw(), dst["b"].raw()));
            if !combos.advance() {
                break;
            }
        }
        assert_eq!(seen, vec![(1, 3), (1, 4), (1, 5), (2, 3), (2, 4), (2, 5)]);
    }

    #[test]
    fn test_later_sets_win_clashes() {
        let combos = Combinations::new(vec![vec![tags(&[("x", 1)])], vec![tags(&[("x", 2)])]]);
        let mut dst = Tags::new();
        combos.tag_results(&mut dst);
        assert_eq!(dst["x"], Handle::new(2));
    }
}
