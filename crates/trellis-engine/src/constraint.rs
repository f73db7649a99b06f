//! Native value constraints.
//!
//! Unlike the opaque callbacks of [`crate::transform`], these checks are plain
//! data the optimizer can inspect: stacked constraint nodes merge, and a
//! constraint over a literal set is evaluated at plan time.

use crate::cancel::CancelToken;
use crate::error::QueryError;
use crate::nodes::{Fixed, Status};
use crate::shape::{
    downcast, Base, Costs, Index, OptimizeContext, Scanner, Shape, ShapeRef, Tags,
};
use crate::transform::filtered_size;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use trellis_store::{Handle, QuadStore, Value, ValueKind, LITERAL_KINDS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Ne,
}

impl CompareOp {
    fn accepts(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Lte => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Gte => ord != Ordering::Less,
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
        })
    }
}

// ============================================================================
// Constraints
// ============================================================================

#[derive(Debug, Clone)]
pub enum Constraint {
    /// Same-family comparison; values of another family never match.
    Compare { op: CompareOp, value: Value },
    /// Regex over string literals, and over IRIs and blank nodes when `refs` is set.
    Regex { re: Regex, refs: bool },
    /// `%` matches any run of characters and `?` exactly one.
    Wildcard { pattern: String, re: Regex },
    /// Value kind membership.
    Kinds(Vec<ValueKind>),
}

impl Constraint {
    pub fn compare(op: CompareOp, value: impl Into<Value>) -> Self {
        Constraint::Compare {
            op,
            value: value.into(),
        }
    }

    pub fn regex(pattern: &str, refs: bool) -> Result<Self, QueryError> {
        let re = Regex::new(pattern).map_err(|err| QueryError::InvalidPattern {
            pattern: pattern.to_string(),
            message: err.to_string(),
        })?;
        Ok(Constraint::Regex { re, refs })
    }

    pub fn wildcard(pattern: &str) -> Result<Self, QueryError> {
        let mut source = String::with_capacity(pattern.len() + 8);
        source.push_str("(?s)^");
        let mut buf = [0u8; 4];
        for c in pattern.chars() {
            match c {
                '%' => source.push_str(".*"),
                '?' => source.push('.'),
                _ => source.push_str(&regex::escape(c.encode_utf8(&mut buf))),
            }
        }
        source.push('$');
        let re = Regex::new(&source).map_err(|err| QueryError::InvalidPattern {
            pattern: pattern.to_string(),
            message: err.to_string(),
        })?;
        Ok(Constraint::Wildcard {
            pattern: pattern.to_string(),
            re,
        })
    }

    pub fn kinds(kinds: impl IntoIterator<Item = ValueKind>) -> Self {
        Constraint::Kinds(kinds.into_iter().collect())
    }

    /// Shorthand for every literal kind.
    pub fn literal() -> Self {
        Constraint::Kinds(LITERAL_KINDS.to_vec())
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Constraint::Compare { op, value: other } => value
                .compare(other)
                .is_some_and(|ord| op.accepts(ord)),
            Constraint::Regex { re, refs } => {
                if value.is_ref() && !refs {
                    return false;
                }
                value.text().is_some_and(|text| re.is_match(text))
            }
            Constraint::Wildcard { re, .. } => value.text().is_some_and(|text| re.is_match(text)),
            Constraint::Kinds(kinds) => kinds.contains(&value.kind()),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Compare { op, value } => write!(f, "{op} {value}"),
            Constraint::Regex { re, refs: false } => write!(f, "regex /{re}/"),
            Constraint::Regex { re, refs: true } => write!(f, "regex /{re}/ (refs)"),
            Constraint::Wildcard { pattern, .. } => write!(f, "like {pattern:?}"),
            Constraint::Kinds(kinds) => {
                let names: Vec<&str> = kinds.iter().map(|k| k.name()).collect();
                write!(f, "kind in [{}]", names.join(", "))
            }
        }
    }
}

// ============================================================================
// ValueConstraint node
// ============================================================================

/// Child results whose value satisfies every constraint, in child order.
#[derive(Debug, Clone)]
pub struct ValueConstraint {
    sub: ShapeRef,
    store: Arc<dyn QuadStore>,
    constraints: Arc<[Constraint]>,
}

impl ValueConstraint {
    pub fn new(sub: ShapeRef, store: Arc<dyn QuadStore>, constraints: Vec<Constraint>) -> Self {
        Self {
            sub,
            store,
            constraints: constraints.into(),
        }
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }
}

fn accepts(constraints: &[Constraint], store: &dyn QuadStore, h: Handle) -> Option<bool> {
    let value = store.resolve(h)?;
    Some(constraints.iter().all(|c| c.matches(&value)))
}

impl Shape for ValueConstraint {
    fn name(&self) -> &'static str {
        "constraint"
    }

    fn iterate(&self) -> Box<dyn Scanner> {
        Box::new(ConstraintCursor {
            sub: self.sub.iterate(),
            store: Arc::clone(&self.store),
            constraints: Arc::clone(&self.constraints),
            status: Status::default(),
        })
    }

    fn lookup(&self) -> Box<dyn Index> {
        Box::new(ConstraintCursor {
            sub: self.sub.lookup(),
            store: Arc::clone(&self.store),
            constraints: Arc::clone(&self.constraints),
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

        if let Some(inner) = downcast::<ValueConstraint>(&sub) {
            let mut merged = inner.constraints.to_vec();
            merged.extend(self.constraints.iter().cloned());
            let node = ValueConstraint::new(Arc::clone(&inner.sub), Arc::clone(&self.store), merged);
            return (Arc::new(node), true);
        }

        if let Some(fixed) = downcast::<Fixed>(&sub) {
            let kept: Vec<Handle> = fixed
                .values()
                .iter()
                .copied()
                .filter(|h| accepts(&self.constraints, self.store.as_ref(), *h) == Some(true))
                .collect();
            // Unknown handles must still fail at run time, so only fold when all resolve.
            let resolvable = fixed
                .values()
                .iter()
                .all(|h| self.store.resolve(*h).is_some());
            if resolvable {
                return (Arc::new(Fixed::new(kept)), true);
            }
        }

        if !changed {
            return (self, false);
        }
        let node = ValueConstraint {
            sub,
            store: Arc::clone(&self.store),
            constraints: Arc::clone(&self.constraints),
        };
        (Arc::new(node), true)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct ConstraintCursor<C: ?Sized> {
    sub: Box<C>,
    store: Arc<dyn QuadStore>,
    constraints: Arc<[Constraint]>,
    status: Status,
}

impl<C: Base + ?Sized> Base for ConstraintCursor<C> {
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

impl Scanner for ConstraintCursor<dyn Scanner> {
    fn next(&mut self, cancel: &CancelToken) -> bool {
        while self.status.ready(cancel) {
            if !self.sub.next(cancel) {
                return self.status.adopt(self.sub.as_ref());
            }
            let Some(h) = self.sub.result() else {
                continue;
            };
            match accepts(&self.constraints, self.store.as_ref(), h) {
                Some(true) => return true,
                Some(false) => continue,
                None => return self.status.fail(QueryError::UnknownHandle(h)),
            }
        }
        false
    }
}

impl Index for ConstraintCursor<dyn Index> {
    fn contains(&mut self, cancel: &CancelToken, value: Handle) -> bool {
        if !self.status.ready(cancel) {
            return false;
        }
        if accepts(&self.constraints, self.store.as_ref(), value) != Some(true) {
            return false;
        }
        self.sub.contains(cancel, value) || self.status.adopt(self.sub.as_ref())
    }
}
