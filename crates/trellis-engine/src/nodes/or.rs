//! Union.

use super::{is_null, null, Status};
use crate::cancel::CancelToken;
use crate::error::QueryError;
use crate::shape::{
    downcast, Base, Closer, Costs, Index, OptimizeContext, Scanner, Shape, ShapeRef, Size, Tags,
};
use std::any::Any;
use std::sync::Arc;
use trellis_store::Handle;

/// Per-path union: every result of branch 0, then branch 1, and so on.
/// Handles found in several branches are reported once per branch.
#[derive(Debug, Clone)]
pub struct Or {
    subs: Vec<ShapeRef>,
}

impl Or {
    pub fn new(subs: Vec<ShapeRef>) -> Self {
        Self { subs }
    }

    pub fn subs(&self) -> &[ShapeRef] {
        &self.subs
    }
}

impl Shape for Or {
    fn name(&self) -> &'static str {
        "or"
    }

    fn iterate(&self) -> Box<dyn Scanner> {
        Box::new(OrScanner {
            subs: self.subs.iter().map(|s| s.iterate()).collect(),
            cur: 0,
            status: Status::default(),
        })
    }

    fn lookup(&self) -> Box<dyn Index> {
        Box::new(OrIndex {
            subs: self.subs.iter().map(|s| s.lookup()).collect(),
            cur: None,
            candidate: None,
            status: Status::default(),
        })
    }

    fn children(&self) -> Vec<ShapeRef> {
        self.subs.clone()
    }

    fn stats(&self, cancel: &CancelToken) -> Result<Costs, QueryError> {
        cancel.check()?;
        let mut total = Costs {
            size: Size::exact(0),
            ..Costs::default()
        };
        for sub in &self.subs {
            let c = sub.stats(cancel)?;
            total.contains_cost += c.contains_cost;
            total.next_cost = total.next_cost.max(c.next_cost);
            total.size.value += c.size.value;
            total.size.exact &= c.size.exact;
        }
        Ok(total)
    }

    fn optimize(self: Arc<Self>, ctx: OptimizeContext<'_>) -> (ShapeRef, bool) {
        let mut changed = false;
        let mut subs: Vec<ShapeRef> = Vec::with_capacity(self.subs.len());
        for sub in &self.subs {
            let (opt, c) = Arc::clone(sub).optimize(ctx);
            changed |= c;
            if is_null(&opt) {
                changed = true;
                continue;
            }
            if let Some(inner) = downcast::<Or>(&opt) {
                subs.extend(inner.subs.iter().cloned());
                changed = true;
                continue;
            }
            subs.push(opt);
        }
        match subs.len() {
            0 => (null(), true),
            1 => (subs.swap_remove(0), true),
            _ if changed => (Arc::new(Or::new(subs)), true),
            _ => (self, false),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct OrScanner {
    subs: Vec<Box<dyn Scanner>>,
    cur: usize,
    status: Status,
}

impl Base for OrScanner {
    fn result(&self) -> Option<Handle> {
        self.subs.get(self.cur).and_then(|s| s.result())
    }

    fn tag_results(&self, dst: &mut Tags) {
        if let Some(sub) = self.subs.get(self.cur) {
            sub.tag_results(dst);
        }
    }

    fn next_path(&mut self, cancel: &CancelToken) -> bool {
        if !self.status.ready(cancel) {
            return false;
        }
        let Some(sub) = self.subs.get_mut(self.cur) else {
            return false;
        };
        if sub.next_path(cancel) {
            return true;
        }
        self.status.adopt(sub.as_ref())
    }

    fn err(&self) -> Option<&QueryError> {
        self.status.err()
    }

    fn close(&mut self) -> Result<(), QueryError> {
        self.status.close();
        let mut closer = Closer::default();
        for sub in &mut self.subs {
            closer.close(sub.as_mut());
        }
        closer.finish()
    }
}

impl Scanner for OrScanner {
    fn next(&mut self, cancel: &CancelToken) -> bool {
        while self.status.ready(cancel) {
            let Some(sub) = self.subs.get_mut(self.cur) else {
                return false;
            };
            if sub.next(cancel) {
                return true;
            }
            if sub.err().is_some() {
                return self.status.adopt(sub.as_ref());
            }
            self.cur += 1;
        }
        false
    }
}

struct OrIndex {
    subs: Vec<Box<dyn Index>>,
    cur: Option<usize>,
    candidate: Option<Handle>,
    status: Status,
}

impl OrIndex {
    /// First branch at or after `from` containing the candidate.
    fn seek(&mut self, cancel: &CancelToken, from: usize) -> bool {
        self.cur = None;
        let Some(value) = self.candidate else {
            return false;
        };
        for i in from..self.subs.len() {
            if !self.status.ready(cancel) {
                return false;
            }
            let sub = &mut self.subs[i];
            if sub.contains(cancel, value) {
                self.cur = Some(i);
                return true;
            }
            if sub.err().is_some() {
                return self.status.adopt(sub.as_ref());
            }
        }
        false
    }
}

impl Base for OrIndex {
    fn result(&self) -> Option<Handle> {
        self.cur.and(self.candidate)
    }

    fn tag_results(&self, dst: &mut Tags) {
        if let Some(i) = self.cur {
            self.subs[i].tag_results(dst);
        }
    }

    fn next_path(&mut self, cancel: &CancelToken) -> bool {
        let Some(i) = self.cur else {
            return false;
        };
        if !self.status.ready(cancel) {
            return false;
        }
        if self.subs[i].next_path(cancel) {
            return true;
        }
        if self.subs[i].err().is_some() {
            return self.status.adopt(self.subs[i].as_ref());
        }
        self.seek(cancel, i + 1)
    }

    fn err(&self) -> Option<&QueryError> {
        self.status.err()
    }

    fn close(&mut self) -> Result<(), QueryError> {
        self.status.close();
        let mut closer = Closer::default();
        for sub in &mut self.subs {
            closer.close(sub.as_mut());
        }
        closer.finish()
    }
}

impl Index for OrIndex {
    fn contains(&mut self, cancel: &CancelToken, value: Handle) -> bool {
        self.candidate = Some(value);
        if !self.status.ready(cancel) {
            self.cur = None;
            return false;
        }
        self.seek(cancel, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::super::{Null, Save};
    use super::*;

    fn tagged(raw: &[u32], tag: &str) -> ShapeRef {
        Arc::new(Save::new(fixed(raw), vec![tag.to_string()]))
    }

    #[test]
    fn test_union_keeps_branch_order_and_duplicates() {
        let or = Or::new(vec![fixed(&[1, 2]), fixed(&[2, 3])]);
        assert_eq!(handles(&or), vec![h(1), h(2), h(2), h(3)]);
    }

    #[test]
    fn test_index_reports_every_branch() {
        let or = Or::new(vec![tagged(&[1, 2], "a"), fixed(&[3]), tagged(&[2], "b")]);
        let paths = probe(&or, h(2)).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].contains_key("a"));
        assert!(paths[1].contains_key("b"));
        assert!(probe(&or, h(9)).is_none());
    }

    #[test]
    fn test_optimizer_drops_null_and_flattens() {
        let cancel = CancelToken::new();
        let inner: ShapeRef = Arc::new(Or::new(vec![fixed(&[1]), fixed(&[2])]));
        let or: ShapeRef = Arc::new(Or::new(vec![inner, Arc::new(Null), fixed(&[3])]));
        let (shape, changed) = or.optimize(OptimizeContext::new(&cancel));
        assert!(changed);
        assert_eq!(downcast::<Or>(&shape).unwrap().subs().len(), 3);
        assert_eq!(handles(shape.as_ref()), vec![h(1), h(2), h(3)]);

        let empty: ShapeRef = Arc::new(Or::new(vec![Arc::new(Null)]));
        let (shape, _) = empty.optimize(OptimizeContext::new(&cancel));
        assert_eq!(shape.name(), "null");
    }
}
