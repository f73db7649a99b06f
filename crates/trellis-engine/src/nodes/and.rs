//! Intersection.

use super::{is_null, null, AllNodes, Status};
use crate::cancel::CancelToken;
use crate::error::QueryError;
use crate::shape::{
    collect_paths, downcast, Base, Closer, Combinations, Costs, Index, OptimizeContext, Scanner,
    Shape, ShapeRef, Size, Tags,
};
use std::any::Any;
use std::sync::Arc;
use trellis_store::Handle;

/// Handles produced by every operand.
///
/// One operand (`primary`) drives enumeration and the rest are probed. The
/// choice only affects cost and output order: bindings are always merged in
/// declared operand order, later operands winning on a name clash.
#[derive(Debug, Clone)]
pub struct And {
    subs: Vec<ShapeRef>,
    primary: usize,
}

impl And {
    pub fn new(subs: Vec<ShapeRef>) -> Self {
        Self { subs, primary: 0 }
    }

    pub fn with_primary(subs: Vec<ShapeRef>, primary: usize) -> Self {
        let primary = primary.min(subs.len().saturating_sub(1));
        Self { subs, primary }
    }

    pub fn subs(&self) -> &[ShapeRef] {
        &self.subs
    }

    pub fn primary(&self) -> usize {
        self.primary
    }

    fn pick_primary(&self, subs: &[ShapeRef], current: usize, cancel: &CancelToken) -> usize {
        let mut best = current;
        let mut best_size = match subs[current].stats(cancel) {
            Ok(costs) => costs.size.value,
            Err(_) => return current,
        };
        for (i, sub) in subs.iter().enumerate() {
            if let Ok(costs) = sub.stats(cancel) {
                if costs.size.value < best_size {
                    best = i;
                    best_size = costs.size.value;
                }
            }
        }
        best
    }
}

impl Shape for And {
    fn name(&self) -> &'static str {
        "and"
    }

    fn iterate(&self) -> Box<dyn Scanner> {
        if self.subs.is_empty() {
            return null().iterate();
        }
        let probes = self
            .subs
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != self.primary)
            .map(|(i, s)| (i, s.lookup()))
            .collect();
        Box::new(AndScanner {
            primary: (self.primary, self.subs[self.primary].iterate()),
            probes,
            combos: Combinations::default(),
            current: None,
            status: Status::default(),
        })
    }

    fn lookup(&self) -> Box<dyn Index> {
        if self.subs.is_empty() {
            return null().lookup();
        }
        // Probe the primary first: it is the most selective operand.
        let mut order: Vec<usize> = (0..self.subs.len()).collect();
        order.swap(0, self.primary);
        Box::new(AndIndex {
            order,
            probes: self.subs.iter().map(|s| s.lookup()).collect(),
            combos: Combinations::default(),
            current: None,
            status: Status::default(),
        })
    }

    fn children(&self) -> Vec<ShapeRef> {
        self.subs.clone()
    }

    fn stats(&self, cancel: &CancelToken) -> Result<Costs, QueryError> {
        cancel.check()?;
        let mut costs = Vec::with_capacity(self.subs.len());
        for sub in &self.subs {
            costs.push(sub.stats(cancel)?);
        }
        let Some(primary) = costs.get(self.primary) else {
            return Ok(Costs::default());
        };
        let probe_cost: i64 = costs
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != self.primary)
            .map(|(_, c)| c.contains_cost)
            .sum();
        let size = costs.iter().map(|c| c.size.value).min().unwrap_or(0);
        Ok(Costs {
            contains_cost: costs.iter().map(|c| c.contains_cost).sum(),
            next_cost: primary.next_cost + probe_cost,
            size: Size {
                value: size,
                exact: costs.len() == 1 && primary.size.exact,
            },
        })
    }

    fn optimize(self: Arc<Self>, ctx: OptimizeContext<'_>) -> (ShapeRef, bool) {
        let mut changed = false;
        let mut primary = 0;
        let mut subs: Vec<ShapeRef> = Vec::with_capacity(self.subs.len());
        for (i, sub) in self.subs.iter().enumerate() {
            let sub_ctx = if i == self.primary {
                ctx
            } else {
                ctx.unordered()
            };
            let (opt, c) = Arc::clone(sub).optimize(sub_ctx);
            changed |= c;
            if let Some(inner) = downcast::<And>(&opt) {
                if i == self.primary {
                    primary = subs.len() + inner.primary;
                }
                subs.extend(inner.subs.iter().cloned());
                changed = true;
                continue;
            }
            if i == self.primary {
                primary = subs.len();
            }
            subs.push(opt);
        }

        if subs.is_empty() || subs.iter().any(is_null) {
            return (null(), true);
        }

        // Intersecting with every node is a no-op unless it drives an ordered scan.
        if subs.len() > 1 {
            let keep_primary = ctx.ordered;
            let mut kept = Vec::with_capacity(subs.len());
            let mut new_primary = 0;
            let mut dropped = None;
            for (i, sub) in subs.into_iter().enumerate() {
                let is_all = sub.as_any().is::<AllNodes>();
                if is_all && !(keep_primary && i == primary) {
                    changed = true;
                    dropped.get_or_insert(sub);
                    continue;
                }
                if i == primary {
                    new_primary = kept.len();
                }
                kept.push(sub);
            }
            if let (true, Some(all)) = (kept.is_empty(), dropped) {
                // Only AllNodes operands: any one of them will do.
                kept.push(all);
            }
            subs = kept;
            primary = new_primary.min(subs.len() - 1);
        }

        if subs.len() == 1 {
            return (subs.swap_remove(0), true);
        }

        if !ctx.ordered {
            let best = self.pick_primary(&subs, primary, ctx.cancel);
            changed |= best != primary;
            primary = best;
        }
        changed |= primary != self.primary;

        if !changed {
            return (self, false);
        }
        (Arc::new(And::with_primary(subs, primary)), true)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct AndScanner {
    primary: (usize, Box<dyn Scanner>),
    probes: Vec<(usize, Box<dyn Index>)>,
    combos: Combinations,
    current: Option<Handle>,
    status: Status,
}

impl AndScanner {
    /// Binding sets of every operand for `value`, in declared order.
    fn gather(&mut self, cancel: &CancelToken) -> Result<Vec<Vec<Tags>>, QueryError> {
        let count = self.probes.len() + 1;
        let mut sets: Vec<(usize, Vec<Tags>)> = Vec::with_capacity(count);
        sets.push((self.primary.0, collect_paths(self.primary.1.as_mut(), cancel)?));
        for (pos, probe) in &mut self.probes {
            sets.push((*pos, collect_paths(probe.as_mut(), cancel)?));
        }
        sets.sort_by_key(|(pos, _)| *pos);
        Ok(sets.into_iter().map(|(_, s)| s).collect())
    }
}

impl Base for AndScanner {
    fn result(&self) -> Option<Handle> {
        self.current
    }

    fn tag_results(&self, dst: &mut Tags) {
        self.combos.tag_results(dst);
    }

    fn next_path(&mut self, cancel: &CancelToken) -> bool {
        self.current.is_some() && self.status.ready(cancel) && self.combos.advance()
    }

    fn err(&self) -> Option<&QueryError> {
        self.status.err()
    }

    fn close(&mut self) -> Result<(), QueryError> {
        self.status.close();
        self.current = None;
        let mut closer = Closer::default();
        closer.close(self.primary.1.as_mut());
        for (_, probe) in &mut self.probes {
            closer.close(probe.as_mut());
        }
        closer.finish()
    }
}

impl Scanner for AndScanner {
    fn next(&mut self, cancel: &CancelToken) -> bool {
        self.current = None;
        'candidates: loop {
            if !self.status.ready(cancel) {
                return false;
            }
            if !self.primary.1.next(cancel) {
                return self.status.adopt(self.primary.1.as_ref());
            }
            let Some(value) = self.primary.1.result() else {
                continue;
            };
            for (_, probe) in &mut self.probes {
                if !probe.contains(cancel, value) {
                    if let Some(err) = probe.err() {
                        return self.status.fail(err.clone());
                    }
                    continue 'candidates;
                }
            }
            match self.gather(cancel) {
                Ok(sets) => {
                    self.combos = Combinations::new(sets);
                    self.current = Some(value);
                    return true;
                }
                Err(err) => return self.status.fail(err),
            }
        }
    }
}

struct AndIndex {
    order: Vec<usize>,
    probes: Vec<Box<dyn Index>>,
    combos: Combinations,
    current: Option<Handle>,
    status: Status,
}

impl Base for AndIndex {
    fn result(&self) -> Option<Handle> {
        self.current
    }

    fn tag_results(&self, dst: &mut Tags) {
        self.combos.tag_results(dst);
    }

    fn next_path(&mut self, cancel: &CancelToken) -> bool {
        self.current.is_some() && self.status.ready(cancel) && self.combos.advance()
    }

    fn err(&self) -> Option<&QueryError> {
        self.status.err()
    }

    fn close(&mut self) -> Result<(), QueryError> {
        self.status.close();
        self.current = None;
        let mut closer = Closer::default();
        for probe in &mut self.probes {
            closer.close(probe.as_mut());
        }
        closer.finish()
    }
}

impl Index for AndIndex {
    fn contains(&mut self, cancel: &CancelToken, value: Handle) -> bool {
        self.current = None;
        if !self.status.ready(cancel) {
            return false;
        }
        for &i in &self.order {
            let probe = &mut self.probes[i];
            if !probe.contains(cancel, value) {
                return self.status.adopt(probe.as_ref());
            }
        }
        let mut sets = Vec::with_capacity(self.probes.len());
        for probe in &mut self.probes {
            match collect_paths(probe.as_mut(), cancel) {
                Ok(paths) => sets.push(paths),
                Err(err) => return self.status.fail(err),
            }
        }
        self.combos = Combinations::new(sets);
        self.current = Some(value);
        true
    }
}
