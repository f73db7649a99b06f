//! Fixpoint driver for plan rewriting.
//!
//! Each [`Shape::optimize`](crate::shape::Shape::optimize) call is one
//! post-order pass. The driver repeats passes until a pass reports no change.
//! Passes are bounded: a rewrite cycle is a defect in the node rules, and it is
//! reported rather than looped on.

use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::error::QueryError;
use crate::shape::{describe, OptimizeContext, ShapeRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Optimizer {
    max_passes: usize,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl Optimizer {
    pub fn new(max_passes: usize) -> Self {
        Self {
            max_passes: max_passes.max(1),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.max_optimize_passes)
    }

    /// Rewrite `shape` until it stops changing.
    pub fn run(&self, shape: ShapeRef, cancel: &CancelToken) -> Result<ShapeRef, QueryError> {
        let mut shape = shape;
        for pass in 1..=self.max_passes {
            cancel.check()?;
            let (next, changed) = shape.optimize(OptimizeContext::new(cancel));
            shape = next;
            if !changed {
                tracing::debug!(passes = pass, root = shape.name(), "optimizer reached fixpoint");
                return Ok(shape);
            }
        }
        let plan = serde_json::to_string(&describe(&shape, cancel)).unwrap_or_default();
        tracing::error!(passes = self.max_passes, plan = %plan, "optimizer did not converge");
        Err(QueryError::OptimizerDiverged {
            passes: self.max_passes,
        })
    }
}
