//! Trellis: graph query execution
//!
//! Queries are written as [`Path`] chains, compiled into trees of plan nodes
//! ([`Shape`]s), rewritten by the [`Optimizer`] and driven by a [`Session`].
//!
//! Every plan node can be consumed two ways:
//! 1. **Scanner**: enumerate results in order, with alternate binding sets
//!    (paths) for each result.
//! 2. **Index**: answer "is this handle a result?" and expose the bindings
//!    that make it one.
//!
//! Composite nodes pick whichever role of a child is cheaper, using the
//! size and cost estimates every node reports.
//!
//! ## Module Organization
//!
//! - `shape`: the node and cursor protocol, shared cursor helpers
//! - `nodes`: set algebra, traversal steps, tagging, paging, recursion
//! - `transform` / `constraint`: value-level filters and mappers
//! - `path`: the persistent builder; `compile` lowers it to nodes
//! - `optimizer`: fixpoint driver for node rewrites
//! - `session`: execution and result collection

pub mod cancel;
mod compile;
pub mod config;
pub mod constraint;
pub mod error;
pub mod nodes;
pub mod optimizer;
pub mod path;
pub mod session;
pub mod shape;
pub mod transform;

pub use cancel::CancelToken;
pub use config::{EngineConfig, RecursiveBindings};
pub use constraint::{CompareOp, Constraint, ValueConstraint};
pub use error::QueryError;
pub use optimizer::Optimizer;
pub use path::{Path, Via};
pub use session::{QueryResult, Session, TOP_RESULT_TAG};
pub use shape::{describe, Base, Costs, Description, Index, Scanner, Shape, ShapeRef, Size, Tags};
pub use transform::{FilterFn, MapFn, ValueFilter, ValueMapper};

pub use trellis_store::{Handle, QuadStore, Value, ValueKind};
