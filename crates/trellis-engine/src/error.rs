//! Query errors.
//!
//! Not-found is never an error: an intern miss or an empty intersection is a
//! normal "no match". Errors are reserved for failures the caller must see
//! after a cursor reports no further result.

use std::sync::Arc;
use thiserror::Error;
use trellis_store::Handle;

#[derive(Debug, Clone, Error)]
pub enum QueryError {
    #[error("query cancelled")]
    Cancelled,

    #[error("query deadline exceeded")]
    DeadlineExceeded,

    /// A user-supplied filter or mapper failed.
    #[error("callback failed: {0}")]
    Callback(Arc<anyhow::Error>),

    /// The store does not know a handle the plan produced. This is a defect in
    /// the store adapter or the plan, not a runtime condition.
    #[error("handle {0} was not issued by the store")]
    UnknownHandle(Handle),

    #[error("cursor used after close")]
    Closed,

    #[error("invalid pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("optimizer did not reach a fixpoint after {passes} passes")]
    OptimizerDiverged { passes: usize },

    #[error("invalid engine configuration: {0}")]
    Config(String),
}

impl QueryError {
    pub fn callback(err: anyhow::Error) -> Self {
        QueryError::Callback(Arc::new(err))
    }

    /// True for the two cooperative-interruption variants.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, QueryError::Cancelled | QueryError::DeadlineExceeded)
    }
}
