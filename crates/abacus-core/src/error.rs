//! Error types for the operation store.

use snafu::Snafu;

use crate::types::{ChildSide, ExpressionId, OperationId};

/// Result type for store operations.
pub type StoreResult<T, E = StoreError> = std::result::Result<T, E>;

/// Errors surfaced by `OperationStore` implementations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// No expression with the given id.
    #[snafu(display("expression {id} not found"))]
    ExpressionNotFound {
        /// Expression id that was looked up.
        id: ExpressionId,
    },

    /// No operation with the given id.
    #[snafu(display("operation {id} not found"))]
    OperationNotFound {
        /// Operation id that was looked up.
        id: OperationId,
    },

    /// An operand slot was written twice. Each slot is fed exactly once,
    /// either by a build-time literal or by one child's result.
    #[snafu(display("operand {side} of operation {id} is already set"))]
    OperandAlreadySet {
        /// Operation whose slot was targeted.
        id: OperationId,
        /// The slot that was already populated.
        side: ChildSide,
    },

    /// A persisted row could not be decoded back into a domain value.
    #[snafu(display("corrupt row: {reason}"))]
    CorruptRow {
        /// What failed to decode.
        reason: String,
    },

    /// The backing store rejected the operation (I/O, contention,
    /// constraint violation).
    #[snafu(display("store backend failed: {reason}"))]
    Backend {
        /// Backend failure description.
        reason: String,
    },
}

impl StoreError {
    /// Wrap an arbitrary backend failure.
    pub fn backend<E: std::fmt::Display>(err: E) -> Self {
        Self::Backend { reason: err.to_string() }
    }
}
