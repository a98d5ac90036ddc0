//! Error types for the scheduler.

use snafu::Snafu;

use abacus_core::error::StoreError;
use abacus_core::types::ExpressionId;

/// Result type for scheduler operations.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Errors that can occur while scheduling expressions.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum EngineError {
    /// The submitted text is not a valid expression in the supported
    /// grammar. No partial graph is ever produced.
    #[snafu(display("invalid expression: {reason}"))]
    InvalidExpression {
        /// What the parser rejected.
        reason: String,
    },

    /// The caller does not own the expression it asked for.
    #[snafu(display("expression {id} does not belong to the caller"))]
    AccessDenied {
        /// The expression that was requested.
        id: ExpressionId,
    },

    /// The persistence layer rejected an operation. Worker-reply handlers
    /// bubble this for external retry; the target operation stays leased.
    #[snafu(display("storage error: {source}"))]
    Storage {
        /// Underlying store failure.
        source: StoreError,
    },
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        Self::Storage { source: err }
    }
}
