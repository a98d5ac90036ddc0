//! Operation store abstraction.
//!
//! Defines the `OperationStore` trait that abstracts persistence for
//! expressions and their operation trees. Operating at the domain level
//! (Expression / Operation types) rather than exposing raw SQL enables:
//! - Testing against a deterministic in-memory implementation
//! - Swapping storage backends without changing scheduler logic
//! - Clear separation between scheduling and infrastructure concerns
//!
//! Every method is atomic with respect to every other method: the in-memory
//! implementation serializes all primitives behind one lock, and the SQLite
//! implementation issues one guarded statement (or transaction) per call.
//! The scheduler relies on that to keep the readiness invariants intact
//! under concurrent worker traffic.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::{
    ChildSide, Expression, ExpressionId, NewOperation, Operation, OperationId, OperationStatus,
};

/// Persistent storage for expressions and their operation trees.
#[async_trait]
pub trait OperationStore: Send + Sync {
    /// Insert a new expression in `Pending` status and assign its id.
    async fn create_expression(&self, owner_id: i64, text: &str) -> StoreResult<Expression>;

    /// Insert one operation row. The row is born `Ready` iff both operand
    /// slots are populated, else `Pending` (see `NewOperation::initial_status`).
    async fn create_operation(&self, op: NewOperation) -> StoreResult<Operation>;

    /// Fetch an expression by id.
    async fn fetch_expression(&self, id: ExpressionId) -> StoreResult<Expression>;

    /// Fetch an operation by id.
    async fn fetch_operation(&self, id: OperationId) -> StoreResult<Operation>;

    /// All operations belonging to one expression, ordered by id.
    async fn list_operations_by_expression(
        &self,
        expression_id: ExpressionId,
    ) -> StoreResult<Vec<Operation>>;

    /// All expressions submitted by one owner, ordered by id.
    async fn list_expressions_by_owner(&self, owner_id: i64) -> StoreResult<Vec<Expression>>;

    /// Write one operand slot and return the post-image.
    ///
    /// Fails with `OperandAlreadySet` if the slot is populated: each slot is
    /// fed exactly once, by a build-time literal or by one child's result.
    /// When the write makes both slots present and the operation is still
    /// `Pending`, it is promoted to `Ready` in the same critical section, so
    /// a parent can never be observed leasable with stale operand state.
    async fn update_operation_operand(
        &self,
        id: OperationId,
        side: ChildSide,
        value: f64,
    ) -> StoreResult<Operation>;

    /// Set an operation's status unconditionally.
    ///
    /// Used for the `Ready → Processing` transition outside of leasing and
    /// for tests; the result/error setters below carry their own guards.
    async fn update_operation_status(
        &self,
        id: OperationId,
        status: OperationStatus,
    ) -> StoreResult<()>;

    /// Record a result and transition to `Completed`.
    ///
    /// No-op if the operation is already terminal: terminal statuses are
    /// absorbing and duplicate worker replies must not resurrect a row.
    async fn update_operation_result(&self, id: OperationId, value: f64) -> StoreResult<()>;

    /// Record an error message and transition to `Error`.
    ///
    /// No-op if the operation is already terminal.
    async fn update_operation_error(&self, id: OperationId, message: &str) -> StoreResult<()>;

    /// Transition every non-terminal operation of the expression to
    /// `Canceled`, leaving `Completed` and `Error` rows untouched.
    /// Returns the number of operations canceled.
    async fn cancel_expression_operations(&self, expression_id: ExpressionId) -> StoreResult<u64>;

    /// Atomically pick one `Ready` operation, transition it to `Processing`
    /// and return it; `None` when nothing is ready.
    ///
    /// At-most-once handoff: two concurrent callers never receive the same
    /// operation. Ties are broken deterministically by lowest id.
    async fn lease_ready_operation(&self) -> StoreResult<Option<Operation>>;

    /// Mark an expression `Completed` with its final value.
    async fn finalize_expression(&self, id: ExpressionId, result: f64) -> StoreResult<()>;

    /// Mark an expression `Error` with a failure message.
    async fn set_expression_error(&self, id: ExpressionId, message: &str) -> StoreResult<()>;
}

// Blanket implementation so schedulers can hold Arc<dyn OperationStore>
// or Arc<ConcreteStore> interchangeably.
#[async_trait]
impl<T: OperationStore + ?Sized> OperationStore for std::sync::Arc<T> {
    async fn create_expression(&self, owner_id: i64, text: &str) -> StoreResult<Expression> {
        (**self).create_expression(owner_id, text).await
    }

    async fn create_operation(&self, op: NewOperation) -> StoreResult<Operation> {
        (**self).create_operation(op).await
    }

    async fn fetch_expression(&self, id: ExpressionId) -> StoreResult<Expression> {
        (**self).fetch_expression(id).await
    }

    async fn fetch_operation(&self, id: OperationId) -> StoreResult<Operation> {
        (**self).fetch_operation(id).await
    }

    async fn list_operations_by_expression(
        &self,
        expression_id: ExpressionId,
    ) -> StoreResult<Vec<Operation>> {
        (**self).list_operations_by_expression(expression_id).await
    }

    async fn list_expressions_by_owner(&self, owner_id: i64) -> StoreResult<Vec<Expression>> {
        (**self).list_expressions_by_owner(owner_id).await
    }

    async fn update_operation_operand(
        &self,
        id: OperationId,
        side: ChildSide,
        value: f64,
    ) -> StoreResult<Operation> {
        (**self).update_operation_operand(id, side, value).await
    }

    async fn update_operation_status(
        &self,
        id: OperationId,
        status: OperationStatus,
    ) -> StoreResult<()> {
        (**self).update_operation_status(id, status).await
    }

    async fn update_operation_result(&self, id: OperationId, value: f64) -> StoreResult<()> {
        (**self).update_operation_result(id, value).await
    }

    async fn update_operation_error(&self, id: OperationId, message: &str) -> StoreResult<()> {
        (**self).update_operation_error(id, message).await
    }

    async fn cancel_expression_operations(&self, expression_id: ExpressionId) -> StoreResult<u64> {
        (**self).cancel_expression_operations(expression_id).await
    }

    async fn lease_ready_operation(&self) -> StoreResult<Option<Operation>> {
        (**self).lease_ready_operation().await
    }

    async fn finalize_expression(&self, id: ExpressionId, result: f64) -> StoreResult<()> {
        (**self).finalize_expression(id, result).await
    }

    async fn set_expression_error(&self, id: ExpressionId, message: &str) -> StoreResult<()> {
        (**self).set_expression_error(id, message).await
    }
}
