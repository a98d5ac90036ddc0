//! Result propagator: applies worker replies to the operation tree.
//!
//! Runs once per worker reply. A success reply completes the operation and
//! either finalizes the expression (root) or feeds the parent's operand
//! slot, promoting the parent to ready when both slots are present. An
//! error reply turns the whole expression into an error cascade. Replies
//! for terminal operations are dropped, which is what makes duplicate
//! deliveries harmless.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use abacus_core::error::StoreError;
use abacus_core::store::OperationStore;
use abacus_core::types::{Operation, OperationId, OperationStatus};

use crate::error::Result;

/// Sentinel carried in [`TaskResult::error`] when the worker succeeded.
pub const NO_ERROR: &str = "nil";

/// A worker's reply for one dispensed operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// The operation this reply answers.
    pub id: OperationId,
    /// Computed value; meaningless when `error` names a failure.
    pub result: f64,
    /// `"nil"` or empty on success; any other value is a failure message.
    pub error: String,
}

impl TaskResult {
    /// A successful reply.
    pub fn ok(id: OperationId, result: f64) -> Self {
        Self { id, result, error: NO_ERROR.to_string() }
    }

    /// A failed reply.
    pub fn failed(id: OperationId, message: impl Into<String>) -> Self {
        Self { id, result: 0.0, error: message.into() }
    }

    /// The failure message, if this reply reports one.
    pub fn failure_message(&self) -> Option<&str> {
        if self.error.is_empty() || self.error == NO_ERROR {
            None
        } else {
            Some(&self.error)
        }
    }
}

/// Applies worker replies to persisted operations.
pub struct ResultPropagator<S: OperationStore + ?Sized> {
    store: Arc<S>,
}

impl<S: OperationStore + ?Sized> ResultPropagator<S> {
    /// Create a propagator over a store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Apply one worker reply.
    ///
    /// Idempotent against duplicates: replies for unknown or terminal
    /// operations are dropped. Storage failures bubble to the caller so the
    /// reply can be retried; the operation stays `Processing` meanwhile.
    pub async fn apply_result(&self, reply: TaskResult) -> Result<()> {
        let operation = match self.store.fetch_operation(reply.id).await {
            Ok(operation) => operation,
            Err(StoreError::OperationNotFound { id }) => {
                warn!(operation_id = %id, "reply for unknown operation dropped");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        if operation.status.is_terminal() {
            debug!(
                operation_id = %operation.id,
                status = operation.status.as_str(),
                "duplicate reply for terminal operation dropped"
            );
            return Ok(());
        }

        if let Some(message) = reply.failure_message() {
            return self.cascade_error(&operation, message).await;
        }

        self.store.update_operation_result(operation.id, reply.result).await?;

        if operation.is_root {
            self.store.finalize_expression(operation.expression_id, reply.result).await?;
            info!(
                expression_id = %operation.expression_id,
                result = reply.result,
                "expression completed"
            );
            return Ok(());
        }

        let (Some(parent_id), Some(side)) = (operation.parent_id, operation.child_side) else {
            // A non-root operation without parent links cannot occur in a
            // well-formed graph; dropping the reply keeps the handler total.
            warn!(
                operation_id = %operation.id,
                "non-root operation has no parent link; reply dropped"
            );
            return Ok(());
        };

        // The store promotes the parent pending -> ready in the same
        // critical section as this write.
        match self.store.update_operation_operand(parent_id, side, reply.result).await {
            Ok(parent) => {
                if parent.status == OperationStatus::Ready {
                    debug!(operation_id = %parent.id, "parent promoted to ready");
                }
                Ok(())
            }
            Err(StoreError::OperandAlreadySet { id, side }) => {
                warn!(
                    operation_id = %id,
                    side = side.as_str(),
                    "parent operand already populated; reply dropped"
                );
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Error branch: mark the operation and its expression failed, then
    /// cancel every other live operation of the expression.
    async fn cascade_error(&self, operation: &Operation, message: &str) -> Result<()> {
        self.store.update_operation_error(operation.id, message).await?;
        let canceled =
            self.store.cancel_expression_operations(operation.expression_id).await?;
        self.store.set_expression_error(operation.expression_id, message).await?;

        info!(
            expression_id = %operation.expression_id,
            operation_id = %operation.id,
            canceled,
            message,
            "expression failed; sibling operations canceled"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abacus_core::types::{ChildSide, ExpressionStatus, NewOperation, Operator};
    use abacus_store::MemoryStore;
    use std::sync::Arc;

    async fn tree(store: &Arc<MemoryStore>) -> (abacus_core::types::Expression, OperationId, OperationId, OperationId) {
        // (1+2)*(3+4): root multiplication with two ready additions.
        let expr = store.create_expression(1, "(1+2)*(3+4)").await.unwrap();
        let root = store
            .create_operation(NewOperation {
                expression_id: expr.id,
                parent: None,
                operator: Operator::Multiply,
                left_value: None,
                right_value: None,
            })
            .await
            .unwrap();
        let left = store
            .create_operation(NewOperation {
                expression_id: expr.id,
                parent: Some((root.id, ChildSide::Left)),
                operator: Operator::Add,
                left_value: Some(1.0),
                right_value: Some(2.0),
            })
            .await
            .unwrap();
        let right = store
            .create_operation(NewOperation {
                expression_id: expr.id,
                parent: Some((root.id, ChildSide::Right)),
                operator: Operator::Add,
                left_value: Some(3.0),
                right_value: Some(4.0),
            })
            .await
            .unwrap();
        (expr, root.id, left.id, right.id)
    }

    #[tokio::test]
    async fn child_results_fill_parent_slots_and_promote() {
        let store = MemoryStore::new();
        let (_, root, left, right) = tree(&store).await;
        let propagator = ResultPropagator::new(store.clone());

        store.update_operation_status(left, OperationStatus::Processing).await.unwrap();
        propagator.apply_result(TaskResult::ok(left, 3.0)).await.unwrap();

        let parent = store.fetch_operation(root).await.unwrap();
        assert_eq!(parent.left_value, Some(3.0));
        assert_eq!(parent.status, OperationStatus::Pending, "one slot still empty");

        store.update_operation_status(right, OperationStatus::Processing).await.unwrap();
        propagator.apply_result(TaskResult::ok(right, 7.0)).await.unwrap();

        let parent = store.fetch_operation(root).await.unwrap();
        assert_eq!(parent.right_value, Some(7.0));
        assert_eq!(parent.status, OperationStatus::Ready, "both slots now set");
    }

    #[tokio::test]
    async fn root_completion_finalizes_the_expression() {
        let store = MemoryStore::new();
        let expr = store.create_expression(1, "2+3").await.unwrap();
        let root = store
            .create_operation(NewOperation {
                expression_id: expr.id,
                parent: None,
                operator: Operator::Add,
                left_value: Some(2.0),
                right_value: Some(3.0),
            })
            .await
            .unwrap();
        store.update_operation_status(root.id, OperationStatus::Processing).await.unwrap();

        let propagator = ResultPropagator::new(store.clone());
        propagator.apply_result(TaskResult::ok(root.id, 5.0)).await.unwrap();

        let expression = store.fetch_expression(expr.id).await.unwrap();
        assert_eq!(expression.status, ExpressionStatus::Completed);
        assert_eq!(expression.result, Some(5.0));
    }

    #[tokio::test]
    async fn error_reply_cascades_through_the_expression() {
        let store = MemoryStore::new();
        let (expr, root, left, right) = tree(&store).await;
        let propagator = ResultPropagator::new(store.clone());

        store.update_operation_status(right, OperationStatus::Processing).await.unwrap();
        propagator
            .apply_result(TaskResult::failed(right, "division by zero"))
            .await
            .unwrap();

        let expression = store.fetch_expression(expr.id).await.unwrap();
        assert_eq!(expression.status, ExpressionStatus::Error);
        assert_eq!(expression.error_message.as_deref(), Some("division by zero"));

        let errored = store.fetch_operation(right).await.unwrap();
        assert_eq!(errored.status, OperationStatus::Error);
        for id in [root, left] {
            assert_eq!(
                store.fetch_operation(id).await.unwrap().status,
                OperationStatus::Canceled
            );
        }
    }

    #[tokio::test]
    async fn duplicate_replies_are_dropped() {
        let store = MemoryStore::new();
        let expr = store.create_expression(1, "2+3").await.unwrap();
        let root = store
            .create_operation(NewOperation {
                expression_id: expr.id,
                parent: None,
                operator: Operator::Add,
                left_value: Some(2.0),
                right_value: Some(3.0),
            })
            .await
            .unwrap();
        store.update_operation_status(root.id, OperationStatus::Processing).await.unwrap();

        let propagator = ResultPropagator::new(store.clone());
        propagator.apply_result(TaskResult::ok(root.id, 5.0)).await.unwrap();
        // The second delivery lands on a completed operation and changes nothing.
        propagator.apply_result(TaskResult::ok(root.id, 99.0)).await.unwrap();
        propagator
            .apply_result(TaskResult::failed(root.id, "late failure"))
            .await
            .unwrap();

        let operation = store.fetch_operation(root.id).await.unwrap();
        assert_eq!(operation.result, Some(5.0));
        assert_eq!(operation.status, OperationStatus::Completed);
        assert_eq!(
            store.fetch_expression(expr.id).await.unwrap().status,
            ExpressionStatus::Completed
        );
    }

    #[tokio::test]
    async fn replies_for_unknown_operations_are_swallowed() {
        let store = MemoryStore::new();
        let propagator = ResultPropagator::new(store);
        propagator.apply_result(TaskResult::ok(OperationId(404), 1.0)).await.unwrap();
    }

    #[tokio::test]
    async fn empty_error_string_counts_as_success() {
        let reply = TaskResult { id: OperationId(1), result: 2.0, error: String::new() };
        assert_eq!(reply.failure_message(), None);
        let reply = TaskResult { id: OperationId(1), result: 2.0, error: NO_ERROR.to_string() };
        assert_eq!(reply.failure_message(), None);
        let reply = TaskResult::failed(OperationId(1), "division by zero");
        assert_eq!(reply.failure_message(), Some("division by zero"));
    }
}
