//! Deterministic in-memory operation store.
//!
//! All state lives behind a single mutex, so every store primitive is one
//! critical section with respect to every other. That is the whole
//! concurrency story: lease handoff, operand writes and readiness promotion
//! cannot interleave. Ids are assigned monotonically, which also makes the
//! lease tie-break (lowest ready id) deterministic.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use abacus_core::error::{StoreError, StoreResult};
use abacus_core::store::OperationStore;
use abacus_core::types::{
    ChildSide, Expression, ExpressionId, ExpressionStatus, NewOperation, Operation, OperationId,
    OperationStatus,
};

#[derive(Default)]
struct State {
    expressions: BTreeMap<i64, Expression>,
    operations: BTreeMap<i64, Operation>,
    next_expression_id: i64,
    next_operation_id: i64,
}

/// Thread-safe in-memory implementation of [`OperationStore`].
///
/// Authoritative enough for single-process deployments and the default
/// backend for tests.
pub struct MemoryStore {
    state: Mutex<State>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new_inner()
    }
}

impl MemoryStore {
    /// Create a new empty store wrapped in `Arc`.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::new_inner())
    }

    fn new_inner() -> Self {
        Self { state: Mutex::new(State::default()) }
    }
}

#[async_trait]
impl OperationStore for MemoryStore {
    async fn create_expression(&self, owner_id: i64, text: &str) -> StoreResult<Expression> {
        let mut state = self.state.lock().await;
        state.next_expression_id += 1;
        let now = Utc::now();
        let expression = Expression {
            id: ExpressionId(state.next_expression_id),
            owner_id,
            text: text.to_string(),
            status: ExpressionStatus::Pending,
            result: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        state.expressions.insert(expression.id.0, expression.clone());
        Ok(expression)
    }

    async fn create_operation(&self, op: NewOperation) -> StoreResult<Operation> {
        let mut state = self.state.lock().await;
        if !state.expressions.contains_key(&op.expression_id.0) {
            return Err(StoreError::ExpressionNotFound { id: op.expression_id });
        }
        state.next_operation_id += 1;
        let now = Utc::now();
        let operation = Operation {
            id: OperationId(state.next_operation_id),
            expression_id: op.expression_id,
            parent_id: op.parent.map(|(id, _)| id),
            child_side: op.parent.map(|(_, side)| side),
            is_root: op.is_root(),
            operator: op.operator,
            left_value: op.left_value,
            right_value: op.right_value,
            result: None,
            status: op.initial_status(),
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        state.operations.insert(operation.id.0, operation.clone());
        Ok(operation)
    }

    async fn fetch_expression(&self, id: ExpressionId) -> StoreResult<Expression> {
        let state = self.state.lock().await;
        state.expressions.get(&id.0).cloned().ok_or(StoreError::ExpressionNotFound { id })
    }

    async fn fetch_operation(&self, id: OperationId) -> StoreResult<Operation> {
        let state = self.state.lock().await;
        state.operations.get(&id.0).cloned().ok_or(StoreError::OperationNotFound { id })
    }

    async fn list_operations_by_expression(
        &self,
        expression_id: ExpressionId,
    ) -> StoreResult<Vec<Operation>> {
        let state = self.state.lock().await;
        Ok(state
            .operations
            .values()
            .filter(|op| op.expression_id == expression_id)
            .cloned()
            .collect())
    }

    async fn list_expressions_by_owner(&self, owner_id: i64) -> StoreResult<Vec<Expression>> {
        let state = self.state.lock().await;
        Ok(state
            .expressions
            .values()
            .filter(|expr| expr.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn update_operation_operand(
        &self,
        id: OperationId,
        side: ChildSide,
        value: f64,
    ) -> StoreResult<Operation> {
        let mut state = self.state.lock().await;
        let operation =
            state.operations.get_mut(&id.0).ok_or(StoreError::OperationNotFound { id })?;

        let slot = match side {
            ChildSide::Left => &mut operation.left_value,
            ChildSide::Right => &mut operation.right_value,
        };
        if slot.is_some() {
            return Err(StoreError::OperandAlreadySet { id, side });
        }
        *slot = Some(value);

        // Promotion happens under the same lock as the write, so the
        // operation can never be observed with both operands and a stale
        // pending status.
        if operation.has_both_operands() && operation.status == OperationStatus::Pending {
            operation.status = OperationStatus::Ready;
        }
        operation.updated_at = Utc::now();
        Ok(operation.clone())
    }

    async fn update_operation_status(
        &self,
        id: OperationId,
        status: OperationStatus,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let operation =
            state.operations.get_mut(&id.0).ok_or(StoreError::OperationNotFound { id })?;
        operation.status = status;
        operation.updated_at = Utc::now();
        Ok(())
    }

    async fn update_operation_result(&self, id: OperationId, value: f64) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let operation =
            state.operations.get_mut(&id.0).ok_or(StoreError::OperationNotFound { id })?;
        if operation.status.is_terminal() {
            return Ok(());
        }
        operation.result = Some(value);
        operation.status = OperationStatus::Completed;
        operation.updated_at = Utc::now();
        Ok(())
    }

    async fn update_operation_error(&self, id: OperationId, message: &str) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let operation =
            state.operations.get_mut(&id.0).ok_or(StoreError::OperationNotFound { id })?;
        if operation.status.is_terminal() {
            return Ok(());
        }
        operation.error_message = Some(message.to_string());
        operation.status = OperationStatus::Error;
        operation.updated_at = Utc::now();
        Ok(())
    }

    async fn cancel_expression_operations(&self, expression_id: ExpressionId) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut canceled = 0;
        for operation in state.operations.values_mut() {
            if operation.expression_id == expression_id && !operation.status.is_terminal() {
                operation.status = OperationStatus::Canceled;
                operation.updated_at = now;
                canceled += 1;
            }
        }
        Ok(canceled)
    }

    async fn lease_ready_operation(&self) -> StoreResult<Option<Operation>> {
        let mut state = self.state.lock().await;
        // BTreeMap iteration order gives the lowest ready id.
        let ready_id = state
            .operations
            .values()
            .find(|op| op.status == OperationStatus::Ready)
            .map(|op| op.id.0);

        match ready_id {
            Some(id) => {
                let operation = state
                    .operations
                    .get_mut(&id)
                    .ok_or(StoreError::OperationNotFound { id: OperationId(id) })?;
                operation.status = OperationStatus::Processing;
                operation.updated_at = Utc::now();
                Ok(Some(operation.clone()))
            }
            None => Ok(None),
        }
    }

    async fn finalize_expression(&self, id: ExpressionId, result: f64) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let expression =
            state.expressions.get_mut(&id.0).ok_or(StoreError::ExpressionNotFound { id })?;
        expression.status = ExpressionStatus::Completed;
        expression.result = Some(result);
        expression.updated_at = Utc::now();
        Ok(())
    }

    async fn set_expression_error(&self, id: ExpressionId, message: &str) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let expression =
            state.expressions.get_mut(&id.0).ok_or(StoreError::ExpressionNotFound { id })?;
        expression.status = ExpressionStatus::Error;
        expression.error_message = Some(message.to_string());
        expression.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abacus_core::types::Operator;

    fn ready_op(expression_id: ExpressionId) -> NewOperation {
        NewOperation {
            expression_id,
            parent: None,
            operator: Operator::Add,
            left_value: Some(2.0),
            right_value: Some(3.0),
        }
    }

    #[tokio::test]
    async fn expression_ids_are_monotonic() {
        let store = MemoryStore::new();
        let first = store.create_expression(1, "2+3").await.unwrap();
        let second = store.create_expression(1, "4*5").await.unwrap();
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn operation_requires_existing_expression() {
        let store = MemoryStore::new();
        let err = store.create_operation(ready_op(ExpressionId(42))).await.unwrap_err();
        assert!(matches!(err, StoreError::ExpressionNotFound { .. }));
    }

    #[tokio::test]
    async fn operand_double_write_is_rejected() {
        let store = MemoryStore::new();
        let expr = store.create_expression(1, "2+3").await.unwrap();
        let op = store
            .create_operation(NewOperation {
                expression_id: expr.id,
                parent: None,
                operator: Operator::Add,
                left_value: Some(2.0),
                right_value: None,
            })
            .await
            .unwrap();

        store.update_operation_operand(op.id, ChildSide::Right, 3.0).await.unwrap();
        let err =
            store.update_operation_operand(op.id, ChildSide::Right, 9.0).await.unwrap_err();
        assert!(matches!(err, StoreError::OperandAlreadySet { .. }));
    }

    #[tokio::test]
    async fn operand_write_promotes_pending_to_ready() {
        let store = MemoryStore::new();
        let expr = store.create_expression(1, "2+3").await.unwrap();
        let op = store
            .create_operation(NewOperation {
                expression_id: expr.id,
                parent: None,
                operator: Operator::Add,
                left_value: Some(2.0),
                right_value: None,
            })
            .await
            .unwrap();
        assert_eq!(op.status, OperationStatus::Pending);

        let updated = store.update_operation_operand(op.id, ChildSide::Right, 3.0).await.unwrap();
        assert_eq!(updated.status, OperationStatus::Ready);
    }

    #[tokio::test]
    async fn lease_picks_lowest_ready_id_and_marks_processing() {
        let store = MemoryStore::new();
        let expr = store.create_expression(1, "(1+2)*(3+4)").await.unwrap();
        let first = store.create_operation(ready_op(expr.id)).await.unwrap();
        let _second = store.create_operation(ready_op(expr.id)).await.unwrap();

        let leased = store.lease_ready_operation().await.unwrap().unwrap();
        assert_eq!(leased.id, first.id);
        assert_eq!(leased.status, OperationStatus::Processing);

        let refetched = store.fetch_operation(first.id).await.unwrap();
        assert_eq!(refetched.status, OperationStatus::Processing);
    }

    #[tokio::test]
    async fn cancel_skips_terminal_operations() {
        let store = MemoryStore::new();
        let expr = store.create_expression(1, "(1+2)*(3+4)").await.unwrap();
        let done = store.create_operation(ready_op(expr.id)).await.unwrap();
        let live = store.create_operation(ready_op(expr.id)).await.unwrap();
        store.update_operation_result(done.id, 3.0).await.unwrap();

        let canceled = store.cancel_expression_operations(expr.id).await.unwrap();
        assert_eq!(canceled, 1);
        assert_eq!(
            store.fetch_operation(done.id).await.unwrap().status,
            OperationStatus::Completed
        );
        assert_eq!(
            store.fetch_operation(live.id).await.unwrap().status,
            OperationStatus::Canceled
        );
    }

    #[tokio::test]
    async fn result_update_is_a_noop_on_terminal_rows() {
        let store = MemoryStore::new();
        let expr = store.create_expression(1, "2/0").await.unwrap();
        let op = store.create_operation(ready_op(expr.id)).await.unwrap();
        store.update_operation_error(op.id, "division by zero").await.unwrap();

        store.update_operation_result(op.id, 99.0).await.unwrap();
        let refetched = store.fetch_operation(op.id).await.unwrap();
        assert_eq!(refetched.status, OperationStatus::Error);
        assert_eq!(refetched.result, None);
    }
}
