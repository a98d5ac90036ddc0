//! Read-only expression projections.

use std::sync::Arc;

use serde::Serialize;

use abacus_core::store::OperationStore;
use abacus_core::types::{Expression, ExpressionId, ExpressionStatus};

use crate::error::{EngineError, Result};

/// What external query surfaces see of an expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpressionView {
    /// Expression id.
    pub id: ExpressionId,
    /// One of `pending`, `completed`, `error`.
    pub status: ExpressionStatus,
    /// Final value, when completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<f64>,
    /// Failure description, when errored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<Expression> for ExpressionView {
    fn from(expression: Expression) -> Self {
        Self {
            id: expression.id,
            status: expression.status,
            result: expression.result,
            error_message: expression.error_message,
        }
    }
}

/// Read-only access to expression state.
pub struct ExpressionQuery<S: OperationStore + ?Sized> {
    store: Arc<S>,
}

impl<S: OperationStore + ?Sized> ExpressionQuery<S> {
    /// Create a query handle over a store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Project one expression.
    pub async fn get(&self, id: ExpressionId) -> Result<ExpressionView> {
        Ok(self.store.fetch_expression(id).await?.into())
    }

    /// Project one expression after checking the caller owns it.
    pub async fn get_for_owner(&self, id: ExpressionId, owner_id: i64) -> Result<ExpressionView> {
        let expression = self.store.fetch_expression(id).await?;
        if expression.owner_id != owner_id {
            return Err(EngineError::AccessDenied { id });
        }
        Ok(expression.into())
    }

    /// Project every expression submitted by one owner.
    pub async fn list_for_owner(&self, owner_id: i64) -> Result<Vec<ExpressionView>> {
        let expressions = self.store.list_expressions_by_owner(owner_id).await?;
        Ok(expressions.into_iter().map(ExpressionView::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abacus_store::MemoryStore;

    #[tokio::test]
    async fn view_hides_absent_optionals() {
        let store = MemoryStore::new();
        let expr = store.create_expression(1, "2+3").await.unwrap();

        let query = ExpressionQuery::new(store);
        let view = query.get(expr.id).await.unwrap();
        assert_eq!(view.status, ExpressionStatus::Pending);

        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("result").is_none());
        assert!(json.get("error_message").is_none());
    }

    #[tokio::test]
    async fn ownership_check_rejects_other_callers() {
        let store = MemoryStore::new();
        let expr = store.create_expression(7, "2+3").await.unwrap();

        let query = ExpressionQuery::new(store);
        assert!(query.get_for_owner(expr.id, 7).await.is_ok());
        let err = query.get_for_owner(expr.id, 8).await.unwrap_err();
        assert!(matches!(err, EngineError::AccessDenied { .. }));
    }
}
