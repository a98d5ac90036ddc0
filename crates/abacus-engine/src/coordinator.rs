//! Coordinator facade: submission, task handout and reply intake over one store.

use std::sync::Arc;

use tracing::{info, warn};

use abacus_core::config::OperatorTimings;
use abacus_core::store::OperationStore;
use abacus_core::types::ExpressionId;

use crate::dispense::{TaskDescriptor, TaskDispenser};
use crate::error::{EngineError, Result};
use crate::graph::build_graph;
use crate::parse::parse_expression;
use crate::propagate::{ResultPropagator, TaskResult};
use crate::query::{ExpressionQuery, ExpressionView};

/// Ties the parser, graph builder, dispenser, propagator and query together
/// over a single store.
///
/// The coordinator is cheap to share behind an `Arc`; all mutable state is
/// in the store.
pub struct Coordinator<S: OperationStore + ?Sized> {
    store: Arc<S>,
    dispenser: TaskDispenser<S>,
    propagator: ResultPropagator<S>,
    query: ExpressionQuery<S>,
}

impl<S: OperationStore + ?Sized> Coordinator<S> {
    /// Create a coordinator with the given operator latency table.
    pub fn new(store: Arc<S>, timings: OperatorTimings) -> Self {
        Self {
            dispenser: TaskDispenser::new(store.clone(), timings),
            propagator: ResultPropagator::new(store.clone()),
            query: ExpressionQuery::new(store.clone()),
            store,
        }
    }

    /// Accept an expression from an authenticated owner.
    ///
    /// The expression row is created first, so a submission that fails to
    /// parse is still queryable: it is persisted in `error` status with the
    /// parse message, and the caller gets `InvalidExpression`.
    pub async fn submit(&self, owner_id: i64, text: &str) -> Result<ExpressionId> {
        let expression = self.store.create_expression(owner_id, text).await?;

        let ast = match parse_expression(text) {
            Ok(ast) => ast,
            Err(EngineError::InvalidExpression { reason }) => {
                warn!(expression_id = %expression.id, %reason, "rejecting submission");
                self.store
                    .set_expression_error(
                        expression.id,
                        &format!("Invalid expression: {reason}"),
                    )
                    .await?;
                return Err(EngineError::InvalidExpression { reason });
            }
            Err(other) => return Err(other),
        };

        match build_graph(self.store.as_ref(), expression.id, &ast).await {
            Ok(built) => {
                info!(expression_id = %expression.id, owner_id, ?built, "expression submitted");
                Ok(expression.id)
            }
            Err(err) => {
                // Mid-build storage failure: leave the expression visibly
                // errored rather than half-built and forever pending.
                let _ = self
                    .store
                    .set_expression_error(expression.id, &format!("failed to build graph: {err}"))
                    .await;
                Err(err)
            }
        }
    }

    /// Lease the next ready operation for a polling worker.
    pub async fn next_task(&self) -> Option<TaskDescriptor> {
        self.dispenser.next_task().await
    }

    /// Ingest a worker reply.
    pub async fn submit_result(&self, reply: TaskResult) -> Result<()> {
        self.propagator.apply_result(reply).await
    }

    /// Project one expression, without an ownership check.
    pub async fn get_expression(&self, id: ExpressionId) -> Result<ExpressionView> {
        self.query.get(id).await
    }

    /// Project one expression for a specific owner.
    pub async fn get_expression_for_owner(
        &self,
        id: ExpressionId,
        owner_id: i64,
    ) -> Result<ExpressionView> {
        self.query.get_for_owner(id, owner_id).await
    }

    /// List an owner's expressions.
    pub async fn list_expressions(&self, owner_id: i64) -> Result<Vec<ExpressionView>> {
        self.query.list_for_owner(owner_id).await
    }
}
