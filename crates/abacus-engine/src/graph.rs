//! Graph builder: turns an AST into a persisted tree of operations.
//!
//! The walk happens in two passes. A pure planning pass flattens the AST
//! into parent-before-child order with literal operands already collapsed
//! into their parent's value slots; the insertion pass then creates one row
//! per planned node, translating plan indices into store-assigned ids.
//! Keeping the recursion in the pure pass means the store only ever sees a
//! flat sequence of inserts.

use tracing::debug;

use abacus_core::store::OperationStore;
use abacus_core::types::{ChildSide, ExpressionId, NewOperation, OperationId, Operator};

use crate::ast::Expr;
use crate::error::Result;

/// Outcome of building the operation graph for one expression.
#[derive(Debug, Clone, PartialEq)]
pub enum BuiltGraph {
    /// The expression was a bare literal: nothing to dispatch, the
    /// expression is already finalized with this value.
    Finalized {
        /// The literal value.
        value: f64,
    },
    /// A tree of operations was persisted.
    Operations {
        /// Id of the root operation.
        root: OperationId,
        /// Total number of operations created.
        total: usize,
    },
}

struct PlannedOperation {
    /// Index of the parent in the plan plus the slot this node feeds;
    /// `None` for the root.
    parent: Option<(usize, ChildSide)>,
    operator: Operator,
    left_value: Option<f64>,
    right_value: Option<f64>,
}

fn plan_node(expr: &Expr, parent: Option<(usize, ChildSide)>, plan: &mut Vec<PlannedOperation>) {
    match expr {
        // Parentheses are transparent: recurse with the same frame.
        Expr::Paren(inner) => plan_node(inner, parent, plan),
        Expr::Binary { op, left, right } => {
            let index = plan.len();
            plan.push(PlannedOperation {
                parent,
                operator: *op,
                left_value: left.literal_value(),
                right_value: right.literal_value(),
            });
            if left.literal_value().is_none() {
                plan_node(left, Some((index, ChildSide::Left)), plan);
            }
            if right.literal_value().is_none() {
                plan_node(right, Some((index, ChildSide::Right)), plan);
            }
        }
        // A literal either collapsed into its parent's slot (handled by the
        // Binary arm) or is the whole expression (handled by build_graph).
        Expr::Number(_) => {}
    }
}

/// Persist the operation tree for `expr` under `expression_id`.
///
/// A bare-literal expression produces no operations and finalizes the
/// expression immediately. Otherwise operations are inserted parent-first;
/// each is born `Ready` iff both of its operands were literals.
pub async fn build_graph<S: OperationStore + ?Sized>(
    store: &S,
    expression_id: ExpressionId,
    expr: &Expr,
) -> Result<BuiltGraph> {
    if let Some(value) = expr.literal_value() {
        store.finalize_expression(expression_id, value).await?;
        debug!(%expression_id, value, "bare literal finalized without operations");
        return Ok(BuiltGraph::Finalized { value });
    }

    let mut plan = Vec::new();
    plan_node(expr, None, &mut plan);

    let mut ids: Vec<OperationId> = Vec::with_capacity(plan.len());
    for planned in &plan {
        let parent = planned.parent.map(|(index, side)| (ids[index], side));
        let operation = store
            .create_operation(NewOperation {
                expression_id,
                parent,
                operator: planned.operator,
                left_value: planned.left_value,
                right_value: planned.right_value,
            })
            .await?;
        ids.push(operation.id);
    }

    debug!(%expression_id, operations = ids.len(), "operation graph persisted");
    Ok(BuiltGraph::Operations { root: ids[0], total: ids.len() })
}
