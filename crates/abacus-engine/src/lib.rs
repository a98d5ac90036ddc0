//! Dependency-graph scheduler for the abacus evaluation service.
//!
//! Converts user-submitted arithmetic expressions into persistent trees of
//! binary operations, atomically dispenses ready operations to workers, and
//! propagates results (or error cascades) back up the tree until each
//! expression finalizes.
//!
//! The persisted operation status is the queue: `ready` rows form the
//! dispatch frontier, the store's lease primitive is the only dequeue, and
//! there is no in-memory queue to fall out of sync after a restart.
//!
//! # Example
//!
//! ```ignore
//! use abacus_core::config::OperatorTimings;
//! use abacus_engine::{Coordinator, TaskResult};
//! use abacus_store::MemoryStore;
//!
//! let coordinator = Coordinator::new(MemoryStore::new(), OperatorTimings::load()?);
//!
//! // Client side.
//! let id = coordinator.submit(owner_id, "(2+3)*(4+5)").await?;
//!
//! // Worker side.
//! while let Some(task) = coordinator.next_task().await {
//!     let value = compute(task.operation, task.arg1, task.arg2);
//!     coordinator.submit_result(TaskResult::ok(task.id, value)).await?;
//! }
//!
//! assert_eq!(coordinator.get_expression(id).await?.result, Some(45.0));
//! ```

#![warn(missing_docs)]

pub mod ast;
mod coordinator;
mod dispense;
mod error;
mod graph;
mod parse;
mod propagate;
mod query;

pub use ast::Expr;
pub use coordinator::Coordinator;
pub use dispense::{TaskDescriptor, TaskDispenser};
pub use error::{EngineError, Result};
pub use graph::{build_graph, BuiltGraph};
pub use parse::parse_expression;
pub use propagate::{ResultPropagator, TaskResult, NO_ERROR};
pub use query::{ExpressionQuery, ExpressionView};
