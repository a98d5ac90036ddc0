//! Core domain model for the abacus parallel evaluation service.
//!
//! An expression submitted by a user is decomposed into a persistent tree of
//! binary operations. The persisted operation status *is* the dispatch queue:
//! `ready` rows form the frontier handed to workers, and results propagate
//! back up the tree until the root finalizes the expression.
//!
//! This crate carries the pieces shared by every other crate:
//!
//! - [`types`]: `Expression`, `Operation`, statuses, operators
//! - [`store`]: the `OperationStore` persistence trait
//! - [`error`]: store error types
//! - [`config`]: operator latency table and worker settings

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use config::{ConfigError, OperatorTimings, WorkerSettings};
pub use error::{StoreError, StoreResult};
pub use store::OperationStore;
pub use types::{
    ChildSide, Expression, ExpressionId, ExpressionStatus, NewOperation, Operation, OperationId,
    OperationStatus, Operator,
};
