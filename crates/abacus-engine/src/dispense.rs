//! Task dispenser: hands ready operations to polling workers.
//!
//! There is no queue here. Readiness is a function of persisted state, the
//! store's lease primitive is the single source of atomicity, and the
//! dispenser only enriches the leased row with the configured operator
//! latency before handing it out.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use abacus_core::config::OperatorTimings;
use abacus_core::store::OperationStore;
use abacus_core::types::{OperationId, Operator};

/// One unit of work handed to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Operation id; echoed back in the worker's reply.
    pub id: OperationId,
    /// Left operand.
    pub arg1: f64,
    /// Right operand.
    pub arg2: f64,
    /// Operator, as its wire symbol.
    pub operation: Operator,
    /// How long the worker sleeps before replying, in nanoseconds.
    pub operation_time_ns: u64,
}

impl TaskDescriptor {
    /// The simulated latency as a duration.
    pub fn operation_time(&self) -> Duration {
        Duration::from_nanos(self.operation_time_ns)
    }
}

/// Dispenses leased operations to workers.
pub struct TaskDispenser<S: OperationStore + ?Sized> {
    store: Arc<S>,
    timings: OperatorTimings,
}

impl<S: OperationStore + ?Sized> TaskDispenser<S> {
    /// Create a dispenser over a store with the given latency table.
    pub fn new(store: Arc<S>, timings: OperatorTimings) -> Self {
        Self { store, timings }
    }

    /// Lease the next ready operation, if any.
    ///
    /// Returns `None` when nothing is ready or when the store fails;
    /// workers poll again either way.
    pub async fn next_task(&self) -> Option<TaskDescriptor> {
        let operation = match self.store.lease_ready_operation().await {
            Ok(Some(operation)) => operation,
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, "failed to lease a ready operation");
                return None;
            }
        };

        // A ready operation always carries both operands; a hole here means
        // the store broke that invariant.
        let (Some(arg1), Some(arg2)) = (operation.left_value, operation.right_value) else {
            error!(
                operation_id = %operation.id,
                "leased operation is missing an operand; refusing to dispatch"
            );
            return None;
        };

        Some(TaskDescriptor {
            id: operation.id,
            arg1,
            arg2,
            operation: operation.operator,
            operation_time_ns: self.timings.duration_for(operation.operator).as_nanos() as u64,
        })
    }
}
