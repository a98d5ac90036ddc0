//! Worker-side arithmetic.

use abacus_core::types::Operator;
use abacus_engine::{TaskDescriptor, TaskResult};

/// Apply one operator to its operands.
///
/// The only defined failure is division by zero, reported with the exact
/// message the coordinator's error cascade stores.
pub fn apply_operator(operator: Operator, arg1: f64, arg2: f64) -> Result<f64, String> {
    match operator {
        Operator::Add => Ok(arg1 + arg2),
        Operator::Subtract => Ok(arg1 - arg2),
        Operator::Multiply => Ok(arg1 * arg2),
        Operator::Divide => {
            if arg2 == 0.0 {
                Err("division by zero".to_string())
            } else {
                Ok(arg1 / arg2)
            }
        }
    }
}

/// Compute the reply for one dispensed task.
pub fn execute(task: &TaskDescriptor) -> TaskResult {
    match apply_operator(task.operation, task.arg1, task.arg2) {
        Ok(value) => TaskResult::ok(task.id, value),
        Err(message) => TaskResult::failed(task.id, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abacus_core::types::OperationId;

    #[test]
    fn operators_compute_the_expected_values() {
        assert_eq!(apply_operator(Operator::Add, 2.0, 3.0), Ok(5.0));
        assert_eq!(apply_operator(Operator::Subtract, 2.0, 3.0), Ok(-1.0));
        assert_eq!(apply_operator(Operator::Multiply, 2.5, 4.0), Ok(10.0));
        assert_eq!(apply_operator(Operator::Divide, 9.0, 3.0), Ok(3.0));
    }

    #[test]
    fn division_by_zero_reports_the_sentinel_message() {
        assert_eq!(
            apply_operator(Operator::Divide, 2.0, 0.0),
            Err("division by zero".to_string())
        );
    }

    #[test]
    fn execute_wraps_success_and_failure() {
        let task = TaskDescriptor {
            id: OperationId(1),
            arg1: 6.0,
            arg2: 0.0,
            operation: Operator::Divide,
            operation_time_ns: 0,
        };
        let reply = execute(&task);
        assert_eq!(reply.failure_message(), Some("division by zero"));

        let task = TaskDescriptor { operation: Operator::Multiply, arg2: 7.0, ..task };
        let reply = execute(&task);
        assert_eq!(reply.failure_message(), None);
        assert_eq!(reply.result, 42.0);
    }
}
