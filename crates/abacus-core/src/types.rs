//! Core domain types: expressions and the operations that evaluate them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a submitted expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpressionId(pub i64);

impl std::fmt::Display for ExpressionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a single binary operation node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub i64);

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One of the four supported binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// `+`
    #[serde(rename = "+")]
    Add,
    /// `-`
    #[serde(rename = "-")]
    Subtract,
    /// `*`
    #[serde(rename = "*")]
    Multiply,
    /// `/`
    #[serde(rename = "/")]
    Divide,
}

impl Operator {
    /// The wire representation handed to workers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
        }
    }

    /// Parse the wire representation back into an operator.
    pub fn parse(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(Self::Add),
            "-" => Some(Self::Subtract),
            "*" => Some(Self::Multiply),
            "/" => Some(Self::Divide),
            _ => None,
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which operand slot of its parent a child operation feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChildSide {
    /// Feeds the parent's `left_value` slot.
    Left,
    /// Feeds the parent's `right_value` slot.
    Right,
}

impl ChildSide {
    /// Stable string form used in persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    /// Parse the persisted string form.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChildSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a submitted expression. Intermediate activity lives on the
/// operations, so an expression only ever reports these three states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpressionStatus {
    /// Evaluation has not finished.
    Pending,
    /// The root operation completed; `result` is set.
    Completed,
    /// Some operation failed; `error_message` is set.
    Error,
}

impl ExpressionStatus {
    /// Stable string form used in persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Parse the persisted string form.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Lifecycle status of an operation.
///
/// ```text
/// pending ── both operands set ──▶ ready
/// ready ── leased ───────────────▶ processing
/// processing ── success ─────────▶ completed
/// processing ── error ───────────▶ error
/// (any non-terminal) ── sibling error ──▶ canceled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Waiting for at least one operand from a child operation.
    Pending,
    /// Both operands known; eligible for lease.
    Ready,
    /// Leased to a worker.
    Processing,
    /// Finished with a result.
    Completed,
    /// The worker reported a failure.
    Error,
    /// A sibling operation errored; this one will never run.
    Canceled,
}

impl OperationStatus {
    /// Terminal statuses are absorbing: no transition ever leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Canceled)
    }

    /// Stable string form used in persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Canceled => "canceled",
        }
    }

    /// Parse the persisted string form.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "ready" => Some(Self::Ready),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }
}

/// A user-submitted expression together with its evaluation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expression {
    /// Store-assigned monotonic id.
    pub id: ExpressionId,
    /// Identity of the submitter, as validated by the caller.
    pub owner_id: i64,
    /// The original expression string, verbatim.
    pub text: String,
    /// Current status.
    pub status: ExpressionStatus,
    /// Final value; present iff `status` is `Completed`.
    pub result: Option<f64>,
    /// Failure description; present iff `status` is `Error`.
    pub error_message: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// One node of the binary dependency tree rooted at a single operation
/// per expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    /// Store-assigned monotonic id.
    pub id: OperationId,
    /// Owning expression.
    pub expression_id: ExpressionId,
    /// Parent operation; absent exactly for the root.
    pub parent_id: Option<OperationId>,
    /// Which parent slot this operation's result feeds; set iff `parent_id` is.
    pub child_side: Option<ChildSide>,
    /// Redundant with `parent_id.is_none()`, persisted to speed root checks.
    pub is_root: bool,
    /// The operator this node applies.
    pub operator: Operator,
    /// Left operand; populated at build time (literal) or by a child's result.
    pub left_value: Option<f64>,
    /// Right operand; populated at build time (literal) or by a child's result.
    pub right_value: Option<f64>,
    /// Result value; present iff `status` is `Completed`.
    pub result: Option<f64>,
    /// Current lifecycle status.
    pub status: OperationStatus,
    /// Failure description; set when `status` is `Error`.
    pub error_message: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Operation {
    /// Both operand slots are populated.
    pub fn has_both_operands(&self) -> bool {
        self.left_value.is_some() && self.right_value.is_some()
    }

    /// Read one operand slot.
    pub fn operand(&self, side: ChildSide) -> Option<f64> {
        match side {
            ChildSide::Left => self.left_value,
            ChildSide::Right => self.right_value,
        }
    }
}

/// Parameters for inserting one operation row.
///
/// `is_root` is implied by `parent.is_none()`; the store persists it
/// explicitly per the data model.
#[derive(Debug, Clone)]
pub struct NewOperation {
    /// Owning expression.
    pub expression_id: ExpressionId,
    /// Parent id and the slot this node feeds; `None` for the root.
    pub parent: Option<(OperationId, ChildSide)>,
    /// Operator the node applies.
    pub operator: Operator,
    /// Left operand, when it was a literal in the source.
    pub left_value: Option<f64>,
    /// Right operand, when it was a literal in the source.
    pub right_value: Option<f64>,
}

impl NewOperation {
    /// Status the row is born with: `Ready` iff both operands are
    /// literals known at build time.
    pub fn initial_status(&self) -> OperationStatus {
        if self.left_value.is_some() && self.right_value.is_some() {
            OperationStatus::Ready
        } else {
            OperationStatus::Pending
        }
    }

    /// Whether this row will be the expression's root operation.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_are_exactly_the_absorbing_ones() {
        assert!(OperationStatus::Completed.is_terminal());
        assert!(OperationStatus::Error.is_terminal());
        assert!(OperationStatus::Canceled.is_terminal());
        assert!(!OperationStatus::Pending.is_terminal());
        assert!(!OperationStatus::Ready.is_terminal());
        assert!(!OperationStatus::Processing.is_terminal());
    }

    #[test]
    fn operator_symbols_round_trip() {
        for op in [Operator::Add, Operator::Subtract, Operator::Multiply, Operator::Divide] {
            assert_eq!(Operator::parse(op.as_str()), Some(op));
        }
        assert_eq!(Operator::parse("%"), None);
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            OperationStatus::Pending,
            OperationStatus::Ready,
            OperationStatus::Processing,
            OperationStatus::Completed,
            OperationStatus::Error,
            OperationStatus::Canceled,
        ] {
            assert_eq!(OperationStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn operator_serializes_as_wire_symbol() {
        assert_eq!(serde_json::to_string(&Operator::Divide).unwrap(), "\"/\"");
        assert_eq!(serde_json::from_str::<Operator>("\"*\"").unwrap(), Operator::Multiply);
    }

    #[test]
    fn new_operation_initial_status_tracks_operands() {
        let both = NewOperation {
            expression_id: ExpressionId(1),
            parent: None,
            operator: Operator::Add,
            left_value: Some(2.0),
            right_value: Some(3.0),
        };
        assert_eq!(both.initial_status(), OperationStatus::Ready);
        assert!(both.is_root());

        let partial = NewOperation {
            left_value: None,
            parent: Some((OperationId(7), ChildSide::Left)),
            ..both
        };
        assert_eq!(partial.initial_status(), OperationStatus::Pending);
        assert!(!partial.is_root());
    }
}
