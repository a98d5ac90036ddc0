//! Expression AST.

use abacus_core::types::Operator;

/// A parsed arithmetic expression.
///
/// The node set is deliberately closed: binary operations over the four
/// supported operators, parenthesized subtrees and numeric literals.
/// Anything else is rejected at parse time.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A numeric literal.
    Number(f64),
    /// A parenthesized subtree; transparent to graph building.
    Paren(Box<Expr>),
    /// A binary operation.
    Binary {
        /// The operator to apply.
        op: Operator,
        /// Left operand subtree.
        left: Box<Expr>,
        /// Right operand subtree.
        right: Box<Expr>,
    },
}

impl Expr {
    /// The literal value of this subtree, looking through any number of
    /// parentheses. `None` if the subtree contains an operation.
    ///
    /// This is what lets literal operands collapse into their parent's
    /// value slot instead of producing an operation of their own.
    pub fn literal_value(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Paren(inner) => inner.literal_value(),
            Self::Binary { .. } => None,
        }
    }
}
