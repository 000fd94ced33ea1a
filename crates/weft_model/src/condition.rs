//! Branch conditions.
//!
//! Conditions are authored directly in wire form; lowering copies them
//! through unchanged.

use crate::literals::Primitive;
use serde::{Deserialize, Serialize};

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    /// `==`
    Eq,
    /// `!=`
    Neq,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
}

/// Operand of a comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    /// Constant
    Primitive(Primitive),
    /// Workflow input or upstream output by name
    Var(String),
}

/// `left <op> right`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonExpression {
    /// Operator
    pub operator: ComparisonOperator,
    /// Left operand
    pub left_value: Operand,
    /// Right operand
    pub right_value: Operand,
}

/// Logical connective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConjunctionOperator {
    /// Both sides hold
    And,
    /// Either side holds
    Or,
}

/// `left <and|or> right`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConjunctionExpression {
    /// Connective
    pub operator: ConjunctionOperator,
    /// Left side
    pub left_expression: Box<BooleanExpression>,
    /// Right side
    pub right_expression: Box<BooleanExpression>,
}

/// Boolean condition of a branch case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BooleanExpression {
    /// Logical combination
    Conjunction(ConjunctionExpression),
    /// Single comparison
    Comparison(ComparisonExpression),
}

impl BooleanExpression {
    /// `left <op> right`
    #[must_use]
    pub fn compare(operator: ComparisonOperator, left: Operand, right: Operand) -> Self {
        Self::Comparison(ComparisonExpression {
            operator,
            left_value: left,
            right_value: right,
        })
    }

    /// `self and other`
    #[must_use]
    pub fn and(self, other: BooleanExpression) -> Self {
        Self::Conjunction(ConjunctionExpression {
            operator: ConjunctionOperator::And,
            left_expression: Box::new(self),
            right_expression: Box::new(other),
        })
    }

    /// `self or other`
    #[must_use]
    pub fn or(self, other: BooleanExpression) -> Self {
        Self::Conjunction(ConjunctionExpression {
            operator: ConjunctionOperator::Or,
            left_expression: Box::new(self),
            right_expression: Box::new(other),
        })
    }
}

/// Failure raised when no branch case matches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchError {
    /// Node reported as failed
    pub failed_node_id: String,
    /// Message shown to the user
    pub message: String,
}
