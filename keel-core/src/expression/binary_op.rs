use crate::Expression;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOpType {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Addition,
    Subtraction,
    Multiplication,
    Division,
    Remainder,
}

impl BinaryOpType {
    pub fn is_comparison(&self) -> bool {
        self.negated().is_some()
    }

    /// Comparison holding exactly when `self` does not.
    pub fn negated(&self) -> Option<BinaryOpType> {
        Some(match self {
            BinaryOpType::Equal => BinaryOpType::NotEqual,
            BinaryOpType::NotEqual => BinaryOpType::Equal,
            BinaryOpType::Less => BinaryOpType::GreaterEqual,
            BinaryOpType::LessEqual => BinaryOpType::Greater,
            BinaryOpType::Greater => BinaryOpType::LessEqual,
            BinaryOpType::GreaterEqual => BinaryOpType::Less,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryOp {
    pub op: BinaryOpType,
    pub lhs: Box<Expression>,
    pub rhs: Box<Expression>,
}
