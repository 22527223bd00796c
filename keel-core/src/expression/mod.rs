mod binary_op;
mod expression;
mod function;
mod op_precedence;
mod operand;
mod ordered;
mod unary_op;
mod visitor;

pub use binary_op::*;
pub use expression::*;
pub use function::*;
pub use op_precedence::*;
pub use operand::*;
pub use ordered::*;
pub use unary_op::*;
pub use visitor::*;
