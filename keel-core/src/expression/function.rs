use crate::{Expression, Operand, SubQuery};
use std::borrow::Cow;

/// Function call, the name goes through the dialect mapping when rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: Cow<'static, str>,
    pub args: Vec<Expression>,
    pub distinct: bool,
}

pub fn call(name: impl Into<Cow<'static, str>>, args: Vec<Expression>) -> Expression {
    Expression::Call(FunctionCall {
        name: name.into(),
        args,
        distinct: false,
    })
}

fn unary(name: &'static str, arg: impl Into<Expression>) -> Expression {
    call(name, vec![arg.into()])
}

/// `count(*)`
pub fn count_all() -> Expression {
    unary("count", Operand::Asterisk)
}

pub fn count(arg: impl Into<Expression>) -> Expression {
    unary("count", arg)
}

pub fn count_distinct(arg: impl Into<Expression>) -> Expression {
    Expression::Call(FunctionCall {
        name: "count".into(),
        args: vec![arg.into()],
        distinct: true,
    })
}

pub fn sum(arg: impl Into<Expression>) -> Expression {
    unary("sum", arg)
}

pub fn avg(arg: impl Into<Expression>) -> Expression {
    unary("avg", arg)
}

pub fn min(arg: impl Into<Expression>) -> Expression {
    unary("min", arg)
}

pub fn max(arg: impl Into<Expression>) -> Expression {
    unary("max", arg)
}

pub fn lower(arg: impl Into<Expression>) -> Expression {
    unary("lower", arg)
}

pub fn upper(arg: impl Into<Expression>) -> Expression {
    unary("upper", arg)
}

pub fn length(arg: impl Into<Expression>) -> Expression {
    unary("length", arg)
}

pub fn coalesce(args: impl IntoIterator<Item = impl Into<Expression>>) -> Expression {
    call("coalesce", args.into_iter().map(Into::into).collect())
}

pub fn concat(args: impl IntoIterator<Item = impl Into<Expression>>) -> Expression {
    call("concat", args.into_iter().map(Into::into).collect())
}

/// Conjunction, `1 = 1` when empty.
pub fn and(list: impl IntoIterator<Item = Expression>) -> Expression {
    Expression::And(list.into_iter().collect())
}

/// Disjunction, `1 = 0` when empty.
pub fn or(list: impl IntoIterator<Item = Expression>) -> Expression {
    Expression::Or(list.into_iter().collect())
}

/// Negation pushed down to the leaves, see [`Expression::not`].
pub fn not(expression: Expression) -> Expression {
    expression.not()
}

pub fn exists(query: SubQuery) -> Expression {
    Expression::Exists {
        query: Box::new(query),
        negated: false,
    }
}

pub fn not_exists(query: SubQuery) -> Expression {
    Expression::Exists {
        query: Box::new(query),
        negated: true,
    }
}

pub fn lit_int(value: i64) -> Expression {
    Expression::Operand(Operand::LitInt(value))
}

pub fn lit_str(value: impl Into<Cow<'static, str>>) -> Expression {
    Expression::Operand(Operand::LitStr(value.into()))
}

pub fn lit_bool(value: bool) -> Expression {
    Expression::Operand(Operand::LitBool(value))
}

pub fn null() -> Expression {
    Expression::Operand(Operand::Null)
}
