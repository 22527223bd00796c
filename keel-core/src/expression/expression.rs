use crate::{
    AsValue, AstVisitor, BinaryOp, BinaryOpType, ColumnRef, FunctionCall, Operand, Order,
    Ordered, Result, SubQuery, UnaryOp, UnaryOpType, Value, writer::SqlBuilder,
};

/// Node of the typed expression tree.
///
/// The set of nodes is closed: dialects customize how each variant is written through
/// [`crate::SqlWriter`], never by adding variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Operand(Operand),
    Unary(UnaryOp),
    Binary(BinaryOp),
    /// Conjunction, renders `1 = 1` when empty.
    And(Vec<Expression>),
    /// Disjunction, renders `1 = 0` when empty.
    Or(Vec<Expression>),
    Not(Box<Expression>),
    Call(FunctionCall),
    IsNull {
        arg: Box<Expression>,
        negated: bool,
    },
    Like {
        arg: Box<Expression>,
        pattern: Box<Expression>,
        negated: bool,
        insensitive: bool,
    },
    /// Renders `1 = 0` (or `1 = 1` when negated) for an empty list.
    InList {
        arg: Box<Expression>,
        list: Vec<Expression>,
        negated: bool,
    },
    InSubQuery {
        arg: Box<Expression>,
        query: Box<SubQuery>,
        negated: bool,
    },
    Exists {
        query: Box<SubQuery>,
        negated: bool,
    },
    /// Scalar sub-query.
    SubQuery(Box<SubQuery>),
}

impl Expression {
    fn binary(self, op: BinaryOpType, rhs: impl Into<Expression>) -> Expression {
        Expression::Binary(BinaryOp {
            op,
            lhs: Box::new(self),
            rhs: Box::new(rhs.into()),
        })
    }

    fn is_null_operand(&self) -> bool {
        match self {
            Expression::Operand(Operand::Null) => true,
            Expression::Operand(Operand::Variable(v)) => v.is_null(),
            _ => false,
        }
    }

    /// Comparing with null becomes `is null`.
    pub fn eq(self, rhs: impl Into<Expression>) -> Expression {
        let rhs = rhs.into();
        if rhs.is_null_operand() {
            return self.is_null();
        }
        self.binary(BinaryOpType::Equal, rhs)
    }

    /// Comparing with null becomes `is not null`.
    pub fn ne(self, rhs: impl Into<Expression>) -> Expression {
        let rhs = rhs.into();
        if rhs.is_null_operand() {
            return self.is_not_null();
        }
        self.binary(BinaryOpType::NotEqual, rhs)
    }

    pub fn lt(self, rhs: impl Into<Expression>) -> Expression {
        self.binary(BinaryOpType::Less, rhs)
    }

    pub fn le(self, rhs: impl Into<Expression>) -> Expression {
        self.binary(BinaryOpType::LessEqual, rhs)
    }

    pub fn gt(self, rhs: impl Into<Expression>) -> Expression {
        self.binary(BinaryOpType::Greater, rhs)
    }

    pub fn ge(self, rhs: impl Into<Expression>) -> Expression {
        self.binary(BinaryOpType::GreaterEqual, rhs)
    }

    pub fn add(self, rhs: impl Into<Expression>) -> Expression {
        self.binary(BinaryOpType::Addition, rhs)
    }

    pub fn sub(self, rhs: impl Into<Expression>) -> Expression {
        self.binary(BinaryOpType::Subtraction, rhs)
    }

    pub fn mul(self, rhs: impl Into<Expression>) -> Expression {
        self.binary(BinaryOpType::Multiplication, rhs)
    }

    pub fn div(self, rhs: impl Into<Expression>) -> Expression {
        self.binary(BinaryOpType::Division, rhs)
    }

    pub fn rem(self, rhs: impl Into<Expression>) -> Expression {
        self.binary(BinaryOpType::Remainder, rhs)
    }

    pub fn neg(self) -> Expression {
        Expression::Unary(UnaryOp {
            op: UnaryOpType::Negative,
            arg: Box::new(self),
        })
    }

    fn like_impl(self, pattern: impl Into<Expression>, negated: bool, insensitive: bool) -> Expression {
        Expression::Like {
            arg: Box::new(self),
            pattern: Box::new(pattern.into()),
            negated,
            insensitive,
        }
    }

    pub fn like(self, pattern: impl Into<Expression>) -> Expression {
        self.like_impl(pattern, false, false)
    }

    pub fn not_like(self, pattern: impl Into<Expression>) -> Expression {
        self.like_impl(pattern, true, false)
    }

    /// Case insensitive `like`, native where the dialect has it.
    pub fn ilike(self, pattern: impl Into<Expression>) -> Expression {
        self.like_impl(pattern, false, true)
    }

    pub fn is_null(self) -> Expression {
        Expression::IsNull {
            arg: Box::new(self),
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Expression {
        Expression::IsNull {
            arg: Box::new(self),
            negated: true,
        }
    }

    pub fn in_list<T: Into<Expression>>(self, list: impl IntoIterator<Item = T>) -> Expression {
        Expression::InList {
            arg: Box::new(self),
            list: list.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn not_in_list<T: Into<Expression>>(self, list: impl IntoIterator<Item = T>) -> Expression {
        Expression::InList {
            arg: Box::new(self),
            list: list.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    pub fn in_sub_query(self, query: SubQuery) -> Expression {
        Expression::InSubQuery {
            arg: Box::new(self),
            query: Box::new(query),
            negated: false,
        }
    }

    pub fn not_in_sub_query(self, query: SubQuery) -> Expression {
        Expression::InSubQuery {
            arg: Box::new(self),
            query: Box::new(query),
            negated: true,
        }
    }

    /// Appends to a conjunction instead of nesting one.
    pub fn and(self, rhs: Expression) -> Expression {
        match self {
            Expression::And(mut list) => {
                list.push(rhs);
                Expression::And(list)
            }
            lhs => Expression::And(vec![lhs, rhs]),
        }
    }

    /// Appends to a disjunction instead of nesting one.
    pub fn or(self, rhs: Expression) -> Expression {
        match self {
            Expression::Or(mut list) => {
                list.push(rhs);
                Expression::Or(list)
            }
            lhs => Expression::Or(vec![lhs, rhs]),
        }
    }

    /// Negation pushed towards the leaves.
    ///
    /// Conjunctions and disjunctions swap by De Morgan's laws, `not` unwraps, comparisons flip
    /// their operator and the negatable predicates flip their flag. Anything else is wrapped.
    pub fn not(self) -> Expression {
        match self {
            Expression::And(list) => Expression::Or(list.into_iter().map(Expression::not).collect()),
            Expression::Or(list) => Expression::And(list.into_iter().map(Expression::not).collect()),
            Expression::Not(inner) => *inner,
            Expression::Binary(BinaryOp { op, lhs, rhs }) if op.is_comparison() => {
                Expression::Binary(BinaryOp {
                    op: op.negated().unwrap_or(op),
                    lhs,
                    rhs,
                })
            }
            Expression::IsNull { arg, negated } => Expression::IsNull {
                arg,
                negated: !negated,
            },
            Expression::Like {
                arg,
                pattern,
                negated,
                insensitive,
            } => Expression::Like {
                arg,
                pattern,
                negated: !negated,
                insensitive,
            },
            Expression::InList { arg, list, negated } => Expression::InList {
                arg,
                list,
                negated: !negated,
            },
            Expression::InSubQuery {
                arg,
                query,
                negated,
            } => Expression::InSubQuery {
                arg,
                query,
                negated: !negated,
            },
            Expression::Exists { query, negated } => Expression::Exists {
                query,
                negated: !negated,
            },
            other => Expression::Not(Box::new(other)),
        }
    }

    pub fn asc(self) -> Ordered {
        Ordered {
            expression: self,
            order: Order::ASC,
            nulls: None,
        }
    }

    pub fn desc(self) -> Ordered {
        Ordered {
            expression: self,
            order: Order::DESC,
            nulls: None,
        }
    }

    /// Pre-order traversal, descending into sub-queries.
    pub fn accept(&self, visitor: &mut dyn AstVisitor) -> Result<()> {
        visitor.visit_expression(self)?;
        match self {
            Expression::Operand(Operand::Column(column)) => visitor.visit_column(column),
            Expression::Operand(..) => Ok(()),
            Expression::Unary(v) => v.arg.accept(visitor),
            Expression::Binary(v) => {
                v.lhs.accept(visitor)?;
                v.rhs.accept(visitor)
            }
            Expression::And(list) | Expression::Or(list) => {
                list.iter().try_for_each(|v| v.accept(visitor))
            }
            Expression::Not(v) => v.accept(visitor),
            Expression::Call(call) => call.args.iter().try_for_each(|v| v.accept(visitor)),
            Expression::IsNull { arg, .. } => arg.accept(visitor),
            Expression::Like { arg, pattern, .. } => {
                arg.accept(visitor)?;
                pattern.accept(visitor)
            }
            Expression::InList { arg, list, .. } => {
                arg.accept(visitor)?;
                list.iter().try_for_each(|v| v.accept(visitor))
            }
            Expression::InSubQuery { arg, query, .. } => {
                arg.accept(visitor)?;
                query.accept(visitor)
            }
            Expression::Exists { query, .. } | Expression::SubQuery(query) => {
                query.accept(visitor)
            }
        }
    }

    /// Writes the expression through the dialect of the builder.
    pub fn render_to(&self, builder: &mut SqlBuilder<'_>) -> Result<()> {
        let writer = builder.writer();
        writer.write_expression(builder, self)
    }
}

impl<T: AsValue> From<T> for Expression {
    fn from(value: T) -> Self {
        Expression::Operand(Operand::Variable(value.as_value()))
    }
}

impl From<&str> for Expression {
    fn from(value: &str) -> Self {
        Expression::Operand(Operand::Variable(value.into()))
    }
}

impl From<Value> for Expression {
    fn from(value: Value) -> Self {
        Expression::Operand(Operand::Variable(value))
    }
}

impl From<Operand> for Expression {
    fn from(value: Operand) -> Self {
        Expression::Operand(value)
    }
}

impl From<ColumnRef> for Expression {
    fn from(value: ColumnRef) -> Self {
        Expression::Operand(Operand::Column(value))
    }
}

impl From<SubQuery> for Expression {
    fn from(value: SubQuery) -> Self {
        Expression::SubQuery(Box::new(value))
    }
}

impl From<FunctionCall> for Expression {
    fn from(value: FunctionCall) -> Self {
        Expression::Call(value)
    }
}
