use crate::Expression;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    ASC,
    DESC,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

/// Expression of an `order by` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Ordered {
    pub expression: Expression,
    pub order: Order,
    pub nulls: Option<NullsOrder>,
}

impl Ordered {
    pub fn nulls_first(mut self) -> Self {
        self.nulls = Some(NullsOrder::First);
        self
    }
    pub fn nulls_last(mut self) -> Self {
        self.nulls = Some(NullsOrder::Last);
        self
    }
}

impl From<Expression> for Ordered {
    fn from(expression: Expression) -> Self {
        Ordered {
            expression,
            order: Order::ASC,
            nulls: None,
        }
    }
}
