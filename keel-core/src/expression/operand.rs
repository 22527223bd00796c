use crate::{AsProp, ImmutableProp, ImmutableType, OpPrecedence, PropKey, Result, Schema, Table, Value, writer::SqlWriter};
use std::borrow::Cow;

/// Prop named either by key or by name, resolved when the statement is rendered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropRef {
    Key(PropKey),
    Name(String),
}

impl From<&str> for PropRef {
    fn from(value: &str) -> Self {
        PropRef::Name(value.into())
    }
}

impl From<String> for PropRef {
    fn from(value: String) -> Self {
        PropRef::Name(value)
    }
}

impl From<PropKey> for PropRef {
    fn from(value: PropKey) -> Self {
        PropRef::Key(value)
    }
}

impl From<&ImmutableProp> for PropRef {
    fn from(value: &ImmutableProp) -> Self {
        PropRef::Key(value.key())
    }
}

impl AsProp for PropRef {
    fn resolve_prop<'s>(
        &self,
        schema: &'s Schema,
        ty: &'s ImmutableType,
    ) -> Result<&'s ImmutableProp> {
        match self {
            PropRef::Key(key) => key.resolve_prop(schema, ty),
            PropRef::Name(name) => name.as_str().resolve_prop(schema, ty),
        }
    }
}

impl AsProp for &PropRef {
    fn resolve_prop<'s>(
        &self,
        schema: &'s Schema,
        ty: &'s ImmutableType,
    ) -> Result<&'s ImmutableProp> {
        (*self).resolve_prop(schema, ty)
    }
}

/// Prop of a table handle used as a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub table: Table,
    pub prop: PropRef,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    LitBool(bool),
    LitInt(i64),
    LitFloat(f64),
    LitStr(Cow<'static, str>),
    Null,
    Asterisk,
    /// Bound as a statement variable, never inlined.
    Variable(Value),
    Column(ColumnRef),
}

impl OpPrecedence for Operand {
    fn precedence(&self, _writer: &dyn SqlWriter) -> i32 {
        1_000_000_000
    }
}
