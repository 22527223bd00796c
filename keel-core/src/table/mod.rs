mod graph;
mod plan;

pub use graph::*;
pub use plan::*;

use crate::{ColumnRef, Expression, Operand, PropRef, TypeKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub(crate) u32);

impl TableId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Root query or sub-query owning a set of tables.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub(crate) u32);

impl ScopeId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Handle to a table of one statement, obtained from its [`TableGraph`].
///
/// Handles are plain copies, two handles are equal when they point to the same node of the
/// same graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Table {
    pub(crate) graph: u32,
    pub(crate) id: TableId,
    pub(crate) ty: TypeKey,
}

impl Table {
    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn type_key(&self) -> TypeKey {
        self.ty
    }

    /// Column expression for a prop of this table.
    pub fn get(&self, prop: impl Into<PropRef>) -> Expression {
        Expression::Operand(Operand::Column(self.column(prop)))
    }

    pub fn column(&self, prop: impl Into<PropRef>) -> ColumnRef {
        ColumnRef {
            table: *self,
            prop: prop.into(),
        }
    }
}
