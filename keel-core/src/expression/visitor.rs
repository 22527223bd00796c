use crate::{ColumnRef, Expression, Result, SubQuery, Table};

/// Pre-order traversal of an expression tree, sub-queries included.
///
/// Every method defaults to doing nothing, implementors pick the nodes they care about.
pub trait AstVisitor {
    fn visit_expression(&mut self, _expression: &Expression) -> Result<()> {
        Ok(())
    }
    fn visit_column(&mut self, _column: &ColumnRef) -> Result<()> {
        Ok(())
    }
    /// Called before the sub-query parts are traversed.
    fn visit_sub_query(&mut self, _query: &SubQuery) -> Result<()> {
        Ok(())
    }
    /// Table selected as a whole entity.
    fn visit_entity(&mut self, _table: Table) -> Result<()> {
        Ok(())
    }
}
