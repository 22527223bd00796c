use crate::ScopeId;

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fragment {
    #[default]
    None,
    SqlDeleteFrom,
    SqlInsertInto,
    SqlInsertIntoValues,
    SqlJoin,
    SqlSelect,
    SqlSelectFrom,
    SqlSelectGroupBy,
    SqlSelectHaving,
    SqlSelectOrderBy,
    SqlSelectWhere,
    SqlUpdate,
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    pub fragment: Fragment,
    /// Inside a sub-query, clauses are separated by spaces instead of new lines.
    pub nested: bool,
    /// Query whose tables are visible.
    pub scope: ScopeId,
}

impl Context {
    pub fn new(fragment: Fragment, scope: ScopeId) -> Self {
        Self {
            fragment,
            nested: false,
            scope,
        }
    }

    pub fn clause_separator(&self) -> &'static str {
        if self.nested { " " } else { "\n" }
    }
}
