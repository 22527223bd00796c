use crate::{
    ColumnRef, OrmError, RenderPlan, Result, Schema, TableGraph, Value, truncate_long,
    writer::{Context, Fragment, SqlWriter},
};
use std::fmt::{self, Display, Formatter};

/// Sql text together with the variables bound to its placeholders, in placeholder order.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub variables: Vec<Value>,
}

impl Statement {
    pub fn is_select(&self) -> bool {
        self.sql
            .trim_start()
            .get(..6)
            .is_some_and(|v| v.eq_ignore_ascii_case("select"))
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", truncate_long!(self.sql))
    }
}

/// Accumulates the text and the variables of one statement.
///
/// Every variable goes through [`SqlBuilder::variable`], which appends the dialect placeholder
/// at the same time, so the variable list cannot drift from the text.
pub struct SqlBuilder<'a> {
    writer: &'a dyn SqlWriter,
    schema: &'a Schema,
    tables: Option<(&'a TableGraph, &'a RenderPlan)>,
    sql: String,
    variables: Vec<Value>,
    pub context: Context,
}

impl<'a> SqlBuilder<'a> {
    pub fn new(writer: &'a dyn SqlWriter, schema: &'a Schema) -> Self {
        Self {
            writer,
            schema,
            tables: None,
            sql: String::with_capacity(128),
            variables: Vec::new(),
            context: Context::default(),
        }
    }

    /// Builder for a query over `graph`, columns are resolved through `plan`.
    pub fn with_tables(mut self, graph: &'a TableGraph, plan: &'a RenderPlan) -> Self {
        self.tables = Some((graph, plan));
        self
    }

    pub fn writer(&self) -> &'a dyn SqlWriter {
        self.writer
    }

    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    pub fn tables(&self) -> Result<(&'a TableGraph, &'a RenderPlan)> {
        self.tables
            .ok_or_else(|| OrmError::invalid_path("tables cannot be used outside of a query"))
    }

    pub fn sql(&mut self, text: &str) -> &mut Self {
        self.sql.push_str(text);
        self
    }

    /// Raw access to the text, for dialects writing numbers and literals.
    pub fn out(&mut self) -> &mut String {
        &mut self.sql
    }

    pub fn variable(&mut self, value: Value) -> &mut Self {
        self.variables.push(value);
        self.writer
            .write_placeholder(&mut self.sql, self.variables.len());
        self
    }

    pub fn identifier(&mut self, name: &str) -> &mut Self {
        self.writer.write_identifier(&mut self.sql, name);
        self
    }

    /// Writes `alias.COLUMN`.
    pub fn qualified(&mut self, alias: &str, column: &str) -> &mut Self {
        self.sql.push_str(alias);
        self.sql.push('.');
        self.identifier(column)
    }

    pub fn column(&mut self, column: &ColumnRef) -> Result<&mut Self> {
        let (graph, plan) = self.tables()?;
        let (alias, name) = plan.column(self.schema, graph, column, self.context.scope)?;
        Ok(self.qualified(alias, name))
    }

    pub fn clause_separator(&self) -> &'static str {
        self.context.clause_separator()
    }

    /// Runs `f` with `context`, the previous one is restored afterwards.
    pub fn with_context<R>(&mut self, context: Context, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = self.context;
        self.context = context;
        let result = f(self);
        self.context = previous;
        result
    }

    pub fn with_fragment<R>(&mut self, fragment: Fragment, f: impl FnOnce(&mut Self) -> R) -> R {
        let context = Context {
            fragment,
            ..self.context
        };
        self.with_context(context, f)
    }

    pub fn separated<T>(
        &mut self,
        items: impl IntoIterator<Item = T>,
        separator: &str,
        mut f: impl FnMut(&mut Self, T) -> Result<()>,
    ) -> Result<()> {
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                self.sql.push_str(separator);
            }
            f(self, item)?;
        }
        Ok(())
    }

    pub fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            variables: self.variables,
        }
    }
}
