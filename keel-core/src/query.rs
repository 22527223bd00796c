use crate::{
    AsProp, AsType, AstVisitor, Driver, Entity, Executor, Expression, Fetcher, FromRow, JoinType,
    Ordered, OrmError, RenderPlan, Result, RowLayout, Schema, Table, TableGraph, count_all,
    row::decode_entity,
    stream::TryStreamExt,
    writer::{SqlBuilder, SqlWriter, Statement},
};
use std::borrow::Cow;

/// Item of the `select` list.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Expression(Expression),
    /// Every column of the table, read back as an [`crate::Entity`].
    Entity(Table),
}

impl From<Expression> for Projection {
    fn from(value: Expression) -> Self {
        Projection::Expression(value)
    }
}

/// Clauses of a select statement, shared by top level queries and sub-queries.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParts {
    pub root: Table,
    pub projections: Vec<Projection>,
    pub filters: Vec<Expression>,
    pub group_by: Vec<Expression>,
    pub having: Vec<Expression>,
    pub order_by: Vec<Ordered>,
    pub distinct: bool,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl QueryParts {
    pub fn new(root: Table) -> Self {
        Self {
            root,
            projections: Vec::new(),
            filters: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            order_by: Vec::new(),
            distinct: false,
            limit: None,
            offset: None,
        }
    }

    pub fn accept(&self, visitor: &mut dyn AstVisitor) -> Result<()> {
        for projection in &self.projections {
            match projection {
                Projection::Expression(v) => v.accept(visitor)?,
                Projection::Entity(table) => visitor.visit_entity(*table)?,
            }
        }
        for expression in self
            .filters
            .iter()
            .chain(&self.group_by)
            .chain(&self.having)
            .chain(self.order_by.iter().map(|v| &v.expression))
        {
            expression.accept(visitor)?;
        }
        Ok(())
    }
}

/// Nested select, its tables live in the graph of the enclosing [`SelectQuery`].
///
/// Created by [`SelectQuery::sub_query`], joins of the sub-query go through the enclosing
/// query as well: `query.join(sub.root(), "store")`.
#[derive(Debug, Clone, PartialEq)]
pub struct SubQuery {
    pub parts: QueryParts,
}

impl SubQuery {
    pub fn root(&self) -> Table {
        self.parts.root
    }

    pub fn accept(&self, visitor: &mut dyn AstVisitor) -> Result<()> {
        visitor.visit_sub_query(self)?;
        self.parts.accept(visitor)
    }

    pub fn filter(mut self, condition: Expression) -> Self {
        self.parts.filters.push(condition);
        self
    }

    pub fn select(mut self, expression: impl Into<Expression>) -> Self {
        self.parts
            .projections
            .push(Projection::Expression(expression.into()));
        self
    }

    pub fn group_by(mut self, expression: impl Into<Expression>) -> Self {
        self.parts.group_by.push(expression.into());
        self
    }

    pub fn having(mut self, condition: Expression) -> Self {
        self.parts.having.push(condition);
        self
    }

    pub fn order_by(mut self, ordered: impl Into<Ordered>) -> Self {
        self.parts.order_by.push(ordered.into());
        self
    }

    pub fn distinct(mut self) -> Self {
        self.parts.distinct = true;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.parts.limit = Some(limit);
        self
    }
}

/// Select statement under construction.
///
/// The query owns the [`TableGraph`] of the statement: every join requested through it is
/// resolved against that graph only, so two queries never share table handles.
#[derive(Debug)]
pub struct SelectQuery<'s> {
    schema: &'s Schema,
    graph: TableGraph,
    parts: QueryParts,
    log_statements: bool,
}

impl<'s> SelectQuery<'s> {
    pub fn new(schema: &'s Schema, ty: impl AsType) -> Result<Self> {
        let mut graph = TableGraph::new();
        let root = graph.add_root(schema, ty, None)?;
        Ok(Self {
            schema,
            graph,
            parts: QueryParts::new(root),
            log_statements: true,
        })
    }

    pub fn schema(&self) -> &'s Schema {
        self.schema
    }

    pub fn root(&self) -> Table {
        self.parts.root
    }

    pub fn graph(&self) -> &TableGraph {
        &self.graph
    }

    pub fn parts(&self) -> &QueryParts {
        &self.parts
    }

    /// Whether executed statements are written to the debug log.
    pub fn log_statements(&mut self, value: bool) -> &mut Self {
        self.log_statements = value;
        self
    }

    pub fn join(&mut self, table: Table, prop: impl AsProp) -> Result<Table> {
        self.graph.join(self.schema, table, prop)
    }

    pub fn outer_join(&mut self, table: Table, prop: impl AsProp) -> Result<Table> {
        self.graph.outer_join(self.schema, table, prop)
    }

    pub fn inverse_join(
        &mut self,
        table: Table,
        target: impl AsType,
        back_prop: impl AsProp,
    ) -> Result<Table> {
        self.graph.inverse_join(self.schema, table, target, back_prop)
    }

    pub fn inverse_outer_join(
        &mut self,
        table: Table,
        target: impl AsType,
        back_prop: impl AsProp,
    ) -> Result<Table> {
        self.graph
            .inverse_outer_join(self.schema, table, target, back_prop)
    }

    pub fn join_path<P: AsProp>(
        &mut self,
        table: Table,
        path: impl IntoIterator<Item = P>,
    ) -> Result<Table> {
        self.graph
            .join_path(self.schema, table, path, JoinType::Inner)
    }

    pub fn outer_join_path<P: AsProp>(
        &mut self,
        table: Table,
        path: impl IntoIterator<Item = P>,
    ) -> Result<Table> {
        self.graph
            .join_path(self.schema, table, path, JoinType::Left)
    }

    /// Sub-query nested in the top level query.
    pub fn sub_query(&mut self, ty: impl AsType) -> Result<SubQuery> {
        let outer = self.parts.root;
        self.nested_sub_query(outer, ty)
    }

    /// Sub-query nested in the query owning `outer`, its tables can refer to `outer`'s scope.
    pub fn nested_sub_query(&mut self, outer: Table, ty: impl AsType) -> Result<SubQuery> {
        let scope = self.graph.node(outer)?.scope();
        let root = self.graph.add_root(self.schema, ty, Some(scope))?;
        Ok(SubQuery {
            parts: QueryParts::new(root),
        })
    }

    pub fn filter(&mut self, condition: Expression) -> &mut Self {
        self.parts.filters.push(condition);
        self
    }

    pub fn order_by(&mut self, ordered: impl Into<Ordered>) -> &mut Self {
        self.parts.order_by.push(ordered.into());
        self
    }

    pub fn group_by(&mut self, expression: impl Into<Expression>) -> &mut Self {
        self.parts.group_by.push(expression.into());
        self
    }

    pub fn having(&mut self, condition: Expression) -> &mut Self {
        self.parts.having.push(condition);
        self
    }

    pub fn select(&mut self, expression: impl Into<Expression>) -> &mut Self {
        self.parts
            .projections
            .push(Projection::Expression(expression.into()));
        self
    }

    /// Selects every column of `table`, read back as one entity.
    pub fn select_entity(&mut self, table: Table) -> &mut Self {
        self.parts.projections.push(Projection::Entity(table));
        self
    }

    pub fn distinct(&mut self) -> &mut Self {
        self.parts.distinct = true;
        self
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.parts.limit = Some(limit);
        self
    }

    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.parts.offset = Some(offset);
        self
    }

    /// Sql text and variables, plus the layout needed to decode its rows.
    ///
    /// With no projection the root entity is selected.
    pub fn render(&self, writer: &dyn SqlWriter) -> Result<(Statement, RowLayout)> {
        let parts = if self.parts.projections.is_empty() {
            let mut parts = self.parts.clone();
            parts.projections.push(Projection::Entity(parts.root));
            Cow::Owned(parts)
        } else {
            Cow::Borrowed(&self.parts)
        };
        self.render_parts(writer, &parts)
    }

    fn render_parts(
        &self,
        writer: &dyn SqlWriter,
        parts: &QueryParts,
    ) -> Result<(Statement, RowLayout)> {
        let plan = RenderPlan::new(self.schema, &self.graph, parts)?;
        let mut builder = SqlBuilder::new(writer, self.schema).with_tables(&self.graph, &plan);
        writer.write_select(&mut builder, parts)?;
        let layout = RowLayout::new(self.schema, &parts.projections)?;
        Ok((builder.finish(), layout))
    }

    /// `select count(*)` over the same tables and filters, ordering and pagination dropped.
    pub fn render_count(&self, writer: &dyn SqlWriter) -> Result<(Statement, RowLayout)> {
        if self.parts.distinct || !self.parts.group_by.is_empty() {
            return Err(OrmError::unsupported(
                "count of a distinct or grouped query",
            ));
        }
        let mut parts = self.parts.clone();
        parts.projections = vec![Projection::Expression(count_all())];
        parts.order_by.clear();
        parts.limit = None;
        parts.offset = None;
        self.render_parts(writer, &parts)
    }

    pub async fn fetch<T: FromRow, E: Executor>(&self, executor: &mut E) -> Result<Vec<T>> {
        let (statement, layout) = {
            let writer = executor.driver().sql_writer();
            self.render(writer.as_dyn())?
        };
        self.fetch_statement(executor, statement, &layout).await
    }

    /// Exactly one row, [`OrmError::UnexpectedRowCount`] otherwise.
    pub async fn fetch_one<T: FromRow, E: Executor>(&self, executor: &mut E) -> Result<T> {
        let mut rows = self.fetch::<T, E>(executor).await?;
        if rows.len() != 1 {
            return Err(OrmError::UnexpectedRowCount {
                expected: 1,
                actual: rows.len() as u64,
            }
            .into());
        }
        rows.pop()
            .ok_or_else(|| OrmError::mapping("the row vanished while decoding"))
    }

    /// At most one row.
    pub async fn fetch_optional<T: FromRow, E: Executor>(
        &self,
        executor: &mut E,
    ) -> Result<Option<T>> {
        let mut rows = self.fetch::<T, E>(executor).await?;
        if rows.len() > 1 {
            return Err(OrmError::UnexpectedRowCount {
                expected: 1,
                actual: rows.len() as u64,
            }
            .into());
        }
        Ok(rows.pop())
    }

    pub async fn count<E: Executor>(&self, executor: &mut E) -> Result<i64> {
        let (statement, layout) = {
            let writer = executor.driver().sql_writer();
            self.render_count(writer.as_dyn())?
        };
        let mut rows = self
            .fetch_statement::<i64, E>(executor, statement, &layout)
            .await?;
        rows.pop()
            .ok_or_else(|| OrmError::mapping("count returned no row"))
    }

    /// Root entities shaped by `fetcher`, its associations are loaded once the rows are read.
    pub async fn fetch_by<E: Executor>(
        &self,
        executor: &mut E,
        fetcher: &Fetcher<'_>,
    ) -> Result<Vec<Entity>> {
        let root = self.parts.root;
        if root.type_key() != fetcher.type_key() {
            return Err(OrmError::invalid_path(format!(
                "a fetcher of `{}` cannot shape the rows of `{}`",
                self.schema.ty(fetcher.type_key())?.name(),
                self.schema.ty(root.type_key())?.name()
            )));
        }
        let mut parts = self.parts.clone();
        parts.projections = fetcher
            .columns()
            .iter()
            .map(|key| Projection::Expression(root.get(*key)))
            .collect();
        let statement = {
            let writer = executor.driver().sql_writer();
            self.render_parts(writer.as_dyn(), &parts)?.0
        };
        if self.log_statements {
            log::debug!("{statement}\n{:?}", statement.variables);
        }
        let rows = executor.fetch(statement).try_collect::<Vec<_>>().await?;
        let mut entities = rows
            .into_iter()
            .map(|row| {
                decode_entity(
                    self.schema,
                    fetcher.type_key(),
                    fetcher.columns(),
                    row.values.into_vec(),
                )?
                .ok_or_else(|| OrmError::mapping("fetched a row without id"))
            })
            .collect::<Result<Vec<_>>>()?;
        fetcher.fill(executor, &mut entities).await?;
        Ok(entities)
    }

    async fn fetch_statement<T: FromRow, E: Executor>(
        &self,
        executor: &mut E,
        statement: Statement,
        layout: &RowLayout,
    ) -> Result<Vec<T>> {
        if self.log_statements {
            log::debug!("{statement}\n{:?}", statement.variables);
        }
        let rows = executor.fetch(statement).try_collect::<Vec<_>>().await?;
        rows.into_iter()
            .map(|row| T::from_row(layout.decode(self.schema, row.values)?))
            .collect()
    }
}
