use crate::{
    BinaryOp, BinaryOpType, Expression, FunctionCall, JoinEdge, JoinType, MiddleTable, NullsOrder,
    Operand, Order, Ordered, OrmError, Projection, QueryParts, Result, SubQuery, Table, UnaryOp,
    UnaryOpType, Value, is_plain_identifier, possibly_parenthesized,
    writer::{Context, Fragment, SqlBuilder},
};
use std::borrow::Cow;

macro_rules! write_integer {
    ($out:expr, $value:expr) => {{
        let mut buffer = itoa::Buffer::new();
        $out.push_str(buffer.format($value));
    }};
}

/// Dialect printer converting the expression tree and the statements of the client into sql.
///
/// Every method has a default rendering close to standard sql, dialects override the few that
/// differ.
pub trait SqlWriter: Send + Sync {
    fn as_dyn(&self) -> &dyn SqlWriter;

    /// Dialect name, used in error messages.
    fn name(&self) -> &'static str;

    /// Escape occurrences of `search` char with `replace` while copying into buffer.
    fn write_escaped(&self, out: &mut String, value: &str, search: char, replace: &str) {
        let mut position = 0;
        for (i, c) in value.char_indices() {
            if c == search {
                out.push_str(&value[position..i]);
                out.push_str(replace);
                position = i + 1;
            }
        }
        out.push_str(&value[position..]);
    }

    /// Plain names are written as they are, the others are quoted.
    fn write_identifier(&self, out: &mut String, value: &str) {
        if is_plain_identifier(value) {
            out.push_str(value);
        } else {
            self.write_identifier_quoted(out, value);
        }
    }

    /// Quote identifiers ("name") doubling inner quotes.
    fn write_identifier_quoted(&self, out: &mut String, value: &str) {
        out.push('"');
        self.write_escaped(out, value, '"', "\"\"");
        out.push('"');
    }

    /// Placeholder of the variable at 1-based `index`.
    fn write_placeholder(&self, out: &mut String, _index: usize) {
        out.push('?');
    }

    /// Name of the function to call in this dialect.
    fn map_function<'n>(&self, name: &'n str, _args: usize) -> Result<Cow<'n, str>> {
        Ok(Cow::Borrowed(name))
    }

    fn supports_ilike(&self) -> bool {
        false
    }

    fn supports_nulls_ordering(&self) -> bool {
        true
    }

    fn write_value_bool(&self, out: &mut String, value: bool) {
        out.push_str(["false", "true"][value as usize]);
    }

    /// Render and escape a string literal using single quotes.
    fn write_value_string(&self, out: &mut String, value: &str) {
        out.push('\'');
        self.write_escaped(out, value, '\'', "''");
        out.push('\'');
    }

    fn write_value_float(&self, out: &mut String, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(OrmError::unsupported(format!(
                "{} cannot write the literal {value}",
                self.name()
            )));
        }
        let mut buffer = ryu::Buffer::new();
        out.push_str(buffer.format(value));
        Ok(())
    }

    /// Precedence of a node, lower numbers bind weaker.
    fn expression_precedence(&self, value: &Expression) -> i32 {
        match value {
            Expression::Or(..) => 100,
            Expression::And(..) => 200,
            Expression::Not(..) => 250,
            Expression::Binary(v) => self.expression_binary_op_precedence(&v.op),
            Expression::IsNull { .. }
            | Expression::Like { .. }
            | Expression::InList { .. }
            | Expression::InSubQuery { .. } => 400,
            Expression::Unary(v) => self.expression_unary_op_precedence(&v.op),
            Expression::Operand(..)
            | Expression::Call(..)
            | Expression::Exists { .. }
            | Expression::SubQuery(..) => 1_000_000_000,
        }
    }

    /// Precedence table for unary operators.
    fn expression_unary_op_precedence(&self, value: &UnaryOpType) -> i32 {
        match value {
            UnaryOpType::Negative => 1250,
        }
    }

    /// Precedence table for binary operators.
    fn expression_binary_op_precedence(&self, value: &BinaryOpType) -> i32 {
        match value {
            BinaryOpType::Equal
            | BinaryOpType::NotEqual
            | BinaryOpType::Less
            | BinaryOpType::LessEqual
            | BinaryOpType::Greater
            | BinaryOpType::GreaterEqual => 300,
            BinaryOpType::Addition | BinaryOpType::Subtraction => 800,
            BinaryOpType::Multiplication | BinaryOpType::Division | BinaryOpType::Remainder => 900,
        }
    }

    fn write_expression(&self, b: &mut SqlBuilder<'_>, value: &Expression) -> Result<()> {
        match value {
            Expression::Operand(v) => self.write_expression_operand(b, v),
            Expression::Unary(v) => self.write_expression_unary_op(b, v),
            Expression::Binary(v) => self.write_expression_binary_op(b, v),
            Expression::And(v) => self.write_expression_composite(b, v, true),
            Expression::Or(v) => self.write_expression_composite(b, v, false),
            Expression::Not(v) => self.write_expression_not(b, v),
            Expression::Call(v) => self.write_expression_call(b, v),
            Expression::IsNull { arg, negated } => self.write_expression_is_null(b, arg, *negated),
            Expression::Like {
                arg,
                pattern,
                negated,
                insensitive,
            } => self.write_expression_like(b, arg, pattern, *negated, *insensitive),
            Expression::InList { arg, list, negated } => {
                self.write_expression_in_list(b, arg, list, *negated)
            }
            Expression::InSubQuery {
                arg,
                query,
                negated,
            } => self.write_expression_in_sub_query(b, arg, query, *negated),
            Expression::Exists { query, negated } => {
                self.write_expression_exists(b, query, *negated)
            }
            Expression::SubQuery(query) => {
                b.sql("(");
                self.write_sub_query(b, query)?;
                b.sql(")");
                Ok(())
            }
        }
    }

    /// Literals are written inline, variables become placeholders.
    fn write_expression_operand(&self, b: &mut SqlBuilder<'_>, value: &Operand) -> Result<()> {
        match value {
            Operand::LitBool(v) => self.write_value_bool(b.out(), *v),
            Operand::LitInt(v) => write_integer!(b.out(), *v),
            Operand::LitFloat(v) => self.write_value_float(b.out(), *v)?,
            Operand::LitStr(v) => self.write_value_string(b.out(), v),
            Operand::Null => {
                b.sql("null");
            }
            Operand::Asterisk => {
                b.sql("*");
            }
            Operand::Variable(v) => {
                b.variable(v.clone());
            }
            Operand::Column(v) => {
                b.column(v)?;
            }
        };
        Ok(())
    }

    fn write_expression_unary_op(&self, b: &mut SqlBuilder<'_>, value: &UnaryOp) -> Result<()> {
        match value.op {
            UnaryOpType::Negative => b.sql("-"),
        };
        // `--` opens a line comment
        let signed_literal = matches!(
            value.arg.as_ref(),
            Expression::Operand(Operand::LitInt(v)) if *v < 0
        ) || matches!(
            value.arg.as_ref(),
            Expression::Operand(Operand::LitFloat(v)) if v.is_sign_negative()
        );
        possibly_parenthesized!(
            b,
            signed_literal
                || self.expression_precedence(&value.arg)
                    <= self.expression_unary_op_precedence(&value.op),
            self.write_expression(b, &value.arg)?
        );
        Ok(())
    }

    fn write_expression_binary_op(&self, b: &mut SqlBuilder<'_>, value: &BinaryOp) -> Result<()> {
        let infix = match value.op {
            BinaryOpType::Equal => " = ",
            BinaryOpType::NotEqual => " <> ",
            BinaryOpType::Less => " < ",
            BinaryOpType::LessEqual => " <= ",
            BinaryOpType::Greater => " > ",
            BinaryOpType::GreaterEqual => " >= ",
            BinaryOpType::Addition => " + ",
            BinaryOpType::Subtraction => " - ",
            BinaryOpType::Multiplication => " * ",
            BinaryOpType::Division => " / ",
            BinaryOpType::Remainder => " % ",
        };
        let precedence = self.expression_binary_op_precedence(&value.op);
        possibly_parenthesized!(
            b,
            self.expression_precedence(&value.lhs) < precedence,
            self.write_expression(b, &value.lhs)?
        );
        b.sql(infix);
        possibly_parenthesized!(
            b,
            self.expression_precedence(&value.rhs) <= precedence,
            self.write_expression(b, &value.rhs)?
        );
        Ok(())
    }

    /// `and`/`or` list, a child is parenthesized only when it binds weaker than the list.
    fn write_expression_composite(
        &self,
        b: &mut SqlBuilder<'_>,
        value: &[Expression],
        and: bool,
    ) -> Result<()> {
        if value.is_empty() {
            b.sql(if and { "1 = 1" } else { "1 = 0" });
            return Ok(());
        }
        let precedence = if and { 200 } else { 100 };
        b.separated(value, if and { " and " } else { " or " }, |b, v| {
            possibly_parenthesized!(
                b,
                self.expression_precedence(v) < precedence,
                self.write_expression(b, v)?
            );
            Ok(())
        })
    }

    /// Anything but an atomic node is parenthesized after `not`.
    fn write_expression_not(&self, b: &mut SqlBuilder<'_>, value: &Expression) -> Result<()> {
        b.sql("not ");
        possibly_parenthesized!(
            b,
            self.expression_precedence(value) < 1_000_000_000,
            self.write_expression(b, value)?
        );
        Ok(())
    }

    fn write_expression_call(&self, b: &mut SqlBuilder<'_>, value: &FunctionCall) -> Result<()> {
        let name = self.map_function(&value.name, value.args.len())?;
        b.sql(&name);
        b.sql("(");
        if value.distinct {
            b.sql("distinct ");
        }
        b.separated(&value.args, ", ", |b, v| self.write_expression(b, v))?;
        b.sql(")");
        Ok(())
    }

    fn write_expression_is_null(
        &self,
        b: &mut SqlBuilder<'_>,
        arg: &Expression,
        negated: bool,
    ) -> Result<()> {
        possibly_parenthesized!(
            b,
            self.expression_precedence(arg) <= 400,
            self.write_expression(b, arg)?
        );
        b.sql(if negated { " is not null" } else { " is null" });
        Ok(())
    }

    /// Without native `ilike` both sides are lowered.
    fn write_expression_like(
        &self,
        b: &mut SqlBuilder<'_>,
        arg: &Expression,
        pattern: &Expression,
        negated: bool,
        insensitive: bool,
    ) -> Result<()> {
        let lowered = insensitive && !self.supports_ilike();
        self.write_like_operand(b, arg, lowered)?;
        b.sql(match (negated, insensitive && !lowered) {
            (false, false) => " like ",
            (true, false) => " not like ",
            (false, true) => " ilike ",
            (true, true) => " not ilike ",
        });
        self.write_like_operand(b, pattern, lowered)
    }

    fn write_like_operand(
        &self,
        b: &mut SqlBuilder<'_>,
        value: &Expression,
        lowered: bool,
    ) -> Result<()> {
        if lowered {
            let name = self.map_function("lower", 1)?;
            b.sql(&name);
            b.sql("(");
            self.write_expression(b, value)?;
            b.sql(")");
        } else {
            possibly_parenthesized!(
                b,
                self.expression_precedence(value) <= 400,
                self.write_expression(b, value)?
            );
        }
        Ok(())
    }

    fn write_expression_in_list(
        &self,
        b: &mut SqlBuilder<'_>,
        arg: &Expression,
        list: &[Expression],
        negated: bool,
    ) -> Result<()> {
        if list.is_empty() {
            b.sql(if negated { "1 = 1" } else { "1 = 0" });
            return Ok(());
        }
        possibly_parenthesized!(
            b,
            self.expression_precedence(arg) <= 400,
            self.write_expression(b, arg)?
        );
        b.sql(if negated { " not in (" } else { " in (" });
        b.separated(list, ", ", |b, v| self.write_expression(b, v))?;
        b.sql(")");
        Ok(())
    }

    fn write_expression_in_sub_query(
        &self,
        b: &mut SqlBuilder<'_>,
        arg: &Expression,
        query: &SubQuery,
        negated: bool,
    ) -> Result<()> {
        possibly_parenthesized!(
            b,
            self.expression_precedence(arg) <= 400,
            self.write_expression(b, arg)?
        );
        b.sql(if negated { " not in (" } else { " in (" });
        self.write_sub_query(b, query)?;
        b.sql(")");
        Ok(())
    }

    fn write_expression_exists(
        &self,
        b: &mut SqlBuilder<'_>,
        query: &SubQuery,
        negated: bool,
    ) -> Result<()> {
        b.sql(if negated { "not exists(" } else { "exists(" });
        self.write_sub_query(b, query)?;
        b.sql(")");
        Ok(())
    }

    /// Sub-queries are written on a single line and see the tables of the enclosing queries.
    fn write_sub_query(&self, b: &mut SqlBuilder<'_>, query: &SubQuery) -> Result<()> {
        let context = Context {
            nested: true,
            ..b.context
        };
        b.with_context(context, |b| self.write_select(b, &query.parts))
    }

    /// Ordered expression inside `order by`.
    fn write_ordered(&self, b: &mut SqlBuilder<'_>, value: &Ordered) -> Result<()> {
        self.write_expression(b, &value.expression)?;
        if b.context.fragment != Fragment::SqlSelectOrderBy {
            return Ok(());
        }
        b.sql(match value.order {
            Order::ASC => " asc",
            Order::DESC => " desc",
        });
        if let Some(nulls) = value.nulls {
            if !self.supports_nulls_ordering() {
                return Err(OrmError::unsupported(format!(
                    "{} does not support `nulls first` and `nulls last`",
                    self.name()
                )));
            }
            b.sql(match nulls {
                NullsOrder::First => " nulls first",
                NullsOrder::Last => " nulls last",
            });
        }
        Ok(())
    }

    fn write_join_type(&self, b: &mut SqlBuilder<'_>, join_type: JoinType) {
        b.sql(match join_type {
            JoinType::Inner => "inner join ",
            JoinType::Left => "left join ",
        });
    }

    /// `TABLE as alias`
    fn write_table(&self, b: &mut SqlBuilder<'_>, table: &str, alias: &str) {
        b.identifier(table);
        b.sql(" as ");
        b.sql(alias);
    }

    /// One join clause, `on` holds the `(alias, column)` pairs compared.
    fn write_join(
        &self,
        b: &mut SqlBuilder<'_>,
        join_type: JoinType,
        table: &str,
        alias: &str,
        on: [(&str, &str); 2],
    ) {
        let separator = b.clause_separator();
        b.sql(separator);
        self.write_join_type(b, join_type);
        self.write_table(b, table, alias);
        b.sql(" on ");
        b.qualified(on[0].0, on[0].1);
        b.sql(" = ");
        b.qualified(on[1].0, on[1].1);
    }

    /// Root table of the scope of `root` and every rendered join of that scope, in creation
    /// order.
    fn write_from(&self, b: &mut SqlBuilder<'_>, root: Table) -> Result<()> {
        let (graph, plan) = b.tables()?;
        let schema = b.schema();
        let scope = graph.node(root)?.scope();
        let missing = || OrmError::invalid_path("a joined table has no alias");
        for (id, node) in plan.scope_tables(graph, scope) {
            let ty = schema.ty(node.type_key())?;
            let (Some(parent), Some(edge)) = (node.parent(), node.edge()) else {
                self.write_table(b, ty.table_name(), plan.alias(id).ok_or_else(missing)?);
                continue;
            };
            let parent_alias = plan.alias(parent).ok_or_else(missing)?;
            let parent_id = graph
                .node_at(parent)
                .ok_or_else(missing)
                .and_then(|p| schema.ty(p.type_key()))?
                .id_prop()?
                .column_name()
                .unwrap_or_default();
            let id_column = ty.id_prop()?.column_name().unwrap_or_default();
            match edge {
                JoinEdge::Reference { fk } => {
                    let alias = plan.alias(id).ok_or_else(missing)?;
                    self.write_join(
                        b,
                        node.join_type(),
                        ty.table_name(),
                        alias,
                        [(parent_alias, fk.as_str()), (alias, id_column)],
                    );
                }
                JoinEdge::InverseReference { fk } => {
                    let alias = plan.alias(id).ok_or_else(missing)?;
                    self.write_join(
                        b,
                        node.join_type(),
                        ty.table_name(),
                        alias,
                        [(parent_alias, parent_id), (alias, fk.as_str())],
                    );
                }
                JoinEdge::ManyToMany { middle } => {
                    let middle_alias = plan.middle_alias(id).ok_or_else(missing)?;
                    self.write_join(
                        b,
                        node.join_type(),
                        &middle.table,
                        middle_alias,
                        [
                            (parent_alias, parent_id),
                            (middle_alias, middle.join_column.as_str()),
                        ],
                    );
                    if let Some(alias) = plan.alias(id) {
                        self.write_join(
                            b,
                            node.join_type(),
                            ty.table_name(),
                            alias,
                            [
                                (middle_alias, middle.target_column.as_str()),
                                (alias, id_column),
                            ],
                        );
                    }
                }
            }
        }
        Ok(())
    }

    fn write_projection(&self, b: &mut SqlBuilder<'_>, value: &Projection) -> Result<()> {
        match value {
            Projection::Expression(v) => self.write_expression(b, v),
            Projection::Entity(table) => {
                let ty = b.schema().ty(table.type_key())?;
                b.separated(ty.column_props(), ", ", |b, prop| {
                    b.column(&table.column(prop.key()))?;
                    Ok(())
                })
            }
        }
    }

    /// Select statement, clauses in the standard order.
    fn write_select(&self, b: &mut SqlBuilder<'_>, parts: &QueryParts) -> Result<()> {
        let (graph, _) = b.tables()?;
        let context = Context {
            scope: graph.node(parts.root)?.scope(),
            ..b.context
        };
        b.with_context(context, |b| {
            let separator = b.clause_separator();
            b.with_fragment(Fragment::SqlSelect, |b| {
                b.sql("select ");
                if parts.distinct {
                    b.sql("distinct ");
                }
                if parts.projections.is_empty() {
                    b.sql("1");
                    return Ok(());
                }
                b.separated(&parts.projections, ", ", |b, v| self.write_projection(b, v))
            })?;
            b.sql(separator);
            b.sql("from ");
            b.with_fragment(Fragment::SqlSelectFrom, |b| self.write_from(b, parts.root))?;
            if !parts.filters.is_empty() {
                b.sql(separator);
                b.sql("where ");
                b.with_fragment(Fragment::SqlSelectWhere, |b| {
                    self.write_expression_composite(b, &parts.filters, true)
                })?;
            }
            if !parts.group_by.is_empty() {
                b.sql(separator);
                b.sql("group by ");
                b.with_fragment(Fragment::SqlSelectGroupBy, |b| {
                    b.separated(&parts.group_by, ", ", |b, v| self.write_expression(b, v))
                })?;
            }
            if !parts.having.is_empty() {
                b.sql(separator);
                b.sql("having ");
                b.with_fragment(Fragment::SqlSelectHaving, |b| {
                    self.write_expression_composite(b, &parts.having, true)
                })?;
            }
            if !parts.order_by.is_empty() {
                b.sql(separator);
                b.sql("order by ");
                b.with_fragment(Fragment::SqlSelectOrderBy, |b| {
                    b.separated(&parts.order_by, ", ", |b, v| self.write_ordered(b, v))
                })?;
            }
            self.write_pagination(b, parts.limit, parts.offset)
        })
    }

    /// `limit ? offset ?`, both bound as variables.
    fn write_pagination(
        &self,
        b: &mut SqlBuilder<'_>,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<()> {
        if limit.is_none() && offset.is_none() {
            return Ok(());
        }
        let separator = b.clause_separator();
        b.sql(separator);
        if let Some(limit) = limit {
            b.sql("limit ");
            b.variable(pagination_value(limit));
        }
        if let Some(offset) = offset {
            if limit.is_some() {
                b.sql(" ");
            }
            b.sql("offset ");
            b.variable(pagination_value(offset));
        }
        Ok(())
    }

    fn write_insert(
        &self,
        b: &mut SqlBuilder<'_>,
        table: &str,
        columns: &[(&str, Value)],
    ) -> Result<()> {
        b.with_fragment(Fragment::SqlInsertInto, |b| {
            b.sql("insert into ");
            b.identifier(table);
            b.sql("(");
            b.separated(columns, ", ", |b, (name, _)| {
                b.identifier(name);
                Ok(())
            })?;
            b.sql(") values(");
            b.with_fragment(Fragment::SqlInsertIntoValues, |b| {
                b.separated(columns, ", ", |b, (_, value)| {
                    b.variable(value.clone());
                    Ok(())
                })
            })?;
            b.sql(")");
            Ok(())
        })
    }

    fn write_update(
        &self,
        b: &mut SqlBuilder<'_>,
        table: &str,
        columns: &[(&str, Value)],
        id_column: &str,
        id: &Value,
    ) -> Result<()> {
        if columns.is_empty() {
            return Err(OrmError::invalid_draft(format!(
                "nothing to update in `{table}`"
            )));
        }
        b.with_fragment(Fragment::SqlUpdate, |b| {
            b.sql("update ");
            b.identifier(table);
            b.sql(" set ");
            b.separated(columns, ", ", |b, (name, value)| {
                b.identifier(name);
                b.sql(" = ");
                b.variable(value.clone());
                Ok(())
            })?;
            b.sql(" where ");
            b.identifier(id_column);
            b.sql(" = ");
            b.variable(id.clone());
            Ok(())
        })
    }

    fn write_delete(
        &self,
        b: &mut SqlBuilder<'_>,
        table: &str,
        id_column: &str,
        ids: &[Value],
    ) -> Result<()> {
        b.with_fragment(Fragment::SqlDeleteFrom, |b| {
            b.sql("delete from ");
            b.identifier(table);
            b.sql(" where ");
            self.write_in_values(b, id_column, ids);
            Ok(())
        })
    }

    /// `COLUMN in (?, ?)`, `1 = 0` when there is no value.
    fn write_in_values(&self, b: &mut SqlBuilder<'_>, column: &str, values: &[Value]) {
        if values.is_empty() {
            b.sql("1 = 0");
            return;
        }
        b.identifier(column);
        b.sql(" in (");
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                b.sql(", ");
            }
            b.variable(value.clone());
        }
        b.sql(")");
    }

    /// `(JOIN_COLUMN, TARGET_COLUMN) in ((?, ?), (?, ?))`
    fn write_in_pairs(&self, b: &mut SqlBuilder<'_>, middle: &MiddleTable, pairs: &[(Value, Value)]) {
        if pairs.is_empty() {
            b.sql("1 = 0");
            return;
        }
        b.sql("(");
        b.identifier(&middle.join_column);
        b.sql(", ");
        b.identifier(&middle.target_column);
        b.sql(") in (");
        for (i, (source, target)) in pairs.iter().enumerate() {
            if i > 0 {
                b.sql(", ");
            }
            b.sql("(");
            b.variable(source.clone());
            b.sql(", ");
            b.variable(target.clone());
            b.sql(")");
        }
        b.sql(")");
    }

    fn write_middle_insert(
        &self,
        b: &mut SqlBuilder<'_>,
        middle: &MiddleTable,
        pairs: &[(Value, Value)],
    ) -> Result<()> {
        if pairs.is_empty() {
            return Err(OrmError::invalid_path(format!(
                "no row to insert into `{}`",
                middle.table
            )));
        }
        b.with_fragment(Fragment::SqlInsertInto, |b| {
            b.sql("insert into ");
            b.identifier(&middle.table);
            b.sql("(");
            b.identifier(&middle.join_column);
            b.sql(", ");
            b.identifier(&middle.target_column);
            b.sql(") values");
            for (i, (source, target)) in pairs.iter().enumerate() {
                b.sql(if i > 0 { ", (" } else { "(" });
                b.variable(source.clone());
                b.sql(", ");
                b.variable(target.clone());
                b.sql(")");
            }
            Ok(())
        })
    }

    fn write_middle_delete(
        &self,
        b: &mut SqlBuilder<'_>,
        middle: &MiddleTable,
        pairs: &[(Value, Value)],
    ) -> Result<()> {
        b.with_fragment(Fragment::SqlDeleteFrom, |b| {
            b.sql("delete from ");
            b.identifier(&middle.table);
            b.sql(" where ");
            self.write_in_pairs(b, middle, pairs);
            Ok(())
        })
    }

    fn write_middle_delete_by_sources(
        &self,
        b: &mut SqlBuilder<'_>,
        middle: &MiddleTable,
        source_ids: &[Value],
    ) -> Result<()> {
        b.with_fragment(Fragment::SqlDeleteFrom, |b| {
            b.sql("delete from ");
            b.identifier(&middle.table);
            b.sql(" where ");
            self.write_in_values(b, &middle.join_column, source_ids);
            Ok(())
        })
    }

    /// Rows of the middle table for some sources, `(source id, target id)` per row.
    fn write_middle_select(
        &self,
        b: &mut SqlBuilder<'_>,
        middle: &MiddleTable,
        source_ids: &[Value],
    ) -> Result<()> {
        b.with_fragment(Fragment::SqlSelect, |b| {
            self.write_middle_projection(b, middle);
            self.write_in_values(b, &middle.join_column, source_ids);
            Ok(())
        })
    }

    /// Which of `pairs` are already in the middle table.
    fn write_middle_select_pairs(
        &self,
        b: &mut SqlBuilder<'_>,
        middle: &MiddleTable,
        pairs: &[(Value, Value)],
    ) -> Result<()> {
        b.with_fragment(Fragment::SqlSelect, |b| {
            self.write_middle_projection(b, middle);
            self.write_in_pairs(b, middle, pairs);
            Ok(())
        })
    }

    fn write_middle_projection(&self, b: &mut SqlBuilder<'_>, middle: &MiddleTable) {
        b.sql("select ");
        b.identifier(&middle.join_column);
        b.sql(", ");
        b.identifier(&middle.target_column);
        b.sql(" from ");
        b.identifier(&middle.table);
        b.sql(" where ");
    }
}

pub(crate) fn pagination_value(value: u64) -> Value {
    Value::Int64(Some(i64::try_from(value).unwrap_or(i64::MAX)))
}

/// Fallback generic sql writer: `?` placeholders and `limit ? offset ?`.
#[derive(Default, Debug, Clone, Copy)]
pub struct GenericSqlWriter;

impl GenericSqlWriter {
    pub fn new() -> Self {
        Self {}
    }
}

impl SqlWriter for GenericSqlWriter {
    fn as_dyn(&self) -> &dyn SqlWriter {
        self
    }
    fn name(&self) -> &'static str {
        "generic"
    }
}
