use crate::{
    AsProp, AstVisitor, ColumnRef, JoinEdge, OrmError, QueryParts, Result, Schema, ScopeId,
    SubQuery, Table, TableGraph, TableId, TableNode,
};

/// Which tables of a graph end up in the sql text, and their aliases.
///
/// A join is rendered when one of its non id columns is used, when a rendered join hangs from
/// it, or when its id cannot be read from the parent row. A reference or many-to-many join
/// used only through its id stays phantom: the id is read from the foreign key of the parent or
/// from the middle table.
#[derive(Debug)]
pub struct RenderPlan {
    rendered: Vec<bool>,
    middle: Vec<bool>,
    aliases: Vec<Option<String>>,
    middle_aliases: Vec<Option<String>>,
}

struct Usage<'a> {
    schema: &'a Schema,
    graph: &'a TableGraph,
    full: Vec<bool>,
    id: Vec<bool>,
    scopes: Vec<bool>,
}

impl Usage<'_> {
    fn reach(&mut self, scope: ScopeId) {
        if self.scopes.len() <= scope.index() {
            self.scopes.resize(scope.index() + 1, false);
        }
        self.scopes[scope.index()] = true;
    }
}

impl AstVisitor for Usage<'_> {
    fn visit_column(&mut self, column: &ColumnRef) -> Result<()> {
        let node = self.graph.node(column.table)?;
        let ty = self.schema.ty(node.ty)?;
        let prop = column.prop.resolve_prop(self.schema, ty)?;
        let index = column.table.id.index();
        if prop.is_id() {
            self.id[index] = true;
        } else {
            self.full[index] = true;
        }
        Ok(())
    }

    fn visit_sub_query(&mut self, query: &SubQuery) -> Result<()> {
        let scope = self.graph.node(query.root())?.scope;
        self.reach(scope);
        Ok(())
    }

    fn visit_entity(&mut self, table: Table) -> Result<()> {
        self.graph.node(table)?;
        self.full[table.id.index()] = true;
        Ok(())
    }
}

impl RenderPlan {
    pub fn new(schema: &Schema, graph: &TableGraph, parts: &QueryParts) -> Result<Self> {
        let len = graph.len();
        let mut usage = Usage {
            schema,
            graph,
            full: vec![false; len],
            id: vec![false; len],
            scopes: Vec::new(),
        };
        usage.reach(graph.node(parts.root)?.scope);
        parts.accept(&mut usage)?;
        let Usage {
            full, id, scopes, ..
        } = usage;

        let mut rendered = vec![false; len];
        let mut middle = vec![false; len];
        let mut needed = vec![false; len];
        for (table, node) in graph.nodes().rev() {
            let i = table.index();
            if !scopes.get(node.scope.index()).copied().unwrap_or(false) {
                continue;
            }
            let Some(parent) = node.parent else {
                rendered[i] = true;
                continue;
            };
            let phantom_capable = node.edge.as_ref().is_some_and(JoinEdge::is_phantom_capable);
            rendered[i] = full[i] || needed[i] || (id[i] && !phantom_capable);
            if matches!(node.edge, Some(JoinEdge::ManyToMany { .. })) {
                middle[i] = rendered[i] || id[i];
            }
            if rendered[i] || id[i] {
                needed[parent.index()] = true;
            }
        }

        let mut aliases = vec![None; len];
        let mut middle_aliases = vec![None; len];
        let mut counter = 0;
        let mut next = || {
            counter += 1;
            format!("tb_{counter}_")
        };
        for i in 0..len {
            if middle[i] {
                middle_aliases[i] = Some(next());
            }
            if rendered[i] {
                aliases[i] = Some(next());
            }
        }
        Ok(Self {
            rendered,
            middle,
            aliases,
            middle_aliases,
        })
    }

    pub fn is_rendered(&self, table: TableId) -> bool {
        self.rendered.get(table.index()).copied().unwrap_or(false)
    }

    /// Whether the middle table of a many-to-many join is rendered.
    pub fn is_middle_rendered(&self, table: TableId) -> bool {
        self.middle.get(table.index()).copied().unwrap_or(false)
    }

    pub fn alias(&self, table: TableId) -> Option<&str> {
        self.aliases.get(table.index()).and_then(Option::as_deref)
    }

    pub fn middle_alias(&self, table: TableId) -> Option<&str> {
        self.middle_aliases.get(table.index()).and_then(Option::as_deref)
    }

    /// Root and joins of a scope, in creation order, restricted to the rendered ones.
    pub fn scope_tables<'g>(
        &'g self,
        graph: &'g TableGraph,
        scope: ScopeId,
    ) -> impl Iterator<Item = (TableId, &'g TableNode)> + 'g {
        graph.nodes().filter(move |(id, node)| {
            node.scope == scope && (self.is_rendered(*id) || self.is_middle_rendered(*id))
        })
    }

    /// Alias and column name to write for `column`, as seen from `scope`.
    pub fn column<'a>(
        &'a self,
        schema: &'a Schema,
        graph: &'a TableGraph,
        column: &ColumnRef,
        scope: ScopeId,
    ) -> Result<(&'a str, &'a str)> {
        let node = graph.node(column.table)?;
        if !graph.is_visible(node.scope, scope) {
            return Err(OrmError::invalid_path(
                "the table is not visible from this query",
            ));
        }
        let ty = schema.ty(node.ty)?;
        let prop = column.prop.resolve_prop(schema, ty)?;
        if prop.is_list() {
            return Err(OrmError::invalid_path(format!(
                "`{}.{}` is a list, join it to use its columns",
                ty.name(),
                prop.name()
            )));
        }
        let id = column.table.id;
        let missing = || OrmError::invalid_path("the table is not part of the rendered statement");
        if prop.is_id() && !self.is_rendered(id) {
            return match (&node.edge, node.parent) {
                (Some(JoinEdge::Reference { fk }), Some(parent)) => {
                    Ok((self.alias(parent).ok_or_else(missing)?, fk.as_str()))
                }
                (Some(JoinEdge::ManyToMany { middle }), _) => Ok((
                    self.middle_alias(id).ok_or_else(missing)?,
                    middle.target_column.as_str(),
                )),
                _ => Err(missing()),
            };
        }
        let Some(name) = prop.column_name() else {
            return Err(OrmError::invalid_path(format!(
                "`{}.{}` has no column, join it to use its columns",
                ty.name(),
                prop.name()
            )));
        };
        Ok((self.alias(id).ok_or_else(missing)?, name))
    }
}
