use crate::{
    AsProp, AsType, ImmutableProp, MiddleTable, OrmError, PropKey, PropKind, Result, Schema,
    ScopeId, Table, TableId, TypeKey,
};
use std::{
    collections::HashMap,
    sync::atomic::{AtomicU32, Ordering},
};

static NEXT_GRAPH: AtomicU32 = AtomicU32::new(1);

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    #[default]
    Inner,
    Left,
}

/// Identity of an edge: the owning association prop and the direction it is walked in.
///
/// Walking `Book.store` from a book and walking it backwards from a store are different
/// edges, while `BookStore.books` (mapped by `Book.store`) is the backwards walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JoinKey {
    pub prop: PropKey,
    pub inverse: bool,
}

/// How a node is attached to its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinEdge {
    /// Parent row holds the foreign key: `parent.FK = node.ID`.
    Reference { fk: String },
    /// Node row holds the foreign key: `parent.ID = node.FK`.
    InverseReference { fk: String },
    /// Through a middle table oriented from the parent.
    ManyToMany { middle: MiddleTable },
}

impl JoinEdge {
    /// Whether the id of the node can be read without joining the node itself.
    pub fn is_phantom_capable(&self) -> bool {
        !matches!(self, JoinEdge::InverseReference { .. })
    }
}

#[derive(Debug, Clone)]
pub struct TableNode {
    pub(crate) ty: TypeKey,
    pub(crate) scope: ScopeId,
    pub(crate) parent: Option<TableId>,
    pub(crate) edge: Option<JoinEdge>,
    pub(crate) join_type: JoinType,
    children: HashMap<JoinKey, TableId>,
}

impl TableNode {
    pub fn type_key(&self) -> TypeKey {
        self.ty
    }
    pub fn scope(&self) -> ScopeId {
        self.scope
    }
    pub fn parent(&self) -> Option<TableId> {
        self.parent
    }
    pub fn edge(&self) -> Option<&JoinEdge> {
        self.edge.as_ref()
    }
    pub fn join_type(&self) -> JoinType {
        self.join_type
    }
}

/// Arena of the tables reachable by one statement, sub-queries included.
///
/// Nodes are only ever appended, so a child always comes after its parent and arena order is
/// creation order.
#[derive(Debug)]
pub struct TableGraph {
    id: u32,
    nodes: Vec<TableNode>,
    scopes: Vec<Option<ScopeId>>,
}

impl TableGraph {
    pub fn new() -> Self {
        Self {
            id: NEXT_GRAPH.fetch_add(1, Ordering::Relaxed),
            nodes: Vec::new(),
            scopes: Vec::new(),
        }
    }

    /// Opens a scope whose root table is `ty`, nested in `parent` for sub-queries.
    pub fn add_root(
        &mut self,
        schema: &Schema,
        ty: impl AsType,
        parent: Option<ScopeId>,
    ) -> Result<Table> {
        let ty = ty.resolve_type(schema)?;
        if ty.is_mapped_superclass() {
            return Err(OrmError::invalid_path(format!(
                "cannot query the mapped superclass `{}`",
                ty.name()
            )));
        }
        let scope = ScopeId(self.scopes.len() as u32);
        self.scopes.push(parent);
        Ok(self.push(TableNode {
            ty: ty.key(),
            scope,
            parent: None,
            edge: None,
            join_type: JoinType::Inner,
            children: HashMap::new(),
        }))
    }

    fn push(&mut self, node: TableNode) -> Table {
        let id = TableId(self.nodes.len() as u32);
        let ty = node.ty;
        self.nodes.push(node);
        Table {
            graph: self.id,
            id,
            ty,
        }
    }

    pub fn nodes(&self) -> impl DoubleEndedIterator<Item = (TableId, &TableNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (TableId(i as u32), n))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn scope_parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes.get(scope.index()).copied().flatten()
    }

    /// Whether tables of `scope` are visible from `from`, i.e. `scope` is `from` or encloses it.
    pub fn is_visible(&self, scope: ScopeId, from: ScopeId) -> bool {
        let mut current = Some(from);
        while let Some(s) = current {
            if s == scope {
                return true;
            }
            current = self.scope_parent(s);
        }
        false
    }

    /// Node behind a handle, handles of other graphs are rejected.
    pub fn node(&self, table: Table) -> Result<&TableNode> {
        match self.nodes.get(table.id.index()) {
            Some(node) if table.graph == self.id => Ok(node),
            _ => Err(OrmError::invalid_path(
                "the table does not belong to this statement",
            )),
        }
    }

    pub(crate) fn node_at(&self, id: TableId) -> Option<&TableNode> {
        self.nodes.get(id.index())
    }

    pub(crate) fn handle(&self, id: TableId) -> Option<Table> {
        self.nodes.get(id.index()).map(|n| Table {
            graph: self.id,
            id,
            ty: n.ty,
        })
    }

    pub fn join(&mut self, schema: &Schema, table: Table, prop: impl AsProp) -> Result<Table> {
        self.join_prop(schema, table, prop, JoinType::Inner)
    }

    pub fn outer_join(&mut self, schema: &Schema, table: Table, prop: impl AsProp) -> Result<Table> {
        self.join_prop(schema, table, prop, JoinType::Left)
    }

    /// Follows an association declared on the type of `table`.
    ///
    /// An inverse prop is walked as its `mapped_by` prop backwards, so it shares the node with
    /// the equivalent [`TableGraph::inverse_join`].
    pub fn join_prop(
        &mut self,
        schema: &Schema,
        table: Table,
        prop: impl AsProp,
        join_type: JoinType,
    ) -> Result<Table> {
        let ty = schema.ty(self.node(table)?.ty)?;
        let prop = prop.resolve_prop(schema, ty)?;
        let Some(target) = prop.target_type() else {
            return Err(OrmError::invalid_path(format!(
                "`{}.{}` is not an association",
                ty.name(),
                prop.name()
            )));
        };
        let (key, edge) = match prop.kind() {
            PropKind::Inverse { mapped_by, .. } => {
                let back = schema.prop(*mapped_by)?;
                (
                    JoinKey {
                        prop: back.key(),
                        inverse: true,
                    },
                    backwards_edge(schema, back)?,
                )
            }
            _ => (
                JoinKey {
                    prop: prop.key(),
                    inverse: false,
                },
                forward_edge(schema, prop)?,
            ),
        };
        Ok(self.child(table, key, target, edge, join_type))
    }

    pub fn inverse_join(
        &mut self,
        schema: &Schema,
        table: Table,
        target: impl AsType,
        back_prop: impl AsProp,
    ) -> Result<Table> {
        self.inverse_join_with(schema, table, target, back_prop, JoinType::Inner)
    }

    pub fn inverse_outer_join(
        &mut self,
        schema: &Schema,
        table: Table,
        target: impl AsType,
        back_prop: impl AsProp,
    ) -> Result<Table> {
        self.inverse_join_with(schema, table, target, back_prop, JoinType::Left)
    }

    /// Walks backwards the association `back_prop` declared on `target`, which must point to the
    /// type of `table`.
    pub fn inverse_join_with(
        &mut self,
        schema: &Schema,
        table: Table,
        target: impl AsType,
        back_prop: impl AsProp,
        join_type: JoinType,
    ) -> Result<Table> {
        let source = schema.ty(self.node(table)?.ty)?;
        let target = target.resolve_type(schema)?;
        let back = back_prop.resolve_prop(schema, target)?;
        let Some(back_target) = back.target_type() else {
            return Err(OrmError::invalid_path(format!(
                "`{}.{}` is not an association",
                target.name(),
                back.name()
            )));
        };
        if !schema.is_assignable(source.key(), back_target) {
            return Err(OrmError::AmbiguousInverseJoin(format!(
                "`{}.{}` targets `{}`, not `{}`",
                target.name(),
                back.name(),
                schema.ty(back_target)?.name(),
                source.name()
            ))
            .into());
        }
        let (key, edge) = match back.kind() {
            // Backwards of an inverse prop is its owning prop walked forward
            PropKind::Inverse { mapped_by, .. } => {
                let owning = schema.prop(*mapped_by)?;
                (
                    JoinKey {
                        prop: owning.key(),
                        inverse: false,
                    },
                    forward_edge(schema, owning)?,
                )
            }
            _ => (
                JoinKey {
                    prop: back.key(),
                    inverse: true,
                },
                backwards_edge(schema, back)?,
            ),
        };
        Ok(self.child(table, key, target.key(), edge, join_type))
    }

    /// Joins every prop of `path` in turn, `["store", "books"]` from a book reaches the books
    /// of its store.
    pub fn join_path<P: AsProp>(
        &mut self,
        schema: &Schema,
        table: Table,
        path: impl IntoIterator<Item = P>,
        join_type: JoinType,
    ) -> Result<Table> {
        let mut current = table;
        for prop in path {
            current = self.join_prop(schema, current, prop, join_type)?;
        }
        Ok(current)
    }

    fn child(
        &mut self,
        parent: Table,
        key: JoinKey,
        ty: TypeKey,
        edge: JoinEdge,
        join_type: JoinType,
    ) -> Table {
        if let Some(id) = self.nodes[parent.id.index()].children.get(&key).copied() {
            let node = &mut self.nodes[id.index()];
            // Outer wins
            if join_type == JoinType::Left {
                node.join_type = JoinType::Left;
            }
            return Table {
                graph: self.id,
                id,
                ty: node.ty,
            };
        }
        let scope = self.nodes[parent.id.index()].scope;
        let table = self.push(TableNode {
            ty,
            scope,
            parent: Some(parent.id),
            edge: Some(edge),
            join_type,
            children: HashMap::new(),
        });
        self.nodes[parent.id.index()].children.insert(key, table.id);
        table
    }
}

impl Default for TableGraph {
    fn default() -> Self {
        Self::new()
    }
}

fn forward_edge(schema: &Schema, prop: &ImmutableProp) -> Result<JoinEdge> {
    match prop.kind() {
        PropKind::Reference => Ok(JoinEdge::Reference {
            fk: fk_column(prop)?,
        }),
        PropKind::ManyToMany(middle) => Ok(JoinEdge::ManyToMany {
            middle: middle.clone(),
        }),
        _ => Err(OrmError::invalid_path(format!(
            "`{}` of `{}` cannot be joined",
            prop.name(),
            schema.ty(prop.declaring_type())?.name()
        ))),
    }
}

fn backwards_edge(schema: &Schema, prop: &ImmutableProp) -> Result<JoinEdge> {
    match prop.kind() {
        PropKind::Reference => Ok(JoinEdge::InverseReference {
            fk: fk_column(prop)?,
        }),
        PropKind::ManyToMany(middle) => Ok(JoinEdge::ManyToMany {
            middle: middle.reversed(),
        }),
        _ => Err(OrmError::invalid_path(format!(
            "`{}` of `{}` cannot be joined backwards",
            prop.name(),
            schema.ty(prop.declaring_type())?.name()
        ))),
    }
}

fn fk_column(prop: &ImmutableProp) -> Result<String> {
    prop.column_name()
        .map(str::to_owned)
        .ok_or_else(|| OrmError::invalid_path(format!("`{}` has no column", prop.name())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IdGeneration, TypeBuilder, Value};

    fn schema() -> Schema {
        Schema::builder()
            .add(
                TypeBuilder::entity("Store")
                    .id("id", Value::Int64(None), IdGeneration::None)
                    .one_to_many("books", "Book", "store"),
            )
            .add(
                TypeBuilder::entity("Book")
                    .id("id", Value::Int64(None), IdGeneration::None)
                    .reference("store", "Store")
                    .nullable()
                    .many_to_many("authors", "Author"),
            )
            .add(
                TypeBuilder::entity("Author")
                    .id("id", Value::Int64(None), IdGeneration::None)
                    .many_to_many_inverse("books", "Book", "authors"),
            )
            .build()
            .expect("valid schema")
    }

    #[test]
    fn join_reuse() {
        let schema = schema();
        let mut graph = TableGraph::new();
        let book = graph.add_root(&schema, "Book", None).unwrap();
        let a = graph.join(&schema, book, "store").unwrap();
        let b = graph.join(&schema, book, "store").unwrap();
        assert_eq!(a, b);
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.node(a).unwrap().join_type(), JoinType::Inner);

        let c = graph.outer_join(&schema, book, "store").unwrap();
        assert_eq!(a, c);
        assert_eq!(graph.node(a).unwrap().join_type(), JoinType::Left);
        // Outer wins, a later inner request does not demote the edge
        graph.join(&schema, book, "store").unwrap();
        assert_eq!(graph.node(a).unwrap().join_type(), JoinType::Left);
    }

    #[test]
    fn inverse_shares_nodes() {
        let schema = schema();
        let mut graph = TableGraph::new();
        let store = graph.add_root(&schema, "Store", None).unwrap();
        let via_mapped_by = graph.join(&schema, store, "books").unwrap();
        let via_inverse = graph.inverse_join(&schema, store, "Book", "store").unwrap();
        assert_eq!(via_mapped_by, via_inverse);
        assert!(matches!(
            graph.node(via_mapped_by).unwrap().edge(),
            Some(JoinEdge::InverseReference { fk }) if fk == "STORE_ID"
        ));

        let author = graph.add_root(&schema, "Author", None).unwrap();
        let books = graph.join(&schema, author, "books").unwrap();
        let again = graph.inverse_join(&schema, author, "Book", "authors").unwrap();
        assert_eq!(books, again);
        let Some(JoinEdge::ManyToMany { middle }) = graph.node(books).unwrap().edge() else {
            panic!("expected a middle table edge");
        };
        assert_eq!(middle.join_column, "AUTHOR_ID");
        assert_eq!(middle.target_column, "BOOK_ID");
    }

    #[test]
    fn join_errors() {
        let schema = schema();
        let mut graph = TableGraph::new();
        let book = graph.add_root(&schema, "Book", None).unwrap();
        let error = graph.inverse_join(&schema, book, "Book", "store").unwrap_err();
        assert!(matches!(
            error.downcast_ref::<OrmError>(),
            Some(OrmError::AmbiguousInverseJoin(..))
        ));
        let error = graph.join(&schema, book, "id").unwrap_err();
        assert!(matches!(
            error.downcast_ref::<OrmError>(),
            Some(OrmError::InvalidPath(..))
        ));
        assert!(graph.join(&schema, book, "missing").is_err());

        let mut other = TableGraph::new();
        let foreign = other.add_root(&schema, "Book", None).unwrap();
        assert!(graph.join(&schema, foreign, "store").is_err());
    }

    #[test]
    fn paths() {
        let schema = schema();
        let mut graph = TableGraph::new();
        let book = graph.add_root(&schema, "Book", None).unwrap();
        let siblings = graph
            .join_path(&schema, book, ["store", "books"], JoinType::Left)
            .unwrap();
        let store = graph.join(&schema, book, "store").unwrap();
        let books = graph.join(&schema, store, "books").unwrap();
        assert_eq!(siblings, books);
        assert_eq!(graph.node(books).unwrap().parent(), Some(store.id()));
        assert_eq!(graph.len(), 3);
    }
}
