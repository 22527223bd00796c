use crate::{TypeKey, Value};
use std::fmt::{self, Display, Formatter};

/// Stable identity of a property: the concrete type owning it and its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropKey {
    pub owner: TypeKey,
    pub index: u32,
}

impl PropKey {
    pub fn new(owner: TypeKey, index: u32) -> Self {
        Self { owner, index }
    }
}

/// Join table of a many-to-many association, oriented from the source side.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MiddleTable {
    pub table: String,
    /// Column referencing the source row.
    pub join_column: String,
    /// Column referencing the target row.
    pub target_column: String,
}

impl MiddleTable {
    /// Same table seen from the other side.
    pub fn reversed(&self) -> Self {
        Self {
            table: self.table.clone(),
            join_column: self.target_column.clone(),
            target_column: self.join_column.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropKind {
    Id,
    Scalar,
    /// Many-to-one or one-to-one owning side, stored as a foreign key column.
    Reference,
    /// Owning side of a many-to-many association.
    ManyToMany(MiddleTable),
    /// Non owning side, resolved through `mapped_by` on the target type.
    Inverse { mapped_by: PropKey, list: bool },
}

/// One property of an [`crate::ImmutableType`].
#[derive(Debug, Clone)]
pub struct ImmutableProp {
    pub(crate) key: PropKey,
    pub(crate) name: String,
    pub(crate) column_name: Option<String>,
    pub(crate) declaring_type: TypeKey,
    pub(crate) kind: PropKind,
    pub(crate) target_type: Option<TypeKey>,
    pub(crate) nullable: bool,
    pub(crate) prototype: Value,
}

impl ImmutableProp {
    pub fn key(&self) -> PropKey {
        self.key
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    /// Column in the owning table, only props stored in the row have one.
    pub fn column_name(&self) -> Option<&str> {
        self.column_name.as_deref()
    }
    /// Type where the prop was declared, a mapped superclass for inherited props.
    pub fn declaring_type(&self) -> TypeKey {
        self.declaring_type
    }
    pub fn kind(&self) -> &PropKind {
        &self.kind
    }
    pub fn target_type(&self) -> Option<TypeKey> {
        self.target_type
    }
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }
    /// Typed null describing the values of the column.
    pub fn prototype(&self) -> &Value {
        &self.prototype
    }
    pub fn is_id(&self) -> bool {
        matches!(self.kind, PropKind::Id)
    }
    pub fn is_reference(&self) -> bool {
        matches!(
            self.kind,
            PropKind::Reference | PropKind::Inverse { list: false, .. }
        )
    }
    pub fn is_list(&self) -> bool {
        matches!(
            self.kind,
            PropKind::ManyToMany(..) | PropKind::Inverse { list: true, .. }
        )
    }
    pub fn is_association(&self) -> bool {
        self.target_type.is_some()
    }
    pub fn is_column(&self) -> bool {
        self.column_name.is_some()
    }
    pub fn mapped_by(&self) -> Option<PropKey> {
        match self.kind {
            PropKind::Inverse { mapped_by, .. } => Some(mapped_by),
            _ => None,
        }
    }
    pub fn middle_table(&self) -> Option<&MiddleTable> {
        match &self.kind {
            PropKind::ManyToMany(middle) => Some(middle),
            _ => None,
        }
    }
}

impl PartialEq for ImmutableProp {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ImmutableProp {}

impl Display for ImmutableProp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
