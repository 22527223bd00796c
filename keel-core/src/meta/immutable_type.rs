use crate::{ImmutableProp, OrmError, Result};
use std::{
    collections::HashMap,
    fmt::{self, Display, Formatter},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey(pub(crate) u32);

impl TypeKey {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdGeneration {
    /// The caller assigns the id.
    #[default]
    None,
    /// The database assigns the id, read back from the affected rows report.
    Identity,
    /// A random v4 uuid assigned before insertion.
    Uuid,
}

/// Entity type or mapped superclass registered in a [`crate::Schema`].
#[derive(Debug, Clone)]
pub struct ImmutableType {
    pub(crate) key: TypeKey,
    pub(crate) name: String,
    pub(crate) table_name: String,
    pub(crate) super_type: Option<TypeKey>,
    pub(crate) mapped_superclass: bool,
    pub(crate) props: Vec<ImmutableProp>,
    pub(crate) prop_index: HashMap<String, u32>,
    pub(crate) id_prop: Option<u32>,
    pub(crate) key_props: Vec<u32>,
    pub(crate) id_generation: IdGeneration,
}

impl ImmutableType {
    pub fn key(&self) -> TypeKey {
        self.key
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn table_name(&self) -> &str {
        &self.table_name
    }
    pub fn super_type(&self) -> Option<TypeKey> {
        self.super_type
    }
    pub fn is_mapped_superclass(&self) -> bool {
        self.mapped_superclass
    }
    pub fn id_generation(&self) -> IdGeneration {
        self.id_generation
    }
    /// All props, inherited ones first.
    pub fn props(&self) -> &[ImmutableProp] {
        &self.props
    }
    pub fn prop(&self, name: &str) -> Option<&ImmutableProp> {
        self.prop_index
            .get(name)
            .and_then(|i| self.props.get(*i as usize))
    }
    pub fn prop_at(&self, index: u32) -> Option<&ImmutableProp> {
        self.props.get(index as usize)
    }
    pub fn id_prop(&self) -> Result<&ImmutableProp> {
        self.id_prop
            .and_then(|i| self.props.get(i as usize))
            .ok_or_else(|| {
                OrmError::invalid_path(format!("type `{}` does not declare an id", self.name))
            })
    }
    pub fn key_props(&self) -> impl Iterator<Item = &ImmutableProp> {
        self.key_props
            .iter()
            .filter_map(|i| self.props.get(*i as usize))
    }
    /// Props stored in the table row: id first, then the rest in declaration order.
    pub fn column_props(&self) -> impl Iterator<Item = &ImmutableProp> {
        self.props
            .iter()
            .filter(|p| p.is_id())
            .chain(self.props.iter().filter(|p| p.is_column() && !p.is_id()))
    }
}

impl PartialEq for ImmutableType {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ImmutableType {}

impl Display for ImmutableType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
