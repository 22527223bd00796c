use crate::{
    IdGeneration, ImmutableProp, ImmutableType, MiddleTable, OrmError, PropKey, PropKind, Result,
    TypeKey, Value, upper_snake_case,
};
use std::collections::HashMap;

/// Registry of every type known to the engine, built once with [`SchemaBuilder`].
#[derive(Debug, Clone)]
pub struct Schema {
    types: Vec<ImmutableType>,
    by_name: HashMap<String, TypeKey>,
    opposites: HashMap<PropKey, PropKey>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn types(&self) -> &[ImmutableType] {
        &self.types
    }

    pub fn ty(&self, key: TypeKey) -> Result<&ImmutableType> {
        self.types
            .get(key.index())
            .ok_or_else(|| OrmError::invalid_path(format!("unknown type key {}", key.0)))
    }

    pub fn find_type(&self, name: &str) -> Result<&ImmutableType> {
        self.by_name
            .get(name)
            .and_then(|k| self.types.get(k.index()))
            .ok_or_else(|| OrmError::invalid_path(format!("unknown type `{name}`")))
    }

    pub fn prop(&self, key: PropKey) -> Result<&ImmutableProp> {
        let ty = self.ty(key.owner)?;
        ty.prop_at(key.index).ok_or_else(|| {
            OrmError::invalid_path(format!("type `{}` has no prop #{}", ty.name(), key.index))
        })
    }

    /// Resolves `"Book"`, `"store"` style names into the key of the prop.
    pub fn prop_key(&self, ty: impl AsType, prop: impl AsProp) -> Result<PropKey> {
        let ty = ty.resolve_type(self)?;
        Ok(prop.resolve_prop(self, ty)?.key())
    }

    /// Whether `ty` is `to` or inherits from it.
    pub fn is_assignable(&self, ty: TypeKey, to: TypeKey) -> bool {
        is_assignable(&self.types, ty, to)
    }

    /// The other side of an association, when both sides are declared.
    pub fn opposite_prop(&self, prop: PropKey) -> Option<PropKey> {
        self.opposites.get(&prop).copied()
    }

    /// Middle table of a many-to-many prop, oriented from the prop owner.
    pub fn middle_table(&self, prop: &ImmutableProp) -> Result<MiddleTable> {
        match prop.kind() {
            PropKind::ManyToMany(middle) => Ok(middle.clone()),
            PropKind::Inverse { mapped_by, .. } => match self.prop(*mapped_by)?.kind() {
                PropKind::ManyToMany(middle) => Ok(middle.reversed()),
                _ => Err(OrmError::invalid_path(format!(
                    "`{}` is not a many-to-many association",
                    prop.name()
                ))),
            },
            _ => Err(OrmError::invalid_path(format!(
                "`{}` is not a many-to-many association",
                prop.name()
            ))),
        }
    }
}

/// Anything naming a type of the schema.
pub trait AsType {
    fn resolve_type<'s>(&self, schema: &'s Schema) -> Result<&'s ImmutableType>;
}

impl AsType for TypeKey {
    fn resolve_type<'s>(&self, schema: &'s Schema) -> Result<&'s ImmutableType> {
        schema.ty(*self)
    }
}

impl AsType for &str {
    fn resolve_type<'s>(&self, schema: &'s Schema) -> Result<&'s ImmutableType> {
        schema.find_type(self)
    }
}

impl AsType for String {
    fn resolve_type<'s>(&self, schema: &'s Schema) -> Result<&'s ImmutableType> {
        schema.find_type(self)
    }
}

impl AsType for &ImmutableType {
    fn resolve_type<'s>(&self, schema: &'s Schema) -> Result<&'s ImmutableType> {
        schema.ty(self.key())
    }
}

/// Anything naming a prop of a given type.
pub trait AsProp {
    fn resolve_prop<'s>(&self, schema: &'s Schema, ty: &'s ImmutableType)
    -> Result<&'s ImmutableProp>;
}

fn prop_by_name<'s>(ty: &'s ImmutableType, name: &str) -> Result<&'s ImmutableProp> {
    ty.prop(name)
        .ok_or_else(|| OrmError::invalid_path(format!("type `{}` has no prop `{name}`", ty.name())))
}

impl AsProp for &str {
    fn resolve_prop<'s>(
        &self,
        _schema: &'s Schema,
        ty: &'s ImmutableType,
    ) -> Result<&'s ImmutableProp> {
        prop_by_name(ty, self)
    }
}

impl AsProp for String {
    fn resolve_prop<'s>(
        &self,
        _schema: &'s Schema,
        ty: &'s ImmutableType,
    ) -> Result<&'s ImmutableProp> {
        prop_by_name(ty, self)
    }
}

impl AsProp for PropKey {
    fn resolve_prop<'s>(
        &self,
        schema: &'s Schema,
        ty: &'s ImmutableType,
    ) -> Result<&'s ImmutableProp> {
        if self.owner == ty.key() {
            return ty.prop_at(self.index).ok_or_else(|| {
                OrmError::invalid_path(format!("type `{}` has no prop #{}", ty.name(), self.index))
            });
        }
        if schema.is_assignable(ty.key(), self.owner) {
            // Inherited from a mapped superclass, same name in the subtype
            let name = schema.prop(*self)?.name();
            return prop_by_name(ty, name);
        }
        Err(OrmError::invalid_path(format!(
            "prop `{}` does not belong to type `{}`",
            schema.prop(*self).map(|p| p.name()).unwrap_or("?"),
            ty.name()
        )))
    }
}

impl AsProp for &ImmutableProp {
    fn resolve_prop<'s>(
        &self,
        schema: &'s Schema,
        ty: &'s ImmutableType,
    ) -> Result<&'s ImmutableProp> {
        self.key().resolve_prop(schema, ty)
    }
}

#[derive(Debug, Clone)]
enum PropDefKind {
    Id,
    Scalar,
    Reference { target: String },
    ManyToMany { target: String, middle: Option<MiddleTable> },
    Inverse { target: String, mapped_by: String, list: bool },
}

#[derive(Debug, Clone)]
struct PropDef {
    name: String,
    column: Option<String>,
    kind: PropDefKind,
    nullable: bool,
    prototype: Value,
}

/// Declaration of one type, consumed by [`SchemaBuilder::add`].
#[derive(Debug, Clone)]
pub struct TypeBuilder {
    name: String,
    table_name: Option<String>,
    super_name: Option<String>,
    mapped_superclass: bool,
    id_generation: IdGeneration,
    props: Vec<PropDef>,
    keys: Vec<String>,
    errors: Vec<String>,
}

impl TypeBuilder {
    pub fn entity(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_name: None,
            super_name: None,
            mapped_superclass: false,
            id_generation: IdGeneration::None,
            props: Vec::new(),
            keys: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn mapped_superclass(name: impl Into<String>) -> Self {
        Self {
            mapped_superclass: true,
            ..Self::entity(name)
        }
    }

    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table_name = Some(name.into());
        self
    }

    pub fn extends(mut self, super_type: impl Into<String>) -> Self {
        self.super_name = Some(super_type.into());
        self
    }

    fn push(mut self, name: impl Into<String>, kind: PropDefKind, prototype: Value) -> Self {
        self.props.push(PropDef {
            name: name.into(),
            column: None,
            kind,
            nullable: false,
            prototype,
        });
        self
    }

    pub fn id(mut self, name: impl Into<String>, prototype: Value, generation: IdGeneration) -> Self {
        self.id_generation = generation;
        self.push(name, PropDefKind::Id, prototype.as_null())
    }

    pub fn scalar(self, name: impl Into<String>, prototype: Value) -> Self {
        self.push(name, PropDefKind::Scalar, prototype.as_null())
    }

    /// Scalar prop that is part of the business key.
    pub fn key(mut self, name: impl Into<String>, prototype: Value) -> Self {
        let name = name.into();
        self.keys.push(name.clone());
        self.scalar(name, prototype)
    }

    /// Many-to-one reference stored as a foreign key.
    pub fn reference(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.push(
            name,
            PropDefKind::Reference {
                target: target.into(),
            },
            Value::Null,
        )
    }

    /// Owning side of a many-to-many association.
    pub fn many_to_many(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.push(
            name,
            PropDefKind::ManyToMany {
                target: target.into(),
                middle: None,
            },
            Value::Null,
        )
    }

    /// One-to-many list mapped by a reference on the target type.
    pub fn one_to_many(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        mapped_by: impl Into<String>,
    ) -> Self {
        self.inverse(name, target, mapped_by, true)
    }

    /// Inverse side of a many-to-many association.
    pub fn many_to_many_inverse(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        mapped_by: impl Into<String>,
    ) -> Self {
        self.inverse(name, target, mapped_by, true)
    }

    /// Inverse side of a one-to-one reference.
    pub fn one_to_one_inverse(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        mapped_by: impl Into<String>,
    ) -> Self {
        self.inverse(name, target, mapped_by, false)
    }

    fn inverse(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        mapped_by: impl Into<String>,
        list: bool,
    ) -> Self {
        self.push(
            name,
            PropDefKind::Inverse {
                target: target.into(),
                mapped_by: mapped_by.into(),
                list,
            },
            Value::Null,
        )
    }

    fn last(&mut self, modifier: &str) -> Option<&mut PropDef> {
        if self.props.is_empty() {
            self.errors
                .push(format!("`{modifier}` on `{}` before any prop", self.name));
        }
        self.props.last_mut()
    }

    /// Marks the last declared prop as nullable.
    pub fn nullable(mut self) -> Self {
        if let Some(prop) = self.last("nullable") {
            prop.nullable = true;
        }
        self
    }

    /// Overrides the column of the last declared prop.
    pub fn column(mut self, name: impl Into<String>) -> Self {
        if let Some(prop) = self.last("column") {
            prop.column = Some(name.into());
        }
        self
    }

    /// Overrides the middle table of the last declared many-to-many prop.
    pub fn middle_table(
        mut self,
        table: impl Into<String>,
        join_column: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        let type_name = self.name.clone();
        let mut error = None;
        if let Some(prop) = self.last("middle_table") {
            if let PropDefKind::ManyToMany { middle, .. } = &mut prop.kind {
                *middle = Some(MiddleTable {
                    table: table.into(),
                    join_column: join_column.into(),
                    target_column: target_column.into(),
                });
            } else {
                error = Some(format!(
                    "`middle_table` on `{type_name}.{}` which is not a many-to-many association",
                    prop.name
                ));
            }
        }
        self.errors.extend(error);
        self
    }
}

#[derive(Default, Debug, Clone)]
pub struct SchemaBuilder {
    types: Vec<TypeBuilder>,
}

impl SchemaBuilder {
    pub fn add(mut self, ty: TypeBuilder) -> Self {
        self.types.push(ty);
        self
    }

    pub fn build(self) -> Result<Schema> {
        let defs = self.types;
        let mut by_name = HashMap::new();
        for (i, def) in defs.iter().enumerate() {
            if let Some(error) = def.errors.first() {
                return Err(OrmError::invalid_path(error.clone()));
            }
            if by_name
                .insert(def.name.clone(), TypeKey(i as u32))
                .is_some()
            {
                return Err(OrmError::invalid_path(format!(
                    "type `{}` is declared twice",
                    def.name
                )));
            }
        }
        let lookup = |name: &str, from: &str| -> Result<TypeKey> {
            by_name.get(name).copied().ok_or_else(|| {
                OrmError::invalid_path(format!("`{from}` refers to unknown type `{name}`"))
            })
        };

        // First pass: props with their final positions, association targets resolved
        let mut types = Vec::with_capacity(defs.len());
        let mut pending = HashMap::new();
        for (i, def) in defs.iter().enumerate() {
            let key = TypeKey(i as u32);
            let mut chain = vec![(key, def)];
            let mut current = def;
            while let Some(super_name) = &current.super_name {
                let super_key = lookup(super_name, &current.name)?;
                let super_def = &defs[super_key.index()];
                if !super_def.mapped_superclass {
                    return Err(OrmError::invalid_path(format!(
                        "`{}` extends `{}` which is not a mapped superclass",
                        current.name, super_def.name
                    )));
                }
                if chain.len() > defs.len() {
                    return Err(OrmError::invalid_path(format!(
                        "inheritance cycle through `{}`",
                        def.name
                    )));
                }
                chain.push((super_key, super_def));
                current = super_def;
            }
            chain.reverse();
            let table_name = def
                .table_name
                .clone()
                .unwrap_or_else(|| upper_snake_case(&def.name));
            let mut ty = ImmutableType {
                key,
                name: def.name.clone(),
                table_name,
                super_type: match &def.super_name {
                    Some(name) => Some(lookup(name, &def.name)?),
                    None => None,
                },
                mapped_superclass: def.mapped_superclass,
                props: Vec::new(),
                prop_index: HashMap::new(),
                id_prop: None,
                key_props: Vec::new(),
                id_generation: IdGeneration::None,
            };
            for (declaring, declaring_def) in chain {
                for prop in &declaring_def.props {
                    let index = ty.props.len() as u32;
                    if ty.prop_index.insert(prop.name.clone(), index).is_some() {
                        return Err(OrmError::invalid_path(format!(
                            "prop `{}.{}` is declared twice",
                            def.name, prop.name
                        )));
                    }
                    let (kind, column_name, target_type) = match &prop.kind {
                        PropDefKind::Id => {
                            if ty.id_prop.is_some() {
                                return Err(OrmError::invalid_path(format!(
                                    "type `{}` declares more than one id",
                                    def.name
                                )));
                            }
                            ty.id_prop = Some(index);
                            ty.id_generation = declaring_def.id_generation;
                            (
                                PropKind::Id,
                                Some(prop.column.clone().unwrap_or_else(|| upper_snake_case(&prop.name))),
                                None,
                            )
                        }
                        PropDefKind::Scalar => (
                            PropKind::Scalar,
                            Some(prop.column.clone().unwrap_or_else(|| upper_snake_case(&prop.name))),
                            None,
                        ),
                        PropDefKind::Reference { target } => (
                            PropKind::Reference,
                            Some(prop.column.clone().unwrap_or_else(|| {
                                format!("{}_ID", upper_snake_case(&prop.name))
                            })),
                            Some(lookup(target, &def.name)?),
                        ),
                        PropDefKind::ManyToMany { target, middle } => {
                            let target_key = lookup(target, &def.name)?;
                            let target_table = defs[target_key.index()]
                                .table_name
                                .clone()
                                .unwrap_or_else(|| upper_snake_case(target));
                            let middle = middle.clone().unwrap_or_else(|| MiddleTable {
                                table: format!("{}_{}_MAPPING", ty.table_name, target_table),
                                join_column: format!("{}_ID", ty.table_name),
                                target_column: format!("{}_ID", target_table),
                            });
                            (PropKind::ManyToMany(middle), None, Some(target_key))
                        }
                        PropDefKind::Inverse {
                            target,
                            mapped_by,
                            list,
                        } => {
                            // Resolved in the second pass
                            pending.insert(PropKey::new(key, index), mapped_by.clone());
                            (
                                PropKind::Inverse {
                                    mapped_by: PropKey::new(key, u32::MAX),
                                    list: *list,
                                },
                                None,
                                Some(lookup(target, &def.name)?),
                            )
                        }
                    };
                    ty.props.push(ImmutableProp {
                        key: PropKey::new(key, index),
                        name: prop.name.clone(),
                        column_name,
                        declaring_type: declaring,
                        nullable: prop.nullable
                            || matches!(prop.kind, PropDefKind::Inverse { list: false, .. }),
                        kind,
                        target_type,
                        prototype: prop.prototype.clone(),
                    });
                }
                for name in &declaring_def.keys {
                    if let Some(index) = ty.prop_index.get(name) {
                        ty.key_props.push(*index);
                    }
                }
            }
            types.push(ty);
        }

        // Second pass: inverse props, reference prototypes and validation
        let mut opposites = HashMap::new();
        for i in 0..types.len() {
            let type_name = types[i].name.clone();
            if !types[i].mapped_superclass {
                let Some(id) = types[i].id_prop.and_then(|p| types[i].props.get(p as usize))
                else {
                    return Err(OrmError::invalid_path(format!(
                        "entity `{type_name}` does not declare an id"
                    )));
                };
                match (types[i].id_generation, &id.prototype) {
                    (IdGeneration::Uuid, Value::Uuid(..))
                    | (IdGeneration::None, _)
                    | (
                        IdGeneration::Identity,
                        Value::Int8(..) | Value::Int16(..) | Value::Int32(..) | Value::Int64(..),
                    ) => {}
                    (generation, prototype) => {
                        return Err(OrmError::invalid_path(format!(
                            "id of `{type_name}` cannot use {generation:?} generation with {prototype:?}"
                        )));
                    }
                }
            }
            for p in 0..types[i].props.len() {
                let prop = &types[i].props[p];
                let Some(target) = prop.target_type else {
                    continue;
                };
                let target_type = &types[target.index()];
                if target_type.mapped_superclass {
                    return Err(OrmError::invalid_path(format!(
                        "`{type_name}.{}` targets the mapped superclass `{}`",
                        prop.name, target_type.name
                    )));
                }
                match &prop.kind {
                    PropKind::Reference => {
                        let prototype = target_type
                            .id_prop
                            .and_then(|p| target_type.props.get(p as usize))
                            .map(|p| p.prototype.clone())
                            .unwrap_or_default();
                        types[i].props[p].prototype = prototype;
                    }
                    PropKind::Inverse { list, .. } => {
                        let list = *list;
                        let Some(mapped_by) = pending.get(&prop.key) else {
                            continue;
                        };
                        let Some(back) = target_type.prop(mapped_by) else {
                            return Err(OrmError::invalid_path(format!(
                                "`{type_name}.{}` is mapped by `{}.{mapped_by}` which does not exist",
                                prop.name, target_type.name
                            )));
                        };
                        let points_back = back
                            .target_type
                            .is_some_and(|t| is_assignable(&types, types[i].key, t));
                        let compatible = match back.kind {
                            PropKind::Reference => true,
                            PropKind::ManyToMany(..) => list,
                            _ => false,
                        };
                        if !points_back || !compatible {
                            return Err(OrmError::invalid_path(format!(
                                "`{type_name}.{}` cannot be mapped by `{}.{mapped_by}`",
                                prop.name, target_type.name
                            )));
                        }
                        let back_key = back.key;
                        let own_key = prop.key;
                        types[i].props[p].kind = PropKind::Inverse {
                            mapped_by: back_key,
                            list,
                        };
                        opposites.insert(own_key, back_key);
                        opposites.insert(back_key, own_key);
                    }
                    _ => {}
                }
            }
        }
        Ok(Schema {
            types,
            by_name,
            opposites,
        })
    }
}

fn is_assignable(types: &[ImmutableType], ty: TypeKey, to: TypeKey) -> bool {
    let mut current = Some(ty);
    for _ in 0..=types.len() {
        match current {
            Some(key) if key == to => return true,
            Some(key) => current = types.get(key.index()).and_then(|t| t.super_type),
            None => return false,
        }
    }
    false
}
