use crate::{AsProp, AsValue, ImmutableType, OrmError, PropKey, Result, Schema, TypeKey, Value};

/// Content of a loaded property slot.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Scalar(Value),
    Reference(Option<Box<Entity>>),
    List(Vec<Entity>),
}

impl PropValue {
    pub fn scalar(value: impl AsValue) -> Self {
        PropValue::Scalar(value.as_value())
    }
    pub fn reference(entity: Option<Entity>) -> Self {
        PropValue::Reference(entity.map(Box::new))
    }
    pub fn list(entities: Vec<Entity>) -> Self {
        PropValue::List(entities)
    }
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            PropValue::Scalar(v) => Some(v),
            _ => None,
        }
    }
    pub fn as_reference(&self) -> Option<&Entity> {
        match self {
            PropValue::Reference(v) => v.as_deref(),
            _ => None,
        }
    }
    pub fn as_list(&self) -> &[Entity] {
        match self {
            PropValue::List(v) => v,
            _ => &[],
        }
    }
}

/// Immutable snapshot of an entity, one slot per prop of its type.
///
/// A `None` slot is an unloaded prop: it was never fetched nor assigned, and it is left out of
/// every statement built from the entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    ty: TypeKey,
    slots: Box<[Option<PropValue>]>,
}

impl Entity {
    /// Entity with every prop unloaded.
    pub fn new(ty: &ImmutableType) -> Self {
        Self {
            ty: ty.key(),
            slots: vec![None; ty.props().len()].into_boxed_slice(),
        }
    }

    /// Entity where only the id is loaded, the usual shape of a reference target.
    pub fn id_only(ty: &ImmutableType, id: Value) -> Result<Self> {
        let mut entity = Self::new(ty);
        let id_prop = ty.id_prop()?;
        entity.slots[id_prop.key().index as usize] = Some(PropValue::Scalar(id));
        Ok(entity)
    }

    pub(crate) fn from_slots(ty: TypeKey, slots: Box<[Option<PropValue>]>) -> Self {
        Self { ty, slots }
    }

    pub(crate) fn into_slots(self) -> Box<[Option<PropValue>]> {
        self.slots
    }

    pub(crate) fn set_slot(&mut self, prop: PropKey, value: PropValue) -> Result<()> {
        match self.slots.get_mut(prop.index as usize) {
            Some(slot) if prop.owner == self.ty => {
                *slot = Some(value);
                Ok(())
            }
            _ => Err(OrmError::invalid_path(format!(
                "prop #{} does not belong to the entity type",
                prop.index
            ))),
        }
    }

    pub fn type_key(&self) -> TypeKey {
        self.ty
    }

    pub fn get(&self, prop: PropKey) -> Option<&PropValue> {
        if prop.owner != self.ty {
            return None;
        }
        self.slots.get(prop.index as usize).and_then(Option::as_ref)
    }

    /// Same as [`Entity::get`] for any prop reference, inherited props included.
    pub fn lookup(&self, schema: &Schema, prop: impl AsProp) -> Result<Option<&PropValue>> {
        let ty = schema.ty(self.ty)?;
        Ok(self.get(prop.resolve_prop(schema, ty)?.key()))
    }

    pub fn is_loaded(&self, prop: PropKey) -> bool {
        self.get(prop).is_some()
    }

    pub fn scalar(&self, prop: PropKey) -> Option<&Value> {
        self.get(prop).and_then(PropValue::as_scalar)
    }

    pub fn reference(&self, prop: PropKey) -> Option<&Entity> {
        self.get(prop).and_then(PropValue::as_reference)
    }

    pub fn list(&self, prop: PropKey) -> &[Entity] {
        self.get(prop).map(PropValue::as_list).unwrap_or(&[])
    }

    /// Typed value of a loaded scalar prop.
    pub fn value<T: AsValue>(&self, prop: PropKey) -> Result<T> {
        let Some(value) = self.scalar(prop) else {
            return Err(OrmError::mapping(format!(
                "prop #{} is not a loaded scalar",
                prop.index
            )));
        };
        T::try_from_value(value.clone()).map_err(|e| OrmError::mapping(format!("{e:#}")))
    }

    /// Loaded props in declaration order.
    pub fn loaded(&self) -> impl Iterator<Item = (PropKey, &PropValue)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|v| (PropKey::new(self.ty, i as u32), v)))
    }

    pub fn id(&self, schema: &Schema) -> Result<Value> {
        let ty = schema.ty(self.ty)?;
        let id_prop = ty.id_prop()?;
        match self.scalar(id_prop.key()) {
            Some(id) if !id.is_null() => Ok(id.clone()),
            _ => Err(OrmError::invalid_draft(format!(
                "the id of this `{}` is not loaded",
                ty.name()
            ))),
        }
    }
}
