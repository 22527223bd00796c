use crate::{
    AsProp, AsType, AsValue, Entity, ImmutableProp, ImmutableType, OrmError, PropKey, PropKind,
    PropValue, Result, Schema, Value,
};
use std::collections::BTreeMap;

/// Mutable overlay of an [`Entity`] snapshot.
///
/// Assignments land in the overlay and are tracked in a dirty bitmap, the base snapshot is never
/// touched. A prop assigned once stays assigned for the lifetime of the draft, assigning it again
/// only replaces the value.
#[derive(Debug, Clone)]
pub struct Draft<'s> {
    schema: &'s Schema,
    ty: &'s ImmutableType,
    base: Entity,
    dirty: Vec<u64>,
    overlay: BTreeMap<u32, PropValue>,
}

/// Props assigned through a draft, returned by [`Draft::resolve`].
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct DraftDiff {
    set: Vec<PropKey>,
    changed: Vec<PropKey>,
}

impl DraftDiff {
    /// Every assigned prop, in declaration order.
    pub fn set_props(&self) -> &[PropKey] {
        &self.set
    }
    /// Assigned props whose value differs from the base snapshot.
    pub fn changed_props(&self) -> &[PropKey] {
        &self.changed
    }
    pub fn is_set(&self, prop: PropKey) -> bool {
        self.set.contains(&prop)
    }
    pub fn is_changed(&self, prop: PropKey) -> bool {
        self.changed.contains(&prop)
    }
}

impl<'s> Draft<'s> {
    /// Draft of a new entity, every prop unloaded.
    pub fn new(schema: &'s Schema, ty: impl AsType) -> Result<Self> {
        let ty = ty.resolve_type(schema)?;
        if ty.is_mapped_superclass() {
            return Err(OrmError::invalid_draft(format!(
                "cannot create a draft of the mapped superclass `{}`",
                ty.name()
            )));
        }
        Ok(Self::over(schema, ty, Entity::new(ty)))
    }

    /// Draft over an existing snapshot.
    pub fn of(schema: &'s Schema, base: Entity) -> Result<Self> {
        let ty = schema.ty(base.type_key())?;
        Ok(Self::over(schema, ty, base))
    }

    fn over(schema: &'s Schema, ty: &'s ImmutableType, base: Entity) -> Self {
        Self {
            schema,
            ty,
            base,
            dirty: vec![0; ty.props().len().div_ceil(64)],
            overlay: BTreeMap::new(),
        }
    }

    pub fn schema(&self) -> &'s Schema {
        self.schema
    }

    pub fn ty(&self) -> &'s ImmutableType {
        self.ty
    }

    fn prop(&self, prop: impl AsProp) -> Result<&'s ImmutableProp> {
        prop.resolve_prop(self.schema, self.ty)
    }

    fn dirty_bit(&self, index: u32) -> bool {
        self.dirty
            .get(index as usize / 64)
            .is_some_and(|w| (*w >> (index % 64)) & 1 == 1)
    }

    pub fn get(&self, prop: impl AsProp) -> Result<Option<&PropValue>> {
        let key = self.prop(prop)?.key();
        Ok(match self.overlay.get(&key.index) {
            Some(v) => Some(v),
            None => self.base.get(key),
        })
    }

    /// Typed value of a loaded scalar prop, `None` when unloaded.
    pub fn get_value<T: AsValue>(&self, prop: impl AsProp) -> Result<Option<T>> {
        match self.get(prop)? {
            Some(PropValue::Scalar(v)) => T::try_from_value(v.clone()).map(Some),
            Some(..) => Err(OrmError::invalid_draft("the prop is not a scalar")),
            None => Ok(None),
        }
    }

    /// Loaded either in the base snapshot or through the draft.
    pub fn is_loaded(&self, prop: impl AsProp) -> Result<bool> {
        Ok(self.get(prop)?.is_some())
    }

    /// Assigned through the draft.
    pub fn is_set(&self, prop: impl AsProp) -> Result<bool> {
        let key = self.prop(prop)?.key();
        Ok(self.dirty_bit(key.index))
    }

    /// Props assigned so far, in declaration order.
    pub fn set_props(&self) -> impl Iterator<Item = &'s ImmutableProp> + '_ {
        let ty = self.ty;
        self.overlay.keys().filter_map(move |i| ty.prop_at(*i))
    }

    pub fn set(&mut self, prop: impl AsProp, value: impl Into<Value>) -> Result<&mut Self> {
        self.set_value(prop, PropValue::Scalar(value.into()))
    }

    pub fn set_reference(&mut self, prop: impl AsProp, target: Option<Entity>) -> Result<&mut Self> {
        self.set_value(prop, PropValue::reference(target))
    }

    pub fn set_list(&mut self, prop: impl AsProp, targets: Vec<Entity>) -> Result<&mut Self> {
        self.set_value(prop, PropValue::List(targets))
    }

    pub fn set_value(&mut self, prop: impl AsProp, value: PropValue) -> Result<&mut Self> {
        let prop = self.prop(prop)?;
        let value = self.check(prop, value)?;
        let index = prop.key().index;
        if let Some(word) = self.dirty.get_mut(index as usize / 64) {
            *word |= 1u64 << (index % 64);
        }
        self.overlay.insert(index, value);
        Ok(self)
    }

    fn check(&self, prop: &ImmutableProp, value: PropValue) -> Result<PropValue> {
        let fail = |message: String| {
            Err(OrmError::invalid_draft(format!(
                "`{}.{}` {message}",
                self.ty.name(),
                prop.name()
            )))
        };
        match (prop.kind(), value) {
            (PropKind::Id | PropKind::Scalar, PropValue::Scalar(v)) => {
                if v.is_null() && (prop.is_id() || !prop.is_nullable()) {
                    return fail("cannot be null".into());
                }
                match coerce(prop.prototype(), v) {
                    Ok(v) => Ok(PropValue::Scalar(v)),
                    Err(e) => fail(format!("{e:#}")),
                }
            }
            (PropKind::Reference | PropKind::Inverse { list: false, .. }, PropValue::Reference(t)) => {
                match &t {
                    None if !prop.is_nullable() => fail("cannot be null".into()),
                    Some(e) if !self.accepts(prop, e) => fail("cannot reference this entity type".into()),
                    _ => Ok(PropValue::Reference(t)),
                }
            }
            (PropKind::ManyToMany(..) | PropKind::Inverse { list: true, .. }, PropValue::List(l)) => {
                if l.iter().any(|e| !self.accepts(prop, e)) {
                    return fail("cannot contain this entity type".into());
                }
                Ok(PropValue::List(l))
            }
            (_, value) => fail(format!("does not accept {value:?}")),
        }
    }

    fn accepts(&self, prop: &ImmutableProp, entity: &Entity) -> bool {
        prop.target_type()
            .is_some_and(|t| self.schema.is_assignable(entity.type_key(), t))
    }

    /// Merges the overlay into a new snapshot.
    pub fn resolve(self) -> (Entity, DraftDiff) {
        let mut diff = DraftDiff::default();
        let ty = self.base.type_key();
        let base = self.base.clone();
        let mut slots = self.base.into_slots();
        for (index, value) in self.overlay {
            let key = PropKey::new(ty, index);
            diff.set.push(key);
            if base.get(key) != Some(&value) {
                diff.changed.push(key);
            }
            if let Some(slot) = slots.get_mut(index as usize) {
                *slot = Some(value);
            }
        }
        (Entity::from_slots(ty, slots), diff)
    }
}

/// Adapts `value` to the variant of `prototype`, integers of any width are narrowed or widened.
pub(crate) fn coerce(prototype: &Value, value: Value) -> Result<Value> {
    if value.is_null() {
        return Ok(prototype.as_null());
    }
    if matches!(prototype, Value::Null) || prototype.same_type(&value) {
        return Ok(value);
    }
    let wide = match &value {
        Value::Int8(Some(v)) => *v as i64,
        Value::Int16(Some(v)) => *v as i64,
        Value::Int32(Some(v)) => *v as i64,
        Value::Int64(Some(v)) => *v,
        _ => {
            return Err(crate::Error::msg(format!(
                "expects {prototype:?}, found {value:?}"
            )));
        }
    };
    Ok(match prototype {
        Value::Int8(..) => i8::try_from_value(Value::Int64(Some(wide)))?.as_value(),
        Value::Int16(..) => i16::try_from_value(Value::Int64(Some(wide)))?.as_value(),
        Value::Int32(..) => i32::try_from_value(Value::Int64(Some(wide)))?.as_value(),
        Value::Int64(..) => Value::Int64(Some(wide)),
        _ => {
            return Err(crate::Error::msg(format!(
                "expects {prototype:?}, found {value:?}"
            )));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IdGeneration, TypeBuilder};

    fn schema() -> Schema {
        Schema::builder()
            .add(
                TypeBuilder::entity("Store")
                    .id("id", Value::Int64(None), IdGeneration::Identity)
                    .scalar("name", Value::Varchar(None)),
            )
            .add(
                TypeBuilder::entity("Book")
                    .id("id", Value::Int64(None), IdGeneration::Identity)
                    .scalar("name", Value::Varchar(None))
                    .scalar("edition", Value::Int32(None))
                    .scalar("note", Value::Varchar(None))
                    .nullable()
                    .reference("store", "Store"),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn set_is_monotonic() {
        let schema = schema();
        let mut draft = Draft::new(&schema, "Book").unwrap();
        assert!(!draft.is_loaded("name").unwrap());
        draft.set("name", "GraphQL in Action").unwrap();
        assert!(draft.is_set("name").unwrap());
        draft.set("name", "Learning GraphQL").unwrap();
        assert!(draft.is_set("name").unwrap());
        assert_eq!(
            draft.get_value::<String>("name").unwrap().as_deref(),
            Some("Learning GraphQL")
        );
        assert!(!draft.is_set("edition").unwrap());

        let (entity, diff) = draft.resolve();
        let name = schema.prop_key("Book", "name").unwrap();
        let edition = schema.prop_key("Book", "edition").unwrap();
        assert_eq!(diff.set_props(), [name]);
        assert!(entity.is_loaded(name));
        assert!(!entity.is_loaded(edition));
    }

    #[test]
    fn diff_against_base() {
        let schema = schema();
        let mut draft = Draft::new(&schema, "Book").unwrap();
        draft.set("id", 1i64).unwrap().set("name", "A").unwrap();
        let (base, _) = draft.resolve();

        let mut draft = Draft::of(&schema, base.clone()).unwrap();
        assert!(draft.is_loaded("name").unwrap());
        assert!(!draft.is_set("name").unwrap());
        draft.set("name", "A").unwrap().set("edition", 2).unwrap();
        let (entity, diff) = draft.resolve();
        let name = schema.prop_key("Book", "name").unwrap();
        let edition = schema.prop_key("Book", "edition").unwrap();
        assert_eq!(diff.set_props(), [name, edition]);
        assert_eq!(diff.changed_props(), [edition]);
        assert_eq!(entity.value::<i32>(edition).unwrap(), 2);
        assert!(!base.is_loaded(edition));
    }

    #[test]
    fn rejected_assignments() {
        let schema = schema();
        let mut draft = Draft::new(&schema, "Book").unwrap();
        let error = draft.set("name", Option::<String>::None).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<OrmError>(),
            Some(OrmError::InvalidDraft(..))
        ));
        assert!(draft.set("note", Option::<String>::None).is_ok());
        assert!(draft.set("edition", "three").is_err());
        assert!(draft.set("store", 1i64).is_err());
        assert!(draft.set_reference("store", None).is_err());
        assert!(draft.set("missing", 1).is_err());
        let book = Entity::new(schema.find_type("Book").unwrap());
        assert!(draft.set_reference("store", Some(book)).is_err());
        let store = Entity::id_only(schema.find_type("Store").unwrap(), Value::Int64(Some(3)));
        assert!(draft.set_reference("store", store.ok()).is_ok());
    }

    #[test]
    fn integer_coercion() {
        assert_eq!(
            coerce(&Value::Int32(None), Value::Int64(Some(12))).unwrap(),
            Value::Int32(Some(12))
        );
        assert!(coerce(&Value::Int8(None), Value::Int64(Some(1000))).is_err());
        assert_eq!(
            coerce(&Value::Varchar(None), Value::Null).unwrap(),
            Value::Varchar(None)
        );
    }
}
