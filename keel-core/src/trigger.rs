use crate::{
    AsProp, AsType, Entity, Error, OrmError, PropKey, PropKind, Result, Schema, TypeKey, Value,
};
use std::sync::{
    Arc, RwLock,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityEventKind {
    Insert,
    Update,
    Delete,
}

/// Committed change of one row.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityEvent {
    pub ty: TypeKey,
    pub id: Value,
    /// Row before the change, `None` for inserts or when it was not read.
    pub old: Option<Entity>,
    /// Row after the change, `None` for deletes.
    pub new: Option<Entity>,
    pub reason: Option<String>,
}

impl EntityEvent {
    pub fn kind(&self) -> EntityEventKind {
        match (&self.old, &self.new) {
            (_, None) => EntityEventKind::Delete,
            (None, Some(..)) => EntityEventKind::Insert,
            (Some(..), Some(..)) => EntityEventKind::Update,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationEventKind {
    Insert,
    Delete,
}

/// Committed change of one association pair, a middle table row or a foreign key.
#[derive(Debug, Clone, PartialEq)]
pub struct AssociationEvent {
    pub prop: PropKey,
    pub source_id: Value,
    pub target_id: Value,
    pub kind: AssociationEventKind,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Entity(EntityEvent),
    Association(AssociationEvent),
}

pub type EntityListener = Arc<dyn Fn(&EntityEvent) -> Result<()> + Send + Sync>;
pub type AssociationListener = Arc<dyn Fn(&AssociationEvent) -> Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Registry of change listeners, dispatching synchronously on the caller's task.
pub struct Triggers {
    schema: Arc<Schema>,
    next_id: AtomicU64,
    entity_listeners: RwLock<Vec<(ListenerId, TypeKey, EntityListener)>>,
    association_listeners: RwLock<Vec<(ListenerId, PropKey, AssociationListener)>>,
}

fn poisoned() -> Error {
    Error::msg("the listeners lock is poisoned")
}

impl Triggers {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            next_id: AtomicU64::new(1),
            entity_listeners: RwLock::new(Vec::new()),
            association_listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn next_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Listens to the rows of `ty` and of the types inheriting from it.
    pub fn add_entity_listener(
        &self,
        ty: impl AsType,
        listener: impl Fn(&EntityEvent) -> Result<()> + Send + Sync + 'static,
    ) -> Result<ListenerId> {
        let ty = ty.resolve_type(&self.schema)?.key();
        let id = self.next_id();
        self.entity_listeners
            .write()
            .map_err(|_| poisoned())?
            .push((id, ty, Arc::new(listener)));
        Ok(id)
    }

    pub fn add_association_listener(
        &self,
        ty: impl AsType,
        prop: impl AsProp,
        listener: impl Fn(&AssociationEvent) -> Result<()> + Send + Sync + 'static,
    ) -> Result<ListenerId> {
        let prop = self.schema.prop_key(ty, prop)?;
        if !self.schema.prop(prop)?.is_association() {
            return Err(OrmError::invalid_path(format!(
                "`{}` is not an association",
                self.schema.prop(prop)?.name()
            )));
        }
        let id = self.next_id();
        self.association_listeners
            .write()
            .map_err(|_| poisoned())?
            .push((id, prop, Arc::new(listener)));
        Ok(id)
    }

    /// Whether a listener was found and removed.
    pub fn remove_listener(&self, id: ListenerId) -> Result<bool> {
        let mut entity = self.entity_listeners.write().map_err(|_| poisoned())?;
        let before = entity.len();
        entity.retain(|(v, ..)| *v != id);
        if entity.len() != before {
            return Ok(true);
        }
        drop(entity);
        let mut association = self.association_listeners.write().map_err(|_| poisoned())?;
        let before = association.len();
        association.retain(|(v, ..)| *v != id);
        Ok(association.len() != before)
    }

    pub fn has_entity_listeners(&self, ty: TypeKey) -> Result<bool> {
        Ok(self
            .entity_listeners
            .read()
            .map_err(|_| poisoned())?
            .iter()
            .any(|(_, t, _)| self.schema.is_assignable(ty, *t)))
    }

    /// Listeners on `prop` itself or on the opposite side it is mirrored to.
    pub fn has_association_listeners(&self, prop: PropKey) -> Result<bool> {
        let opposite = self.schema.opposite_prop(prop);
        Ok(self
            .association_listeners
            .read()
            .map_err(|_| poisoned())?
            .iter()
            .any(|(_, p, _)| *p == prop || Some(*p) == opposite))
    }

    /// Whether a save or a delete of `ty` must read the rows before changing them.
    pub fn needs_old_rows(&self, ty: TypeKey) -> Result<bool> {
        if self.has_entity_listeners(ty)? {
            return Ok(true);
        }
        for prop in self.schema.ty(ty)?.props() {
            if prop.is_association() && self.has_association_listeners(prop.key())? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn fire_entity_table_change(
        &self,
        old: Option<Entity>,
        new: Option<Entity>,
        reason: Option<&str>,
    ) -> Result<()> {
        let Some(snapshot) = new.as_ref().or(old.as_ref()) else {
            return Ok(());
        };
        let event = EntityEvent {
            ty: snapshot.type_key(),
            id: snapshot.id(&self.schema)?,
            old,
            new,
            reason: reason.map(Into::into),
        };
        self.fire_all(vec![Event::Entity(event)])
    }

    pub fn fire_middle_table_insert(
        &self,
        prop: PropKey,
        source_id: Value,
        target_id: Value,
        reason: Option<&str>,
    ) -> Result<()> {
        self.fire_all(vec![association_event(
            prop,
            source_id,
            target_id,
            AssociationEventKind::Insert,
            reason,
        )])
    }

    pub fn fire_middle_table_delete(
        &self,
        prop: PropKey,
        source_id: Value,
        target_id: Value,
        reason: Option<&str>,
    ) -> Result<()> {
        self.fire_all(vec![association_event(
            prop,
            source_id,
            target_id,
            AssociationEventKind::Delete,
            reason,
        )])
    }

    /// Foreign key change of a reference prop, reported as a delete of the old pair followed
    /// by an insert of the new one.
    pub fn fire_association_change(
        &self,
        prop: PropKey,
        source_id: Value,
        old_target: Option<Value>,
        new_target: Option<Value>,
        reason: Option<&str>,
    ) -> Result<()> {
        self.fire_all(reference_change_events(
            prop, source_id, old_target, new_target, reason,
        ))
    }

    /// Dispatches `events` in order, association events are mirrored to the opposite prop.
    ///
    /// Every listener runs even when an earlier one fails, the failures are logged and the
    /// first one is returned as [`OrmError::Listener`].
    pub fn fire_all(&self, events: Vec<Event>) -> Result<()> {
        let mut failures = Vec::new();
        for event in events {
            match event {
                Event::Entity(event) => self.dispatch_entity(&event, &mut failures)?,
                Event::Association(event) => {
                    let mirrored = self.mirrored(&event)?;
                    self.dispatch_association(&event, &mut failures)?;
                    if let Some(mirrored) = mirrored {
                        self.dispatch_association(&mirrored, &mut failures)?;
                    }
                }
            }
        }
        let Some(first) = failures.first() else {
            return Ok(());
        };
        Err(OrmError::Listener {
            failed: failures.len(),
            first: format!("{first:#}"),
        }
        .into())
    }

    fn dispatch_entity(&self, event: &EntityEvent, failures: &mut Vec<Error>) -> Result<()> {
        let listeners = self
            .entity_listeners
            .read()
            .map_err(|_| poisoned())?
            .iter()
            .filter(|(_, ty, _)| self.schema.is_assignable(event.ty, *ty))
            .map(|(.., f)| f.clone())
            .collect::<Vec<_>>();
        for listener in listeners {
            if let Err(e) = listener(event) {
                log::error!("Entity listener failed on {:?} {}: {e:#}", event.kind(), event.id);
                failures.push(e);
            }
        }
        Ok(())
    }

    fn dispatch_association(
        &self,
        event: &AssociationEvent,
        failures: &mut Vec<Error>,
    ) -> Result<()> {
        let listeners = self
            .association_listeners
            .read()
            .map_err(|_| poisoned())?
            .iter()
            .filter(|(_, prop, _)| *prop == event.prop)
            .map(|(.., f)| f.clone())
            .collect::<Vec<_>>();
        for listener in listeners {
            if let Err(e) = listener(event) {
                log::error!(
                    "Association listener failed on {:?} ({}, {}): {e:#}",
                    event.kind,
                    event.source_id,
                    event.target_id
                );
                failures.push(e);
            }
        }
        Ok(())
    }

    /// Same change seen from the other side of the association.
    fn mirrored(&self, event: &AssociationEvent) -> Result<Option<AssociationEvent>> {
        let Some(opposite) = self.schema.opposite_prop(event.prop) else {
            return Ok(None);
        };
        let opposite_prop = self.schema.prop(opposite)?;
        // A one-to-one inverse side has no pair of its own to report
        if matches!(opposite_prop.kind(), PropKind::Inverse { list: false, .. }) {
            return Ok(None);
        }
        Ok(Some(AssociationEvent {
            prop: opposite,
            source_id: event.target_id.clone(),
            target_id: event.source_id.clone(),
            kind: event.kind,
            reason: event.reason.clone(),
        }))
    }
}

pub(crate) fn association_event(
    prop: PropKey,
    source_id: Value,
    target_id: Value,
    kind: AssociationEventKind,
    reason: Option<&str>,
) -> Event {
    Event::Association(AssociationEvent {
        prop,
        source_id,
        target_id,
        kind,
        reason: reason.map(Into::into),
    })
}

pub(crate) fn reference_change_events(
    prop: PropKey,
    source_id: Value,
    old_target: Option<Value>,
    new_target: Option<Value>,
    reason: Option<&str>,
) -> Vec<Event> {
    let old_target = old_target.filter(|v| !v.is_null());
    let new_target = new_target.filter(|v| !v.is_null());
    if old_target == new_target {
        return Vec::new();
    }
    let mut events = Vec::with_capacity(2);
    if let Some(old) = old_target {
        events.push(association_event(
            prop,
            source_id.clone(),
            old,
            AssociationEventKind::Delete,
            reason,
        ));
    }
    if let Some(new) = new_target {
        events.push(association_event(
            prop,
            source_id,
            new,
            AssociationEventKind::Insert,
            reason,
        ));
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IdGeneration, TypeBuilder};
    use std::sync::Mutex;

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::builder()
                .add(
                    TypeBuilder::mapped_superclass("Base")
                        .id("id", Value::Int64(None), IdGeneration::None),
                )
                .add(
                    TypeBuilder::entity("Store")
                        .extends("Base")
                        .one_to_many("books", "Book", "store"),
                )
                .add(
                    TypeBuilder::entity("Book")
                        .extends("Base")
                        .reference("store", "Store")
                        .nullable()
                        .many_to_many("authors", "Author"),
                )
                .add(
                    TypeBuilder::entity("Author")
                        .extends("Base")
                        .many_to_many_inverse("books", "Book", "authors"),
                )
                .build()
                .expect("valid schema"),
        )
    }

    fn id(v: i64) -> Value {
        Value::Int64(Some(v))
    }

    #[test]
    fn mirrored_association_events() {
        let schema = schema();
        let triggers = Triggers::new(schema.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        triggers
            .add_association_listener("Author", "books", move |e| {
                recorder.lock().unwrap().push(e.clone());
                Ok(())
            })
            .unwrap();
        let authors = schema.prop_key("Book", "authors").unwrap();
        assert!(triggers.has_association_listeners(authors).unwrap());
        triggers
            .fire_middle_table_insert(authors, id(1), id(2), Some("r"))
            .unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].prop, schema.prop_key("Author", "books").unwrap());
        assert_eq!(seen[0].source_id, id(2));
        assert_eq!(seen[0].target_id, id(1));
        assert_eq!(seen[0].reason.as_deref(), Some("r"));
    }

    #[test]
    fn listener_failures_do_not_stop_dispatch() {
        let schema = schema();
        let triggers = Triggers::new(schema.clone());
        let calls = Arc::new(Mutex::new(0));
        triggers
            .add_entity_listener("Base", |_| Err(Error::msg("first")))
            .unwrap();
        let counter = calls.clone();
        let second = triggers
            .add_entity_listener("Book", move |e| {
                assert_eq!(e.kind(), EntityEventKind::Insert);
                *counter.lock().unwrap() += 1;
                Ok(())
            })
            .unwrap();
        let book = Entity::id_only(schema.find_type("Book").unwrap(), id(5)).unwrap();
        let error = triggers
            .fire_entity_table_change(None, Some(book.clone()), None)
            .unwrap_err();
        assert_eq!(
            error.downcast_ref::<OrmError>(),
            Some(&OrmError::Listener {
                failed: 1,
                first: "first".into()
            })
        );
        assert_eq!(*calls.lock().unwrap(), 1);

        assert!(triggers.remove_listener(second).unwrap());
        assert!(!triggers.remove_listener(second).unwrap());
        assert!(
            triggers
                .fire_entity_table_change(None, Some(book), None)
                .is_err()
        );
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn reference_changes() {
        let schema = schema();
        let store = schema.prop_key("Book", "store").unwrap();
        let events = reference_change_events(store, id(1), Some(id(2)), Some(id(3)), None);
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            Event::Association(AssociationEvent { kind: AssociationEventKind::Delete, target_id, .. })
                if *target_id == id(2)
        ));
        assert!(reference_change_events(store, id(1), Some(id(2)), Some(id(2)), None).is_empty());
        assert_eq!(
            reference_change_events(store, id(1), None, Some(Value::Int64(None)), None).len(),
            0
        );

        let triggers = Triggers::new(schema.clone());
        assert!(!triggers.needs_old_rows(store.owner).unwrap());
        triggers
            .add_association_listener("Store", "books", |_| Ok(()))
            .unwrap();
        assert!(triggers.needs_old_rows(store.owner).unwrap());
    }
}
